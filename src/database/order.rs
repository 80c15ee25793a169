use crate::database::postgres_repository::{PostgresRepository, decode_error};
use crate::error::app_error::AppError;
use crate::models::notification::NotificationStatus;
use crate::models::order::{NewOrder, Order, OrderRow, OrderStatus};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

const ORDER_COLUMNS: &str = r#"
    id, order_id, payment_id, amount, currency, status, payment_method,
    customer_name, customer_email, customer_phone, shipping_address, pin_code, items,
    email_verified, phone_verified, email_verified_at, phone_verified_at,
    email_notification_sent, email_notification_sent_at, email_notification_error,
    sms_notification_sent, sms_notification_sent_at, sms_notification_error,
    created_at, updated_at
"#;

#[async_trait::async_trait]
pub trait OrderRepository {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, AppError>;
    async fn get_order_by_id(&self, id: &Uuid) -> Result<Option<Order>, AppError>;
    async fn get_order_by_gateway_id(&self, gateway_order_id: &str) -> Result<Option<Order>, AppError>;
    /// `created` → `paid`. Returns `None` when no order with that id is still `created`.
    async fn mark_order_paid(&self, gateway_order_id: &str, payment_id: &str) -> Result<Option<Order>, AppError>;
    /// `created` → `failed`. Returns `None` when no order with that id is still `created`.
    async fn mark_order_failed(&self, gateway_order_id: &str) -> Result<Option<Order>, AppError>;
    async fn record_notification_outcome(&self, id: &Uuid, status: &NotificationStatus, at: DateTime<Utc>) -> Result<(), AppError>;
}

fn into_order(row: OrderRow) -> Result<Order, AppError> {
    Order::try_from(row).map_err(|e| decode_error("orders", e))
}

impl PostgresRepository {
    async fn transition_from_created(&self, gateway_order_id: &str, to: OrderStatus, payment_id: Option<&str>) -> Result<Option<Order>, AppError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE orders
            SET status = $2, payment_id = COALESCE($3, payment_id), updated_at = NOW()
            WHERE order_id = $1 AND status = 'created'
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(gateway_order_id)
        .bind(to.as_str())
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_order).transpose()
    }
}

#[async_trait::async_trait]
impl OrderRepository for PostgresRepository {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, AppError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO orders (
                order_id, amount, currency, status, payment_method,
                customer_name, customer_email, customer_phone, shipping_address, pin_code, items,
                email_verified, phone_verified, email_verified_at, phone_verified_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(&order.external_order_id)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(order.payment_method.as_str())
        .bind(&order.customer_name)
        .bind(&order.customer_email)
        .bind(&order.customer_phone)
        .bind(&order.shipping_address)
        .bind(&order.postal_code)
        .bind(Json(&order.items))
        .bind(order.email_verified_at.is_some())
        .bind(order.phone_verified_at.is_some())
        .bind(order.email_verified_at)
        .bind(order.phone_verified_at)
        .fetch_one(&self.pool)
        .await?;

        into_order(row)
    }

    async fn get_order_by_id(&self, id: &Uuid) -> Result<Option<Order>, AppError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(into_order).transpose()
    }

    async fn get_order_by_gateway_id(&self, gateway_order_id: &str) -> Result<Option<Order>, AppError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1"))
            .bind(gateway_order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(into_order).transpose()
    }

    async fn mark_order_paid(&self, gateway_order_id: &str, payment_id: &str) -> Result<Option<Order>, AppError> {
        self.transition_from_created(gateway_order_id, OrderStatus::Paid, Some(payment_id)).await
    }

    async fn mark_order_failed(&self, gateway_order_id: &str) -> Result<Option<Order>, AppError> {
        self.transition_from_created(gateway_order_id, OrderStatus::Failed, None).await
    }

    async fn record_notification_outcome(&self, id: &Uuid, status: &NotificationStatus, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET email_notification_sent = $2,
                email_notification_sent_at = $3,
                email_notification_error = $4,
                sms_notification_sent = $5,
                sms_notification_sent_at = $6,
                sms_notification_error = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.email.success)
        .bind(status.email.success.then_some(at))
        .bind(&status.email.error)
        .bind(status.sms.success)
        .bind(status.sms.success.then_some(at))
        .bind(&status.sms.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
