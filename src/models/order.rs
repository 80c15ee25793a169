use crate::models::notification::NotificationStatus;
use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Paid,
    Failed,
    CodPending,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::CodPending => "cod_pending",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "created" => Ok(OrderStatus::Created),
            "paid" => Ok(OrderStatus::Paid),
            "failed" => Ok(OrderStatus::Failed),
            "cod_pending" => Ok(OrderStatus::CodPending),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Online,
    Cod,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Online => "online",
            PaymentMethod::Cod => "cod",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "online" => Ok(PaymentMethod::Online),
            "cod" => Ok(PaymentMethod::Cod),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

/// One cart line as submitted at checkout and stored on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[validate(length(min = 1, message = "productId is required"))]
    pub product_id: String,
    #[validate(length(min = 1, message = "item name is required"))]
    pub name: String,
    /// Price per unit in whole rupees
    #[serde(alias = "price")]
    #[validate(range(min = 0))]
    pub unit_price: i64,
    #[serde(default)]
    pub size: String,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetails {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(custom(function = "crate::service::validation::check_email"))]
    pub email: String,
    #[validate(custom(function = "crate::service::validation::check_indian_phone"))]
    pub phone: String,
    #[validate(length(min = 1, message = "address is required"))]
    pub address: String,
    #[serde(alias = "pinCode")]
    #[validate(custom(function = "crate::service::validation::check_indian_postal_code"))]
    pub postal_code: String,
    pub email_verification_token: Option<String>,
    pub phone_verification_token: Option<String>,
}

fn default_currency() -> String {
    "INR".to_string()
}

/// Checkout submission shared by the online and cash-on-delivery flows.
#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Order total in whole rupees
    #[validate(range(min = 1, message = "amount must be positive"))]
    pub amount: i64,
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3, message = "currency must be an ISO 4217 code"))]
    pub currency: String,
    #[validate(nested)]
    pub customer_data: CustomerDetails,
    #[validate(length(min = 1, message = "at least one item is required"))]
    #[validate(nested)]
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerificationRequest {
    #[serde(alias = "razorpay_order_id")]
    #[validate(length(min = 1, message = "gatewayOrderId is required"))]
    pub gateway_order_id: String,
    #[serde(alias = "razorpay_payment_id")]
    #[validate(length(min = 1, message = "paymentId is required"))]
    pub payment_id: String,
    #[serde(alias = "razorpay_signature")]
    #[validate(length(min = 1, message = "signature is required"))]
    pub signature: String,
}

/// Row as stored in `orders`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub order_id: String,
    pub payment_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub payment_method: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub pin_code: String,
    pub items: sqlx::types::Json<Vec<OrderItem>>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub phone_verified_at: Option<DateTime<Utc>>,
    pub email_notification_sent: bool,
    pub email_notification_sent_at: Option<DateTime<Utc>>,
    pub email_notification_error: Option<String>,
    pub sms_notification_sent: bool,
    pub sms_notification_sent_at: Option<DateTime<Utc>>,
    pub sms_notification_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelRecord {
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: Uuid,
    /// Gateway-assigned id for online orders, locally generated for COD.
    pub external_order_id: String,
    pub payment_id: Option<String>,
    /// Minor currency units (paise).
    pub amount: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub postal_code: String,
    pub items: Vec<OrderItem>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub phone_verified_at: Option<DateTime<Utc>>,
    pub email_notification: ChannelRecord,
    pub sms_notification: ChannelRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = String;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            external_order_id: row.order_id,
            payment_id: row.payment_id,
            amount: row.amount,
            currency: row.currency,
            status: row.status.parse()?,
            payment_method: row.payment_method.parse()?,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            shipping_address: row.shipping_address,
            postal_code: row.pin_code,
            items: row.items.0,
            email_verified_at: row.email_verified_at.filter(|_| row.email_verified),
            phone_verified_at: row.phone_verified_at.filter(|_| row.phone_verified),
            email_notification: ChannelRecord {
                sent: row.email_notification_sent,
                sent_at: row.email_notification_sent_at,
                error: row.email_notification_error,
            },
            sms_notification: ChannelRecord {
                sent: row.sms_notification_sent,
                sent_at: row.sms_notification_sent_at,
                error: row.sms_notification_error,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Values needed to persist a new order row.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub external_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub postal_code: String,
    pub items: Vec<OrderItem>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub phone_verified_at: Option<DateTime<Utc>>,
}

/// Client-facing order representation.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_id: String,
    pub payment_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: String,
    #[serde(rename = "pinCode")]
    pub postal_code: String,
    pub items: Vec<OrderItem>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub email_notification_sent: bool,
    pub sms_notification_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            order_id: order.external_order_id.clone(),
            payment_id: order.payment_id.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            status: order.status,
            payment_method: order.payment_method,
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            customer_phone: order.customer_phone.clone(),
            shipping_address: order.shipping_address.clone(),
            postal_code: order.postal_code.clone(),
            items: order.items.clone(),
            email_verified: order.email_verified_at.is_some(),
            phone_verified: order.phone_verified_at.is_some(),
            email_notification_sent: order.email_notification.sent,
            sms_notification_sent: order.sms_notification.sent,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OnlineOrderResponse {
    pub gateway_order_id: String,
    /// Minor currency units as accepted by the gateway
    pub amount: i64,
    pub currency: String,
    pub local_order_id: Uuid,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct NotificationSummary {
    pub email: bool,
    pub sms: bool,
}

impl From<&NotificationStatus> for NotificationSummary {
    fn from(status: &NotificationStatus) -> Self {
        Self {
            email: status.email.success,
            sms: status.sms.success,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PaymentVerifiedResponse {
    pub verified: bool,
    pub order: OrderResponse,
    /// Present only when notifications are dispatched inline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationSummary>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CodOrderResponse {
    pub success: bool,
    pub order: OrderResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationSummary>,
}
