use crate::config::VerificationConfig;
use crate::database::order::OrderRepository;
use crate::error::app_error::AppError;
use crate::models::notification::{DispatchMode, NotificationStatus};
use crate::models::order::{
    CheckoutRequest, CodOrderResponse, CustomerDetails, NewOrder, NotificationSummary, OnlineOrderResponse, Order, OrderResponse, OrderStatus,
    PaymentMethod, PaymentVerificationRequest, PaymentVerifiedResponse,
};
use crate::models::otp::OtpPurpose;
use crate::service::notification::NotificationDispatcher;
use crate::service::payment_gateway::{GatewayOrderRequest, PaymentGateway};
use crate::service::validation::{format_indian_phone, normalize_email};
use crate::service::verification_token::VerificationTokenIssuer;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

/// `{prefix}_{unix millis}_{8 random hex chars}`
pub fn generate_order_reference(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, Utc::now().timestamp_millis(), &suffix[..8])
}

fn to_minor_units(rupees: i64) -> Result<i64, AppError> {
    rupees
        .checked_mul(100)
        .ok_or_else(|| AppError::BadRequest("amount is too large".to_string()))
}

/// Verification timestamps for a checkout that passed (or bypassed) the OTP gate.
#[derive(Debug, Clone, Copy)]
struct VerifiedContacts {
    email_verified_at: Option<DateTime<Utc>>,
    phone_verified_at: Option<DateTime<Utc>>,
}

pub struct OrderService<'a, R> {
    repository: &'a R,
    gateway: &'a dyn PaymentGateway,
    issuer: &'a VerificationTokenIssuer,
    dispatcher: &'a Arc<NotificationDispatcher>,
    verification: &'a VerificationConfig,
    dispatch_mode: DispatchMode,
}

impl<'a, R> OrderService<'a, R>
where
    R: OrderRepository + Clone + Send + Sync + 'static,
{
    pub fn new(
        repository: &'a R,
        gateway: &'a dyn PaymentGateway,
        issuer: &'a VerificationTokenIssuer,
        dispatcher: &'a Arc<NotificationDispatcher>,
        verification: &'a VerificationConfig,
        dispatch_mode: DispatchMode,
    ) -> Self {
        OrderService {
            repository,
            gateway,
            issuer,
            dispatcher,
            verification,
            dispatch_mode,
        }
    }

    /// Creates the remote payment order first, then the local `created` row.
    pub async fn create_online_order(&self, request: &CheckoutRequest) -> Result<OnlineOrderResponse, AppError> {
        request.validate()?;
        let contacts = self.check_verification(&request.customer_data)?;
        let amount = to_minor_units(request.amount)?;
        let receipt = generate_order_reference("order");

        let gateway_request = GatewayOrderRequest {
            amount,
            currency: request.currency.clone(),
            receipt: receipt.clone(),
            notes: HashMap::from([
                ("customer_name".to_string(), request.customer_data.name.clone()),
                ("customer_email".to_string(), request.customer_data.email.clone()),
                ("customer_phone".to_string(), request.customer_data.phone.clone()),
            ]),
        };

        let gateway_order = self.gateway.create_order(&gateway_request).await.inspect_err(|e| {
            error!(receipt = %receipt, error = %e.detail(), "payment gateway order creation failed");
        })?;

        let new_order = self.new_order(request, gateway_order.id.clone(), amount, OrderStatus::Created, PaymentMethod::Online, contacts);
        let order = match self.repository.create_order(&new_order).await {
            Ok(order) => order,
            Err(e) => {
                error!(
                    gateway_order_id = %gateway_order.id,
                    receipt = %receipt,
                    amount,
                    error = %e.detail(),
                    reconciliation_required = true,
                    "gateway order created but local persistence failed"
                );
                return Err(e);
            }
        };

        info!(order_id = %order.external_order_id, local_order_id = %order.id, amount, "online order created");
        Ok(OnlineOrderResponse {
            gateway_order_id: gateway_order.id,
            amount: gateway_order.amount,
            currency: gateway_order.currency,
            local_order_id: order.id,
        })
    }

    /// Checks the gateway signature and settles the order as `paid` or `failed`.
    pub async fn verify_payment(&self, request: &PaymentVerificationRequest) -> Result<PaymentVerifiedResponse, AppError> {
        request.validate()?;

        if !self
            .gateway
            .verify_payment_signature(&request.gateway_order_id, &request.payment_id, &request.signature)
        {
            match self.repository.mark_order_failed(&request.gateway_order_id).await? {
                Some(order) => warn!(order_id = %order.external_order_id, "payment signature mismatch, order marked failed"),
                None => warn!(order_id = %request.gateway_order_id, "payment signature mismatch for unknown or settled order"),
            }
            return Err(AppError::InvalidPaymentSignature);
        }

        let Some(order) = self
            .repository
            .mark_order_paid(&request.gateway_order_id, &request.payment_id)
            .await?
        else {
            return Err(match self.repository.get_order_by_gateway_id(&request.gateway_order_id).await? {
                Some(existing) => AppError::OrderStateConflict(format!("Order is already {}", existing.status)),
                None => AppError::NotFound("Order not found".to_string()),
            });
        };

        info!(order_id = %order.external_order_id, payment_id = %request.payment_id, "payment verified, order paid");
        let (order, notifications) = self.notify(order, false).await;

        Ok(PaymentVerifiedResponse {
            verified: true,
            order: OrderResponse::from(&order),
            notifications: notifications.as_ref().map(NotificationSummary::from),
        })
    }

    /// Persists a `cod_pending` order. No gateway is involved.
    pub async fn create_cod_order(&self, request: &CheckoutRequest) -> Result<CodOrderResponse, AppError> {
        request.validate()?;
        let contacts = self.check_verification(&request.customer_data)?;
        let amount = to_minor_units(request.amount)?;
        let reference = generate_order_reference("COD");

        let new_order = self.new_order(request, reference, amount, OrderStatus::CodPending, PaymentMethod::Cod, contacts);
        let order = self.repository.create_order(&new_order).await?;
        info!(order_id = %order.external_order_id, local_order_id = %order.id, amount, "COD order created");

        let (order, notifications) = self.notify(order, true).await;

        Ok(CodOrderResponse {
            success: true,
            order: OrderResponse::from(&order),
            notifications: notifications.as_ref().map(NotificationSummary::from),
        })
    }

    pub async fn get_order(&self, id: &Uuid) -> Result<OrderResponse, AppError> {
        self.repository
            .get_order_by_id(id)
            .await?
            .map(|order| OrderResponse::from(&order))
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
    }

    fn check_verification(&self, customer: &CustomerDetails) -> Result<VerifiedContacts, AppError> {
        if self.verification.bypass_enabled() {
            warn!(email = %customer.email, "verification bypass enabled, skipping OTP token checks");
            return Ok(VerifiedContacts {
                email_verified_at: None,
                phone_verified_at: None,
            });
        }

        let email = normalize_email(&customer.email);
        let phone = format_indian_phone(&customer.phone).ok_or(AppError::VerificationInvalid(OtpPurpose::Phone))?;

        self.check_token(customer.email_verification_token.as_deref(), &email, OtpPurpose::Email)?;
        self.check_token(customer.phone_verification_token.as_deref(), &phone, OtpPurpose::Phone)?;

        let now = Utc::now();
        Ok(VerifiedContacts {
            email_verified_at: Some(now),
            phone_verified_at: Some(now),
        })
    }

    fn check_token(&self, token: Option<&str>, identifier: &str, purpose: OtpPurpose) -> Result<(), AppError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(AppError::VerificationRequired(purpose))?;
        if self.issuer.validate(token, identifier, purpose) {
            Ok(())
        } else {
            Err(AppError::VerificationInvalid(purpose))
        }
    }

    fn new_order(
        &self,
        request: &CheckoutRequest,
        external_order_id: String,
        amount: i64,
        status: OrderStatus,
        payment_method: PaymentMethod,
        contacts: VerifiedContacts,
    ) -> NewOrder {
        let customer = &request.customer_data;
        NewOrder {
            external_order_id,
            amount,
            currency: request.currency.clone(),
            status,
            payment_method,
            customer_name: customer.name.trim().to_string(),
            customer_email: normalize_email(&customer.email),
            customer_phone: format_indian_phone(&customer.phone).unwrap_or_else(|| customer.phone.clone()),
            shipping_address: customer.address.trim().to_string(),
            postal_code: customer.postal_code.clone(),
            items: request.items.clone(),
            email_verified_at: contacts.email_verified_at,
            phone_verified_at: contacts.phone_verified_at,
        }
    }

    /// Runs notifications per the dispatch mode. Inline returns the outcome and the
    /// order with it applied; background returns immediately with `None`.
    async fn notify(&self, order: Order, support_alert: bool) -> (Order, Option<NotificationStatus>) {
        match self.dispatch_mode {
            DispatchMode::Inline => {
                if support_alert {
                    self.dispatcher.send_cod_support_alert(&order).await;
                }
                let status = self.dispatcher.send_order_notifications(&order).await;
                let at = Utc::now();
                persist_outcome(self.repository, &order, &status, at).await;
                (apply_outcome(order, &status, at), Some(status))
            }
            DispatchMode::Background => {
                let repository = self.repository.clone();
                let dispatcher = Arc::clone(self.dispatcher);
                let background_order = order.clone();
                tokio::spawn(async move {
                    if support_alert {
                        dispatcher.send_cod_support_alert(&background_order).await;
                    }
                    let status = dispatcher.send_order_notifications(&background_order).await;
                    persist_outcome(&repository, &background_order, &status, Utc::now()).await;
                });
                (order, None)
            }
        }
    }
}

async fn persist_outcome<R: OrderRepository + Sync>(repository: &R, order: &Order, status: &NotificationStatus, at: DateTime<Utc>) {
    if let Err(e) = repository.record_notification_outcome(&order.id, status, at).await {
        error!(order_id = %order.external_order_id, error = %e.detail(), "failed to record notification outcome");
    }
}

fn apply_outcome(mut order: Order, status: &NotificationStatus, at: DateTime<Utc>) -> Order {
    order.email_notification.sent = status.email.success;
    order.email_notification.sent_at = status.email.success.then_some(at);
    order.email_notification.error = status.email.error.clone();
    order.sms_notification.sent = status.sms.success;
    order.sms_notification.sent_at = status.sms.success.then_some(at);
    order.sms_notification.error = status.sms.error.clone();
    order
}
