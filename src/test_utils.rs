use crate::database::order::OrderRepository;
use crate::database::otp::OtpRepository;
use crate::error::app_error::AppError;
use crate::models::notification::NotificationStatus;
use crate::models::order::{ChannelRecord, CheckoutRequest, CustomerDetails, NewOrder, Order, OrderItem, OrderStatus, PaymentMethod};
use crate::models::otp::{NewOtpRecord, OtpPurpose, OtpRecord};
use crate::service::email::EmailSender;
use crate::service::payment_gateway::{GatewayOrder, GatewayOrderRequest, PaymentGateway, verify_payment_signature};
use crate::service::sms::SmsSender;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub fn sample_checkout_request() -> CheckoutRequest {
    CheckoutRequest {
        amount: 2999,
        currency: "INR".to_string(),
        customer_data: CustomerDetails {
            name: "Asha Rao".to_string(),
            email: "Asha@Example.com".to_string(),
            phone: "+91 98765 43210".to_string(),
            address: "12 MG Road, Bengaluru".to_string(),
            postal_code: "560001".to_string(),
            email_verification_token: None,
            phone_verification_token: None,
        },
        items: vec![sample_item()],
    }
}

fn sample_item() -> OrderItem {
    OrderItem {
        product_id: "shilajit-resin".to_string(),
        name: "Shilajit Resin".to_string(),
        unit_price: 2999,
        size: "20g".to_string(),
        quantity: 1,
    }
}

fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 14, 10, 30, 0).single().unwrap_or_else(Utc::now)
}

pub fn sample_order(status: OrderStatus, payment_method: PaymentMethod) -> Order {
    let external_order_id = match payment_method {
        PaymentMethod::Cod => "COD_1731580200000_ab12cd34",
        PaymentMethod::Online => "order_PQx7Lm2Zk9Ab3C",
    };
    Order {
        id: Uuid::new_v4(),
        external_order_id: external_order_id.to_string(),
        payment_id: None,
        amount: 299900,
        currency: "INR".to_string(),
        status,
        payment_method,
        customer_name: "Asha Rao".to_string(),
        customer_email: "asha@example.com".to_string(),
        customer_phone: "9876543210".to_string(),
        shipping_address: "12 MG Road, Bengaluru".to_string(),
        postal_code: "560001".to_string(),
        items: vec![sample_item()],
        email_verified_at: Some(fixed_time()),
        phone_verified_at: Some(fixed_time()),
        email_notification: ChannelRecord::default(),
        sms_notification: ChannelRecord::default(),
        created_at: fixed_time(),
        updated_at: fixed_time(),
    }
}

#[derive(Default)]
struct MockState {
    otps: Vec<OtpRecord>,
    orders: Vec<Order>,
}

/// In-memory stand-in for the Postgres repository. Clones share state.
#[derive(Clone, Default)]
pub struct MockRepository {
    state: Arc<Mutex<MockState>>,
    fail_order_writes: Arc<AtomicBool>,
}

impl MockRepository {
    pub fn otps(&self) -> Vec<OtpRecord> {
        self.state.lock().map(|s| s.otps.clone()).unwrap_or_default()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.state.lock().map(|s| s.orders.clone()).unwrap_or_default()
    }

    pub fn order(&self, id: &Uuid) -> Option<Order> {
        self.orders().into_iter().find(|o| o.id == *id)
    }

    /// Makes every subsequent `create_order` fail like a lost connection.
    pub fn fail_order_writes(&self) {
        self.fail_order_writes.store(true, Ordering::SeqCst);
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> Result<T, AppError> {
        let mut state = self.state.lock().map_err(|_| AppError::db("mock state poisoned", sqlx::Error::PoolClosed))?;
        Ok(f(&mut state))
    }

    fn transition(&self, gateway_order_id: &str, to: OrderStatus, payment_id: Option<&str>) -> Result<Option<Order>, AppError> {
        self.with_state(|state| {
            let order = state
                .orders
                .iter_mut()
                .find(|o| o.external_order_id == gateway_order_id && o.status == OrderStatus::Created)?;
            order.status = to;
            if let Some(payment_id) = payment_id {
                order.payment_id = Some(payment_id.to_string());
            }
            order.updated_at = Utc::now();
            Some(order.clone())
        })
    }
}

#[async_trait::async_trait]
impl OtpRepository for MockRepository {
    async fn insert_otp(&self, record: &NewOtpRecord) -> Result<OtpRecord, AppError> {
        let stored = OtpRecord {
            id: Uuid::new_v4(),
            identifier: record.identifier.clone(),
            purpose: record.purpose,
            otp_hash: record.otp_hash.clone(),
            verification_attempts: 0,
            verified: false,
            verified_at: None,
            expires_at: record.expires_at,
            source_ip: record.source_ip.clone(),
            created_at: Utc::now(),
        };
        self.with_state(|state| state.otps.push(stored.clone()))?;
        Ok(stored)
    }

    async fn find_latest_unverified(&self, identifier: &str, purpose: OtpPurpose) -> Result<Option<OtpRecord>, AppError> {
        self.with_state(|state| {
            state
                .otps
                .iter()
                .rev()
                .find(|r| r.identifier == identifier && r.purpose == purpose && !r.verified)
                .cloned()
        })
    }

    async fn increment_attempts(&self, id: &Uuid, max_attempts: i32) -> Result<Option<i32>, AppError> {
        self.with_state(|state| {
            let record = state.otps.iter_mut().find(|r| r.id == *id && r.verification_attempts < max_attempts)?;
            record.verification_attempts += 1;
            Some(record.verification_attempts)
        })
    }

    async fn mark_verified(&self, id: &Uuid, verified_at: DateTime<Utc>) -> Result<bool, AppError> {
        self.with_state(|state| match state.otps.iter_mut().find(|r| r.id == *id && !r.verified) {
            Some(record) => {
                record.verified = true;
                record.verified_at = Some(verified_at);
                true
            }
            None => false,
        })
    }
}

#[async_trait::async_trait]
impl OrderRepository for MockRepository {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, AppError> {
        if self.fail_order_writes.load(Ordering::SeqCst) {
            return Err(AppError::db("Failed to create order", sqlx::Error::PoolTimedOut));
        }

        let now = Utc::now();
        let stored = Order {
            id: Uuid::new_v4(),
            external_order_id: order.external_order_id.clone(),
            payment_id: None,
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
            email_verified_at: order.email_verified_at,
            phone_verified_at: order.phone_verified_at,
            email_notification: ChannelRecord::default(),
            sms_notification: ChannelRecord::default(),
            created_at: now,
            updated_at: now,
        };
        self.with_state(|state| state.orders.push(stored.clone()))?;
        Ok(stored)
    }

    async fn get_order_by_id(&self, id: &Uuid) -> Result<Option<Order>, AppError> {
        self.with_state(|state| state.orders.iter().find(|o| o.id == *id).cloned())
    }

    async fn get_order_by_gateway_id(&self, gateway_order_id: &str) -> Result<Option<Order>, AppError> {
        self.with_state(|state| state.orders.iter().find(|o| o.external_order_id == gateway_order_id).cloned())
    }

    async fn mark_order_paid(&self, gateway_order_id: &str, payment_id: &str) -> Result<Option<Order>, AppError> {
        self.transition(gateway_order_id, OrderStatus::Paid, Some(payment_id))
    }

    async fn mark_order_failed(&self, gateway_order_id: &str) -> Result<Option<Order>, AppError> {
        self.transition(gateway_order_id, OrderStatus::Failed, None)
    }

    async fn record_notification_outcome(&self, id: &Uuid, status: &NotificationStatus, at: DateTime<Utc>) -> Result<(), AppError> {
        self.with_state(|state| {
            if let Some(order) = state.orders.iter_mut().find(|o| o.id == *id) {
                order.email_notification = ChannelRecord {
                    sent: status.email.success,
                    sent_at: status.email.success.then_some(at),
                    error: status.email.error.clone(),
                };
                order.sms_notification = ChannelRecord {
                    sent: status.sms.success,
                    sent_at: status.sms.success.then_some(at),
                    error: status.sms.error.clone(),
                };
            }
        })
    }
}

/// Gateway double that signs with a known secret and counts order creations.
pub struct StubGateway {
    secret: String,
    calls: AtomicUsize,
    fail_next: AtomicBool,
    last_receipt: Mutex<Option<String>>,
}

impl StubGateway {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.to_string(),
            calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            last_receipt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_create(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn last_receipt(&self) -> Option<String> {
        self.last_receipt.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait::async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, AppError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut last) = self.last_receipt.lock() {
            *last = Some(request.receipt.clone());
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::gateway("Payment gateway returned 502 Bad Gateway: upstream unavailable"));
        }

        Ok(GatewayOrder {
            id: format!("order_stub{call:04}"),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
        })
    }

    fn verify_payment_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_payment_signature(&self.secret, gateway_order_id, payment_id, signature)
    }
}

#[derive(Default)]
struct SentMessages {
    otps: Vec<(String, String)>,
    orders: Vec<String>,
    support_alerts: usize,
}

/// Records every e-mail instead of sending it.
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<SentMessages>,
}

impl RecordingEmailSender {
    pub fn otps_sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.otps.clone()).unwrap_or_default()
    }

    /// External order ids of sent confirmations.
    pub fn orders_sent(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.orders.clone()).unwrap_or_default()
    }

    fn record(&self, f: impl FnOnce(&mut SentMessages)) {
        if let Ok(mut sent) = self.sent.lock() {
            f(&mut sent);
        }
    }
}

#[async_trait::async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send_otp(&self, to_email: &str, code: &str, _expires_in_minutes: i64) -> Result<(), AppError> {
        self.record(|s| s.otps.push((to_email.to_string(), code.to_string())));
        Ok(())
    }

    async fn send_order_confirmation(&self, order: &Order) -> Result<(), AppError> {
        self.record(|s| s.orders.push(order.external_order_id.clone()));
        Ok(())
    }

    async fn send_cod_support_alert(&self, _order: &Order) -> Result<(), AppError> {
        self.record(|s| s.support_alerts += 1);
        Ok(())
    }
}

/// Holds order confirmations until `release` is called.
pub struct BlockingEmailSender {
    gate: tokio::sync::Semaphore,
    inner: RecordingEmailSender,
}

impl Default for BlockingEmailSender {
    fn default() -> Self {
        Self {
            gate: tokio::sync::Semaphore::new(0),
            inner: RecordingEmailSender::default(),
        }
    }
}

impl BlockingEmailSender {
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn support_alerts(&self) -> usize {
        self.inner.sent.lock().map(|s| s.support_alerts).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl EmailSender for BlockingEmailSender {
    async fn send_otp(&self, to_email: &str, code: &str, expires_in_minutes: i64) -> Result<(), AppError> {
        self.inner.send_otp(to_email, code, expires_in_minutes).await
    }

    async fn send_order_confirmation(&self, order: &Order) -> Result<(), AppError> {
        // The permit goes back on drop so later sends pass straight through.
        let _permit = self.gate.acquire().await.map_err(|e| AppError::email(e.to_string()))?;
        self.inner.send_order_confirmation(order).await
    }

    async fn send_cod_support_alert(&self, order: &Order) -> Result<(), AppError> {
        self.inner.send_cod_support_alert(order).await
    }
}

/// Records SMS sends; `failing` makes every send return the given error.
#[derive(Default)]
pub struct RecordingSmsSender {
    failure: Option<String>,
    otps: Mutex<Vec<(String, String)>>,
    otp_attempts: AtomicUsize,
    order_attempts: AtomicUsize,
}

impl RecordingSmsSender {
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn otps_sent(&self) -> Vec<(String, String)> {
        self.otps.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn otp_attempts(&self) -> usize {
        self.otp_attempts.load(Ordering::SeqCst)
    }

    pub fn order_attempts(&self) -> usize {
        self.order_attempts.load(Ordering::SeqCst)
    }

    fn outcome(&self) -> Result<(), AppError> {
        match &self.failure {
            Some(message) => Err(AppError::sms(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl SmsSender for RecordingSmsSender {
    async fn send_otp(&self, phone: &str, code: &str, _expires_in_minutes: i64) -> Result<(), AppError> {
        self.otp_attempts.fetch_add(1, Ordering::SeqCst);
        self.outcome()?;
        if let Ok(mut otps) = self.otps.lock() {
            otps.push((phone.to_string(), code.to_string()));
        }
        Ok(())
    }

    async fn send_order_confirmation(&self, _order: &Order) -> Result<(), AppError> {
        self.order_attempts.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }
}
