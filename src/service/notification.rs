use crate::error::app_error::AppError;
use crate::models::notification::{ChannelOutcome, NotificationStatus};
use crate::models::order::Order;
use crate::models::otp::OtpPurpose;
use crate::service::email::EmailSender;
use crate::service::retry::RetryPolicy;
use crate::service::sms::SmsSender;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Fans order and OTP messages out to the e-mail and SMS channels.
pub struct NotificationDispatcher {
    email: Arc<dyn EmailSender>,
    sms: Arc<dyn SmsSender>,
    retry: RetryPolicy,
    skip: bool,
    otp_expiry_minutes: i64,
}

impl NotificationDispatcher {
    pub fn new(email: Arc<dyn EmailSender>, sms: Arc<dyn SmsSender>, retry: RetryPolicy, skip: bool, otp_expiry_seconds: i64) -> Self {
        Self {
            email,
            sms,
            retry,
            skip,
            otp_expiry_minutes: (otp_expiry_seconds.max(60) + 59) / 60,
        }
    }

    /// Sends the order confirmation on both channels, each with its own retries.
    /// Never fails: a channel that exhausts its attempts is reported, not raised.
    pub async fn send_order_notifications(&self, order: &Order) -> NotificationStatus {
        if self.skip {
            info!(order_id = %order.external_order_id, "notifications skipped by configuration");
            return NotificationStatus {
                email: ChannelOutcome::delivered(),
                sms: ChannelOutcome::delivered(),
            };
        }

        let email = self
            .retry
            .run_while("order confirmation email", || self.email.send_order_confirmation(order), AppError::is_retryable);
        let sms = self
            .retry
            .run_while("order confirmation sms", || self.sms.send_order_confirmation(order), AppError::is_retryable);
        let (email, sms) = tokio::join!(email, sms);

        NotificationStatus {
            email: outcome(order, "email", email),
            sms: outcome(order, "sms", sms),
        }
    }

    /// Delivers an OTP once over the channel matching `purpose`.
    pub async fn deliver_otp(&self, purpose: OtpPurpose, identifier: &str, code: &str) -> Result<(), AppError> {
        if self.skip {
            if cfg!(debug_assertions) {
                info!(channel = %purpose, identifier = %identifier, otp = %code, "notifications skipped, OTP logged for development");
            } else {
                info!(channel = %purpose, identifier = %identifier, "notifications skipped, OTP not delivered");
            }
            return Ok(());
        }

        match purpose {
            OtpPurpose::Email => self.email.send_otp(identifier, code, self.otp_expiry_minutes).await,
            OtpPurpose::Phone => self.sms.send_otp(identifier, code, self.otp_expiry_minutes).await,
        }
    }

    /// Single attempt; the outcome is only logged.
    pub async fn send_cod_support_alert(&self, order: &Order) {
        if self.skip {
            info!(order_id = %order.external_order_id, "COD support alert skipped by configuration");
            return;
        }

        match self.email.send_cod_support_alert(order).await {
            Ok(()) => info!(order_id = %order.external_order_id, "COD support alert sent"),
            Err(e) => warn!(order_id = %order.external_order_id, error = %e.detail(), "COD support alert failed"),
        }
    }
}

fn outcome(order: &Order, channel: &str, result: Result<(), AppError>) -> ChannelOutcome {
    match result {
        Ok(()) => {
            info!(order_id = %order.external_order_id, channel = %channel, "order notification delivered");
            ChannelOutcome::delivered()
        }
        Err(e) => {
            let detail = e.detail();
            error!(order_id = %order.external_order_id, channel = %channel, error = %detail, "order notification failed after retries");
            ChannelOutcome::failed(detail)
        }
    }
}
