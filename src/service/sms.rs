use crate::config::SmsConfig;
use crate::error::app_error::AppError;
use crate::models::order::Order;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const COUNTRY_CODE: &str = "91";

#[async_trait::async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_otp(&self, phone: &str, code: &str, expires_in_minutes: i64) -> Result<(), AppError>;
    async fn send_order_confirmation(&self, order: &Order) -> Result<(), AppError>;
}

#[derive(Debug, Serialize)]
struct OtpRequest<'a> {
    template_id: &'a str,
    mobile: String,
    otp: &'a str,
    otp_expiry: i64,
}

#[derive(Debug, Serialize)]
struct FlowRequest<'a> {
    template_id: &'a str,
    sender: &'a str,
    short_url: &'a str,
    mobiles: String,
    order_id: String,
    amount: String,
    tracking_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct Msg91Response {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// MSG91 client for OTP and order-flow SMS.
pub struct Msg91SmsSender {
    config: SmsConfig,
    public_url: String,
    client: reqwest::Client,
}

impl Msg91SmsSender {
    pub fn new(config: SmsConfig, public_url: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::sms(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, public_url, client })
    }

    fn require_template<'a>(&self, template_id: &'a str) -> Result<&'a str, AppError> {
        if self.config.auth_key.is_empty() || template_id.is_empty() {
            return Err(AppError::sms("SMS not configured - MSG91 credentials missing"));
        }
        Ok(template_id)
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), AppError> {
        let url = format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .header("authkey", &self.config.auth_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::sms(format!("Failed to reach SMS provider: {}", e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let parsed: Msg91Response = serde_json::from_str(&text).unwrap_or_default();

        if is_delivery_failure(status.is_success(), &parsed) {
            let message = parsed.message.unwrap_or_else(|| format!("SMS provider returned {}", status));
            return Err(AppError::sms(message));
        }

        Ok(())
    }
}

/// The provider reports success either through a 2xx status or a `type: "success"` body.
fn is_delivery_failure(http_ok: bool, response: &Msg91Response) -> bool {
    response.kind.as_deref() != Some("success") && !http_ok
}

/// Phone number with the country code prefixed when missing.
pub fn international_number(phone: &str) -> String {
    if phone.starts_with(COUNTRY_CODE) && phone.len() > 10 {
        phone.to_string()
    } else {
        format!("{COUNTRY_CODE}{phone}")
    }
}

/// Last ten characters of the order id; SMS templates cap variable length.
pub fn short_order_id(order_id: &str) -> String {
    let count = order_id.chars().count();
    order_id.chars().skip(count.saturating_sub(10)).collect()
}

pub fn tracking_url(public_url: &str, order: &Order) -> String {
    format!("{}/order/success?orderId={}", public_url.trim_end_matches('/'), order.id)
}

#[async_trait::async_trait]
impl SmsSender for Msg91SmsSender {
    async fn send_otp(&self, phone: &str, code: &str, expires_in_minutes: i64) -> Result<(), AppError> {
        if !self.config.enabled {
            tracing::warn!(phone = %phone, "SMS delivery disabled, skipping OTP SMS");
            return Err(AppError::ChannelDisabled("sms"));
        }

        let template_id = self.require_template(&self.config.otp_template_id)?;
        let request = OtpRequest {
            template_id,
            mobile: international_number(phone),
            otp: code,
            otp_expiry: expires_in_minutes,
        };

        self.post("otp", &request).await?;
        tracing::info!(phone = %phone, "OTP SMS sent");
        Ok(())
    }

    async fn send_order_confirmation(&self, order: &Order) -> Result<(), AppError> {
        if !self.config.enabled {
            tracing::warn!(order_id = %order.external_order_id, "SMS delivery disabled, skipping order SMS");
            return Err(AppError::ChannelDisabled("sms"));
        }

        let template_id = self.require_template(&self.config.order_template_id)?;
        let request = FlowRequest {
            template_id,
            sender: &self.config.sender_id,
            short_url: "1",
            mobiles: international_number(&order.customer_phone),
            order_id: short_order_id(&order.external_order_id),
            amount: (order.amount / 100).to_string(),
            tracking_url: tracking_url(&self.public_url, order),
        };

        self.post("flow", &request).await?;
        tracing::info!(order_id = %order.external_order_id, "order confirmation SMS sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{OrderStatus, PaymentMethod};
    use crate::test_utils::sample_order;

    #[test]
    fn prefixes_country_code_once() {
        assert_eq!(international_number("9876543210"), "919876543210");
        assert_eq!(international_number("919876543210"), "919876543210");
        // A local number that happens to start with 91 still gets the prefix.
        assert_eq!(international_number("9187654321"), "919187654321");
    }

    #[test]
    fn short_order_id_keeps_last_ten_chars() {
        assert_eq!(short_order_id("COD_1700000000000_ab12cd34"), "0_ab12cd34".to_string());
        assert_eq!(short_order_id("order_1"), "order_1");
    }

    #[test]
    fn tracking_url_points_at_success_page() {
        let order = sample_order(OrderStatus::Paid, PaymentMethod::Online);
        let url = tracking_url("https://kailash.asia/", &order);
        assert_eq!(url, format!("https://kailash.asia/order/success?orderId={}", order.id));
    }

    #[test]
    fn failure_requires_both_bad_status_and_non_success_body() {
        let success_body = Msg91Response {
            kind: Some("success".to_string()),
            message: None,
        };
        let error_body = Msg91Response {
            kind: Some("error".to_string()),
            message: Some("invalid template".to_string()),
        };

        assert!(!is_delivery_failure(false, &success_body));
        assert!(!is_delivery_failure(true, &error_body));
        assert!(is_delivery_failure(false, &error_body));
        assert!(is_delivery_failure(false, &Msg91Response::default()));
    }

    #[tokio::test]
    async fn missing_credentials_fail_fast() {
        let sender = Msg91SmsSender::new(SmsConfig::default(), "http://localhost:3000".to_string()).expect("client");
        let err = sender.send_otp("9876543210", "123456", 5).await.expect_err("not configured");
        assert!(err.detail().contains("MSG91 credentials missing"));
    }
}
