use crate::config::PaymentConfig;
use crate::error::app_error::AppError;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize)]
pub struct GatewayOrderRequest {
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
}

/// Remote payment provider: creates payment orders and checks the signature the
/// provider hands the client after payment.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, AppError>;
    fn verify_payment_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool;
}

/// Hex-encoded HMAC-SHA256 of `"{order_id}|{payment_id}"`.
pub fn payment_signature(secret: &str, gateway_order_id: &str, payment_id: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| AppError::gateway(format!("Invalid signing key: {}", e)))?;
    mac.update(format!("{gateway_order_id}|{payment_id}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

const SIGNATURE_HEX_LEN: usize = 64;

/// Constant-time check of a hex signature. Only the exact lowercase encoding the
/// provider emits is accepted.
pub fn verify_payment_signature(secret: &str, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
    let canonical = signature.len() == SIGNATURE_HEX_LEN && signature.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if !canonical {
        return false;
    }
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{gateway_order_id}|{payment_id}").as_bytes());
    mac.verify_slice(&provided).is_ok()
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorBody {
    error: RazorpayError,
}

#[derive(Debug, Deserialize)]
struct RazorpayError {
    #[serde(default)]
    description: Option<String>,
}

pub struct RazorpayGateway {
    key_id: String,
    key_secret: String,
    api_base_url: String,
    client: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::gateway(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, AppError> {
        if self.key_id.is_empty() || self.key_secret.is_empty() {
            return Err(AppError::gateway("Payment gateway credentials are not configured"));
        }

        let response = self
            .client
            .post(format!("{}/orders", self.api_base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to reach payment gateway: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let description = serde_json::from_str::<RazorpayErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.description)
                .unwrap_or(body);
            return Err(AppError::gateway(format!("Payment gateway returned {}: {}", status, description)));
        }

        response
            .json::<GatewayOrder>()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to parse payment gateway response: {}", e)))
    }

    fn verify_payment_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_payment_signature(&self.key_secret, gateway_order_id, payment_id, signature)
    }
}
