use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Which channel an OTP proves control of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OtpPurpose {
    Email,
    Phone,
}

impl OtpPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            OtpPurpose::Email => "email",
            OtpPurpose::Phone => "phone",
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpPurpose {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "email" => Ok(OtpPurpose::Email),
            "phone" => Ok(OtpPurpose::Phone),
            other => Err(format!("unknown otp type: {other}")),
        }
    }
}

/// Row as stored in `otp_verifications`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OtpRow {
    pub id: Uuid,
    pub identifier: String,
    pub otp_type: String,
    pub otp_hash: String,
    pub verification_attempts: i32,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OtpRecord {
    pub id: Uuid,
    pub identifier: String,
    pub purpose: OtpPurpose,
    pub otp_hash: String,
    pub verification_attempts: i32,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub source_ip: String,
    pub created_at: DateTime<Utc>,
}

impl OtpRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

impl TryFrom<OtpRow> for OtpRecord {
    type Error = String;

    fn try_from(row: OtpRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            identifier: row.identifier,
            purpose: row.otp_type.parse()?,
            otp_hash: row.otp_hash,
            verification_attempts: row.verification_attempts,
            verified: row.verified,
            verified_at: row.verified_at,
            expires_at: row.expires_at,
            source_ip: row.ip_address.unwrap_or_else(|| "unknown".to_string()),
            created_at: row.created_at,
        })
    }
}

/// Values needed to persist a freshly issued OTP.
#[derive(Debug, Clone)]
pub struct NewOtpRecord {
    pub identifier: String,
    pub purpose: OtpPurpose,
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
    pub source_ip: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct SendEmailOtpRequest {
    #[validate(custom(function = "crate::service::validation::check_email"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct SendSmsOtpRequest {
    #[validate(custom(function = "crate::service::validation::check_indian_phone"))]
    pub phone: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct VerifyEmailOtpRequest {
    #[serde(alias = "identifier")]
    #[validate(custom(function = "crate::service::validation::check_email"))]
    pub email: String,
    #[validate(length(equal = 6, message = "Invalid OTP format"))]
    pub otp: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct VerifyPhoneOtpRequest {
    #[serde(alias = "identifier")]
    #[validate(custom(function = "crate::service::validation::check_indian_phone"))]
    pub phone: String,
    #[validate(length(equal = 6, message = "Invalid OTP format"))]
    pub otp: String,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OtpSentResponse {
    pub success: bool,
    pub message: String,
    /// Seconds until the code expires
    pub expires_in: i64,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OtpVerifiedResponse {
    pub success: bool,
    pub verified: bool,
    /// Signed token to present at checkout
    pub verification_token: String,
}
