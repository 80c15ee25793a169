use crate::config::VerificationConfig;
use crate::error::app_error::AppError;
use crate::models::otp::OtpPurpose;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Claims of a verification token. The identifier sits under the key named by
/// the purpose, so an e-mail token carries `email` and a phone token `phone`.
#[derive(Debug, Serialize, Deserialize)]
struct VerificationClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
    #[serde(rename = "type")]
    purpose: OtpPurpose,
    verified: bool,
    iat: i64,
    exp: i64,
}

impl VerificationClaims {
    fn identifier(&self) -> Option<&str> {
        match self.purpose {
            OtpPurpose::Email => self.email.as_deref(),
            OtpPurpose::Phone => self.phone.as_deref(),
        }
    }
}

/// Signs and checks the short-lived tokens that prove an identifier passed OTP verification.
#[derive(Clone)]
pub struct VerificationTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl VerificationTokenIssuer {
    pub fn new(config: &VerificationConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            ttl: Duration::minutes(config.token_ttl_minutes.max(1)),
        }
    }

    pub fn issue(&self, identifier: &str, purpose: OtpPurpose) -> Result<String, AppError> {
        self.issue_at(identifier, purpose, Utc::now())
    }

    pub fn issue_at(&self, identifier: &str, purpose: OtpPurpose, now: DateTime<Utc>) -> Result<String, AppError> {
        let (email, phone) = match purpose {
            OtpPurpose::Email => (Some(identifier.to_string()), None),
            OtpPurpose::Phone => (None, Some(identifier.to_string())),
        };
        let claims = VerificationClaims {
            email,
            phone,
            purpose,
            verified: true,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// True only for an unexpired, correctly signed token asserting `identifier` for `purpose`.
    pub fn validate(&self, token: &str, identifier: &str, purpose: OtpPurpose) -> bool {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let claims = match decode::<VerificationClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(purpose = %purpose, error = %e, "verification token rejected");
                return false;
            }
        };

        claims.verified && claims.purpose == purpose && claims.identifier() == Some(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(secret: &str) -> VerificationTokenIssuer {
        VerificationTokenIssuer::new(&VerificationConfig {
            secret: secret.to_string(),
            token_ttl_minutes: 15,
            skip_verification: false,
        })
    }

    #[test]
    fn accepts_matching_identifier_and_purpose() {
        let issuer = issuer("secret");
        let token = issuer.issue("a@x.com", OtpPurpose::Email).expect("token");
        assert!(issuer.validate(&token, "a@x.com", OtpPurpose::Email));
    }

    #[test]
    fn rejects_wrong_purpose() {
        let issuer = issuer("secret");
        let token = issuer.issue("a@x.com", OtpPurpose::Email).expect("token");
        assert!(!issuer.validate(&token, "a@x.com", OtpPurpose::Phone));
    }

    #[test]
    fn rejects_different_identifier() {
        let issuer = issuer("secret");
        let token = issuer.issue("a@x.com", OtpPurpose::Email).expect("token");
        assert!(!issuer.validate(&token, "b@x.com", OtpPurpose::Email));
    }

    #[test]
    fn rejects_expired_token() {
        let issuer = issuer("secret");
        let issued_at = Utc::now() - Duration::minutes(16);
        let token = issuer.issue_at("9876543210", OtpPurpose::Phone, issued_at).expect("token");
        assert!(!issuer.validate(&token, "9876543210", OtpPurpose::Phone));
    }

    #[test]
    fn rejects_token_signed_with_another_secret() {
        let token = issuer("other").issue("a@x.com", OtpPurpose::Email).expect("token");
        assert!(!issuer("secret").validate(&token, "a@x.com", OtpPurpose::Email));
    }

    #[test]
    fn rejects_altered_payload() {
        let issuer = issuer("secret");
        let genuine = issuer.issue("a@x.com", OtpPurpose::Email).expect("token");
        let forged_claims = issuer.issue("b@x.com", OtpPurpose::Email).expect("token");

        let genuine_parts: Vec<&str> = genuine.split('.').collect();
        let forged_parts: Vec<&str> = forged_claims.split('.').collect();
        let spliced = format!("{}.{}.{}", genuine_parts[0], forged_parts[1], genuine_parts[2]);

        assert!(!issuer.validate(&spliced, "b@x.com", OtpPurpose::Email));
        assert!(!issuer.validate("not-a-token", "a@x.com", OtpPurpose::Email));
    }
}
