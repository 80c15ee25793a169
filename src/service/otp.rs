use crate::config::OtpConfig;
use crate::database::otp::OtpRepository;
use crate::error::app_error::AppError;
use crate::models::otp::{NewOtpRecord, OtpPurpose, OtpSentResponse, OtpVerifiedResponse};
use crate::service::notification::NotificationDispatcher;
use crate::service::rate_limit::{OtpRateLimiter, RateLimitDecision};
use crate::service::verification_token::VerificationTokenIssuer;
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use password_hash::rand_core::{OsRng, RngCore};
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use tracing::{error, info, warn};

const OTP_MIN: u32 = 100_000;
const OTP_SPAN: u32 = 900_000;

/// Six-digit code drawn uniformly from [100000, 999999] using the OS CSPRNG.
pub fn generate_otp() -> String {
    // Reject the tail of the u32 range so every code is equally likely.
    let zone = u32::MAX - (u32::MAX % OTP_SPAN);
    loop {
        let candidate = OsRng.next_u32();
        if candidate < zone {
            return (OTP_MIN + candidate % OTP_SPAN).to_string();
        }
    }
}

pub fn expiry_from(now: DateTime<Utc>, config: &OtpConfig) -> DateTime<Utc> {
    now + config.expiry()
}

pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now > expires_at
}

/// Salted Argon2id hashing for OTP codes. Hashing runs on the blocking pool.
#[derive(Clone)]
pub struct OtpHasher {
    argon2: Argon2<'static>,
}

impl OtpHasher {
    pub fn new(config: &OtpConfig) -> Result<Self, AppError> {
        let params = Params::new(config.hash_memory_kib, config.hash_iterations, 1, None)
            .map_err(|e| AppError::hash(format!("Invalid OTP hash parameters: {}", e)))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn hash_sync(&self, code: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(self.argon2.hash_password(code.as_bytes(), &salt)?.to_string())
    }

    /// Constant-time comparison through the hash library. A malformed hash is an error.
    pub fn verify_sync(&self, code: &str, hash: &str) -> Result<bool, AppError> {
        let parsed = PasswordHash::new(hash)?;
        match self.argon2.verify_password(code.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn hash(&self, code: String) -> Result<String, AppError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash_sync(&code))
            .await
            .map_err(|e| AppError::hash(format!("OTP hashing task failed: {}", e)))?
    }

    pub async fn verify(&self, code: String, hash: String) -> Result<bool, AppError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify_sync(&code, &hash))
            .await
            .map_err(|e| AppError::hash(format!("OTP verification task failed: {}", e)))?
    }
}

pub struct OtpService<'a, R: OtpRepository + ?Sized> {
    repository: &'a R,
    config: &'a OtpConfig,
    hasher: &'a OtpHasher,
    limiter: &'a OtpRateLimiter,
    issuer: &'a VerificationTokenIssuer,
    dispatcher: &'a NotificationDispatcher,
}

impl<'a, R: OtpRepository + Sync + ?Sized> OtpService<'a, R> {
    pub fn new(
        repository: &'a R,
        config: &'a OtpConfig,
        hasher: &'a OtpHasher,
        limiter: &'a OtpRateLimiter,
        issuer: &'a VerificationTokenIssuer,
        dispatcher: &'a NotificationDispatcher,
    ) -> Self {
        OtpService {
            repository,
            config,
            hasher,
            limiter,
            issuer,
            dispatcher,
        }
    }

    /// Rate-limits, stores a hashed code and delivers the plaintext over the purpose's channel.
    /// `identifier` must already be normalized (lowercased e-mail or 10-digit phone).
    pub async fn request_otp(&self, purpose: OtpPurpose, identifier: &str, source_ip: &str) -> Result<OtpSentResponse, AppError> {
        if let RateLimitDecision::Limited { retry_after_secs } = self.limiter.check_and_record(identifier).await {
            return Err(AppError::RateLimited { retry_after_secs });
        }

        let code = generate_otp();
        let otp_hash = self.hasher.hash(code.clone()).await?;
        let record = NewOtpRecord {
            identifier: identifier.to_string(),
            purpose,
            otp_hash,
            expires_at: expiry_from(Utc::now(), self.config),
            source_ip: source_ip.to_string(),
        };
        let stored = self.repository.insert_otp(&record).await?;

        if let Err(e) = self.dispatcher.deliver_otp(purpose, identifier, &code).await {
            error!(otp_id = %stored.id, channel = %purpose, error = %e.detail(), "OTP delivery failed");
            return Err(AppError::OtpDelivery(purpose));
        }

        info!(otp_id = %stored.id, channel = %purpose, source_ip = %source_ip, "OTP issued");
        Ok(OtpSentResponse {
            success: true,
            message: sent_message(purpose).to_string(),
            expires_in: self.config.expiry_seconds,
        })
    }

    /// Checks `code` against the latest unverified record for the identifier.
    pub async fn verify_otp(&self, purpose: OtpPurpose, identifier: &str, code: &str) -> Result<OtpVerifiedResponse, AppError> {
        self.verify_otp_at(purpose, identifier, code, Utc::now()).await
    }

    pub async fn verify_otp_at(&self, purpose: OtpPurpose, identifier: &str, code: &str, now: DateTime<Utc>) -> Result<OtpVerifiedResponse, AppError> {
        let max_attempts = self.config.max_verification_attempts;

        let record = self
            .repository
            .find_latest_unverified(identifier, purpose)
            .await?
            .ok_or(AppError::OtpNotFound)?;

        if record.is_expired(now) {
            return Err(AppError::OtpExpired);
        }

        if record.verification_attempts >= max_attempts {
            warn!(otp_id = %record.id, channel = %purpose, "OTP attempts exhausted");
            return Err(AppError::OtpAttemptsExhausted);
        }

        if !self.hasher.verify(code.to_string(), record.otp_hash.clone()).await? {
            let Some(attempts) = self.repository.increment_attempts(&record.id, max_attempts).await? else {
                // A concurrent attempt used the last slot.
                return Err(AppError::OtpAttemptsExhausted);
            };
            let attempts_remaining = (max_attempts - attempts).max(0);
            warn!(otp_id = %record.id, channel = %purpose, attempts, attempts_remaining, "OTP mismatch");
            return Err(AppError::OtpMismatch { attempts_remaining });
        }

        if !self.repository.mark_verified(&record.id, now).await? {
            // Another request already consumed this code.
            return Err(AppError::OtpNotFound);
        }

        let verification_token = self.issuer.issue(identifier, purpose)?;
        info!(otp_id = %record.id, channel = %purpose, "OTP verified");

        Ok(OtpVerifiedResponse {
            success: true,
            verified: true,
            verification_token,
        })
    }
}

fn sent_message(purpose: OtpPurpose) -> &'static str {
    match purpose {
        OtpPurpose::Email => "OTP sent to your email",
        OtpPurpose::Phone => "OTP sent to your phone",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitConfig, VerificationConfig};
    use crate::service::retry::RetryPolicy;
    use crate::test_utils::{MockRepository, RecordingEmailSender, RecordingSmsSender};
    use std::sync::Arc;

    fn fast_config() -> OtpConfig {
        OtpConfig {
            hash_memory_kib: 1024,
            hash_iterations: 1,
            ..OtpConfig::default()
        }
    }

    struct Fixture {
        repository: MockRepository,
        config: OtpConfig,
        hasher: OtpHasher,
        limiter: OtpRateLimiter,
        issuer: VerificationTokenIssuer,
        dispatcher: NotificationDispatcher,
        email: Arc<RecordingEmailSender>,
    }

    impl Fixture {
        fn new() -> Self {
            let config = fast_config();
            let email = Arc::new(RecordingEmailSender::default());
            Self {
                repository: MockRepository::default(),
                hasher: OtpHasher::new(&config).expect("params"),
                limiter: OtpRateLimiter::new(&RateLimitConfig::default()),
                issuer: VerificationTokenIssuer::new(&VerificationConfig::default()),
                dispatcher: NotificationDispatcher::new(email.clone(), Arc::new(RecordingSmsSender::default()), RetryPolicy::default(), false, 300),
                email,
                config,
            }
        }

        fn service(&self) -> OtpService<'_, MockRepository> {
            OtpService::new(&self.repository, &self.config, &self.hasher, &self.limiter, &self.issuer, &self.dispatcher)
        }

        /// Issues an OTP and returns the plaintext code that was "mailed".
        async fn issue(&self, email: &str) -> String {
            self.service().request_otp(OtpPurpose::Email, email, "127.0.0.1").await.expect("issued");
            self.email.otps_sent().last().map(|(_, code)| code.clone()).expect("code delivered")
        }
    }

    fn wrong_code(code: &str) -> String {
        if code == "123456" { "654321".to_string() } else { "123456".to_string() }
    }

    #[test]
    fn generated_codes_are_six_digits_in_range() {
        for _ in 0..1000 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().expect("numeric");
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn hash_round_trips_and_rejects_other_codes() {
        let hasher = OtpHasher::new(&fast_config()).expect("params");
        let code = generate_otp();
        let hash = hasher.hash_sync(&code).expect("hash");

        assert!(!hash.contains(&code));
        assert!(hasher.verify_sync(&code, &hash).expect("verify"));
        assert!(!hasher.verify_sync(&wrong_code(&code), &hash).expect("verify"));
        assert!(hasher.verify_sync(&code, "not-a-hash").is_err());
    }

    #[test]
    fn expiry_is_configured_seconds_ahead() {
        let now = Utc::now();
        let expires_at = expiry_from(now, &OtpConfig::default());
        assert_eq!(expires_at - now, chrono::Duration::seconds(300));
        assert!(!is_expired(expires_at, now));
        assert!(is_expired(expires_at, expires_at + chrono::Duration::seconds(1)));
    }

    #[tokio::test]
    async fn issued_code_verifies_and_yields_a_token() {
        let fixture = Fixture::new();
        let code = fixture.issue("a@x.com").await;

        let stored = fixture.repository.otps();
        assert_eq!(stored.len(), 1);
        assert_ne!(stored[0].otp_hash, code);
        assert_eq!(stored[0].source_ip, "127.0.0.1");

        let response = fixture.service().verify_otp(OtpPurpose::Email, "a@x.com", &code).await.expect("verified");
        assert!(response.verified);
        assert!(fixture.issuer.validate(&response.verification_token, "a@x.com", OtpPurpose::Email));
        assert!(fixture.repository.otps()[0].verified);
    }

    #[tokio::test]
    async fn fourth_request_in_window_is_rate_limited() {
        let fixture = Fixture::new();
        for _ in 0..3 {
            fixture.issue("a@x.com").await;
        }

        let err = fixture
            .service()
            .request_otp(OtpPurpose::Email, "a@x.com", "127.0.0.1")
            .await
            .expect_err("limited");
        assert!(matches!(err, AppError::RateLimited { retry_after_secs } if retry_after_secs > 0));
        assert_eq!(fixture.repository.otps().len(), 3);
    }

    #[tokio::test]
    async fn wrong_codes_count_down_then_lock_out() {
        let fixture = Fixture::new();
        let code = fixture.issue("a@x.com").await;
        let wrong = wrong_code(&code);

        for expected_remaining in [4, 3, 2, 1, 0] {
            let err = fixture
                .service()
                .verify_otp(OtpPurpose::Email, "a@x.com", &wrong)
                .await
                .expect_err("mismatch");
            assert!(matches!(err, AppError::OtpMismatch { attempts_remaining } if attempts_remaining == expected_remaining));
        }

        // Even the right code is refused once attempts are exhausted.
        let err = fixture.service().verify_otp(OtpPurpose::Email, "a@x.com", &code).await.expect_err("exhausted");
        assert!(matches!(err, AppError::OtpAttemptsExhausted));
        assert_eq!(fixture.repository.otps()[0].verification_attempts, 5);
    }

    #[tokio::test]
    async fn concurrent_wrong_codes_cannot_both_take_the_last_attempt() {
        let fixture = Fixture::new();
        let code = fixture.issue("a@x.com").await;
        let wrong = wrong_code(&code);
        let max_attempts = fixture.config.max_verification_attempts;
        let id = fixture.repository.otps()[0].id;
        for _ in 0..max_attempts - 1 {
            fixture.repository.increment_attempts(&id, max_attempts).await.expect("increment");
        }

        let service = fixture.service();
        let (first, second) = tokio::join!(
            service.verify_otp(OtpPurpose::Email, "a@x.com", &wrong),
            service.verify_otp(OtpPurpose::Email, "a@x.com", &wrong),
        );
        let errors = [first.expect_err("mismatch"), second.expect_err("mismatch")];

        let mismatches = errors
            .iter()
            .filter(|e| matches!(e, AppError::OtpMismatch { attempts_remaining: 0 }))
            .count();
        let exhausted = errors.iter().filter(|e| matches!(e, AppError::OtpAttemptsExhausted)).count();
        assert_eq!((mismatches, exhausted), (1, 1));
        assert_eq!(fixture.repository.otps()[0].verification_attempts, max_attempts);
    }

    #[tokio::test]
    async fn expired_code_is_rejected_without_counting() {
        let fixture = Fixture::new();
        let code = fixture.issue("a@x.com").await;
        let later = Utc::now() + chrono::Duration::seconds(301);

        let err = fixture
            .service()
            .verify_otp_at(OtpPurpose::Email, "a@x.com", &code, later)
            .await
            .expect_err("expired");
        assert!(matches!(err, AppError::OtpExpired));
        assert_eq!(fixture.repository.otps()[0].verification_attempts, 0);
    }

    #[tokio::test]
    async fn unknown_identifier_and_wrong_purpose_find_nothing() {
        let fixture = Fixture::new();
        let code = fixture.issue("a@x.com").await;

        let err = fixture.service().verify_otp(OtpPurpose::Email, "b@x.com", &code).await.expect_err("none");
        assert!(matches!(err, AppError::OtpNotFound));
        let err = fixture.service().verify_otp(OtpPurpose::Phone, "a@x.com", &code).await.expect_err("none");
        assert!(matches!(err, AppError::OtpNotFound));
    }

    #[tokio::test]
    async fn latest_code_wins() {
        let fixture = Fixture::new();
        let first = fixture.issue("a@x.com").await;
        let second = fixture.issue("a@x.com").await;

        if first != second {
            let err = fixture.service().verify_otp(OtpPurpose::Email, "a@x.com", &first).await.expect_err("stale");
            assert!(matches!(err, AppError::OtpMismatch { .. }));
        }
        assert!(fixture.service().verify_otp(OtpPurpose::Email, "a@x.com", &second).await.is_ok());
    }

    #[tokio::test]
    async fn verified_code_cannot_be_reused() {
        let fixture = Fixture::new();
        let code = fixture.issue("a@x.com").await;

        fixture.service().verify_otp(OtpPurpose::Email, "a@x.com", &code).await.expect("verified");
        let err = fixture.service().verify_otp(OtpPurpose::Email, "a@x.com", &code).await.expect_err("consumed");
        assert!(matches!(err, AppError::OtpNotFound));
    }
}
