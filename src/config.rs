use crate::models::notification::DispatchMode;
use rocket::figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_PATH: &str = "/api";

/// Placeholder secret for local development. Release builds refuse to start with it.
pub const DEV_VERIFICATION_SECRET: &str = "dev-only-verification-secret-change-me";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
    pub api: ApiConfig,
    pub otp: OtpConfig,
    pub rate_limit: RateLimitConfig,
    pub verification: VerificationConfig,
    pub payment: PaymentConfig,
    pub email: EmailConfig,
    pub sms: SmsConfig,
    pub notifications: NotificationConfig,
    pub app: AppConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,
    pub acquire_timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub base_path: String,
    pub additional_base_paths: Vec<String>,
    pub enable_swagger: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OtpConfig {
    pub expiry_seconds: i64,
    pub max_verification_attempts: i32,
    /// Argon2 memory cost for OTP hashes, in KiB.
    pub hash_memory_kib: u32,
    pub hash_iterations: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    /// OTP issuances allowed per identifier inside one rolling window.
    pub max_requests: u32,
    pub window_minutes: u64,
    /// Upper bound on tracked identifiers; least recently used entries are evicted first.
    pub capacity: usize,
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VerificationConfig {
    pub secret: String,
    pub token_ttl_minutes: i64,
    /// Bypasses verification-token checks at checkout. Honored in debug builds only.
    pub skip_verification: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PaymentConfig {
    pub key_id: String,
    pub key_secret: String,
    pub api_base_url: String,
    pub default_currency: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
    pub from_name: String,
    pub support_address: String,
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SmsConfig {
    pub auth_key: String,
    pub sender_id: String,
    pub otp_template_id: String,
    pub order_template_id: String,
    pub api_base_url: String,
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotificationConfig {
    /// Short-circuits every e-mail and SMS send with a log line.
    pub skip: bool,
    pub dispatch_mode: DispatchMode,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub public_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/storefront_db".to_string(),
            max_connections: 16,
            min_connections: 4,
            connection_timeout: 5,
            acquire_timeout: 5,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            address: "127.0.0.1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allow_credentials: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_API_BASE_PATH.to_string(),
            additional_base_paths: Vec::new(),
            enable_swagger: true,
        }
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            expiry_seconds: 300,
            max_verification_attempts: 5,
            hash_memory_kib: 19 * 1024,
            hash_iterations: 2,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 3,
            window_minutes: 10,
            capacity: 10_000,
            cleanup_interval_seconds: 60,
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            secret: DEV_VERIFICATION_SECRET.to_string(),
            token_ttl_minutes: 15,
            skip_verification: false,
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            key_secret: String::new(),
            api_base_url: "https://api.razorpay.com/v1".to_string(),
            default_currency: "INR".to_string(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: "orders@kailash.asia".to_string(),
            from_name: "Kailash.asia".to_string(),
            support_address: "support@kailash.asia".to_string(),
            enabled: true,
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            auth_key: String::new(),
            sender_id: "KAILSH".to_string(),
            otp_template_id: String::new(),
            order_template_id: String::new(),
            api_base_url: "https://control.msg91.com/api/v5".to_string(),
            enabled: true,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            skip: false,
            dispatch_mode: DispatchMode::Background,
            max_attempts: 3,
            initial_delay_ms: 1000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:3000".to_string(),
        }
    }
}

impl VerificationConfig {
    /// Whether checkout may skip verification tokens. Always false in release builds.
    pub fn bypass_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.skip_verification
    }
}

impl OtpConfig {
    pub fn expiry(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_seconds.max(1))
    }
}

/// Maps a single legacy environment variable onto a nested config key.
fn legacy_env(name: &'static str, key: &'static str) -> Env {
    Env::raw().only(&[name]).map(move |_| key.into())
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. Compiled defaults
    /// 2. Storefront.toml (nested profiles)
    /// 3. Environment variables prefixed with STOREFRONT_ (`__` separates sections)
    /// 4. Legacy single variables such as DATABASE_URL or JWT_SECRET
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("Storefront.toml").nested())
            .merge(Env::prefixed("STOREFRONT_").split("__"))
            .merge(legacy_env("DATABASE_URL", "database.url"))
            .merge(legacy_env("JWT_SECRET", "verification.secret"))
            .merge(legacy_env("SKIP_OTP_VERIFICATION", "verification.skip_verification"))
            .merge(legacy_env("RAZORPAY_KEY_ID", "payment.key_id"))
            .merge(legacy_env("RAZORPAY_KEY_SECRET", "payment.key_secret"))
            .merge(legacy_env("OTP_EXPIRY_SECONDS", "otp.expiry_seconds"))
            .merge(legacy_env("OTP_RATE_LIMIT_REQUESTS", "rate_limit.max_requests"))
            .merge(legacy_env("OTP_RATE_LIMIT_WINDOW_MINUTES", "rate_limit.window_minutes"))
            .merge(legacy_env("SKIP_NOTIFICATIONS", "notifications.skip"))
            .merge(legacy_env("SUPPORT_EMAIL", "email.support_address"))
    }
}
