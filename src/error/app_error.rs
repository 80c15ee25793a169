use crate::models::otp::OtpPurpose;
use rocket::http::{ContentType, Header, Status};
use rocket::response::Responder;
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;
use tracing::{error, warn};
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error")]
    Db {
        message: String,
        #[source]
        source: sqlx::error::Error,
    },
    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationErrors),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Too many requests. Please try again in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },
    #[error("No OTP found. Please request a new one.")]
    OtpNotFound,
    #[error("OTP has expired. Please request a new one.")]
    OtpExpired,
    #[error("Too many verification attempts. Please request a new OTP.")]
    OtpAttemptsExhausted,
    #[error("Invalid OTP")]
    OtpMismatch { attempts_remaining: i32 },
    #[error("Failed to send OTP {0}. Please try again.")]
    OtpDelivery(OtpPurpose),
    #[error("{} verification required. Please verify your {}.", capitalize(.0.as_str()), contact_noun(*.0))]
    VerificationRequired(OtpPurpose),
    #[error("Invalid or expired {0} verification. Please verify again.")]
    VerificationInvalid(OtpPurpose),
    #[error("Invalid signature")]
    InvalidPaymentSignature,
    #[error("Conflict: {0}")]
    OrderStateConflict(String),
    #[error("Failed to create payment order")]
    Gateway { message: String },
    #[error("Internal server error")]
    Email { message: String },
    #[error("Internal server error")]
    Sms { message: String },
    #[error("Internal server error")]
    ChannelDisabled(&'static str),
    #[error("Internal server error")]
    Hash { message: String },
    #[error("Internal server error")]
    Token { message: String },
    #[error("Invalid id")]
    UuidError {
        message: String,
        #[source]
        source: uuid::Error,
    },
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn contact_noun(purpose: OtpPurpose) -> &'static str {
    match purpose {
        OtpPurpose::Email => "email",
        OtpPurpose::Phone => "phone number",
    }
}

impl AppError {
    pub fn db(message: impl Into<String>, source: sqlx::error::Error) -> Self {
        Self::Db {
            message: message.into(),
            source,
        }
    }

    pub fn uuid(message: impl Into<String>, source: uuid::Error) -> Self {
        Self::UuidError {
            message: message.into(),
            source,
        }
    }

    pub fn email(message: impl Into<String>) -> Self {
        Self::Email { message: message.into() }
    }

    pub fn sms(message: impl Into<String>) -> Self {
        Self::Sms { message: message.into() }
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway { message: message.into() }
    }

    pub fn hash(message: impl Into<String>) -> Self {
        Self::Hash { message: message.into() }
    }

    /// Detail suitable for logs and notification error columns. Never sent to clients for 5xx.
    pub fn detail(&self) -> String {
        match self {
            AppError::Db { message, source } => format!("{message}: {source}"),
            AppError::Email { message }
            | AppError::Sms { message }
            | AppError::Gateway { message }
            | AppError::Hash { message }
            | AppError::Token { message } => message.clone(),
            AppError::UuidError { message, source } => format!("{message}: {source}"),
            AppError::ChannelDisabled(channel) => format!("{channel} delivery disabled"),
            other => other.to_string(),
        }
    }

    /// A disabled channel fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AppError::ChannelDisabled(_))
    }

    /// Errors raised while checking an OTP or payment signature report `verified: false`.
    fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            AppError::OtpNotFound | AppError::OtpExpired | AppError::OtpAttemptsExhausted | AppError::OtpMismatch { .. } | AppError::InvalidPaymentSignature
        )
    }
}

impl From<password_hash::Error> for AppError {
    fn from(e: password_hash::Error) -> Self {
        AppError::hash(format!("OTP hashing failed: {e}"))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AppError::Token {
            message: format!("Verification token error: {e}"),
        }
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::Db { .. } => Status::InternalServerError,
            AppError::ValidationError(_) => Status::BadRequest,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::NotFound(_) => Status::NotFound,
            AppError::RateLimited { .. } => Status::TooManyRequests,
            AppError::OtpNotFound => Status::BadRequest,
            AppError::OtpExpired => Status::BadRequest,
            AppError::OtpAttemptsExhausted => Status::TooManyRequests,
            AppError::OtpMismatch { .. } => Status::BadRequest,
            AppError::OtpDelivery(_) => Status::InternalServerError,
            AppError::VerificationRequired(_) => Status::Forbidden,
            AppError::VerificationInvalid(_) => Status::Forbidden,
            AppError::InvalidPaymentSignature => Status::BadRequest,
            AppError::OrderStateConflict(_) => Status::Conflict,
            AppError::Gateway { .. } => Status::InternalServerError,
            AppError::Email { .. } => Status::InternalServerError,
            AppError::Sms { .. } => Status::InternalServerError,
            AppError::ChannelDisabled(_) => Status::InternalServerError,
            AppError::Hash { .. } => Status::InternalServerError,
            AppError::Token { .. } => Status::InternalServerError,
            AppError::UuidError { .. } => Status::BadRequest,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<i32>,
}

impl ErrorBody {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            verified: None,
            retry_after: None,
            attempts_remaining: None,
        }
    }
}

impl From<&AppError> for ErrorBody {
    fn from(e: &AppError) -> Self {
        let mut body = ErrorBody::message(e.to_string());
        if e.is_verification_failure() {
            body.verified = Some(false);
        }
        match e {
            AppError::RateLimited { retry_after_secs } => body.retry_after = Some(*retry_after_secs),
            AppError::OtpMismatch { attempts_remaining } => body.attempts_remaining = Some(*attempts_remaining),
            _ => {}
        }
        body
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let method = req.method();
        let uri = req.uri();

        let request_id = req
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        let status = Status::from(&self);
        if status.class().is_server_error() {
            error!(
                error = ?self,
                detail = %self.detail(),
                request_id = %request_id,
                method = %method,
                uri = %uri,
                "request failed"
            );
        } else {
            warn!(
                error = %self,
                request_id = %request_id,
                method = %method,
                uri = %uri,
                status = %status.code,
                "request rejected"
            );
        }

        let body = serde_json::to_string(&ErrorBody::from(&self)).unwrap_or_else(|_| r#"{"success":false,"error":"Internal server error"}"#.to_string());

        let mut response = Response::build();
        response.status(status).header(ContentType::JSON).sized_body(body.len(), Cursor::new(body));
        if let AppError::RateLimited { retry_after_secs } = self {
            response.header(Header::new("Retry-After", retry_after_secs.to_string()));
        }
        response.ok()
    }
}

impl OpenApiResponderInner for AppError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse};
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Bad Request"),
            ("403", "Forbidden"),
            ("404", "Not Found"),
            ("409", "Conflict"),
            ("429", "Too Many Requests"),
            ("500", "Internal Server Error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::db("Database error", e),
        }
    }
}
