pub mod email;
pub mod notification;
pub mod order;
pub mod otp;
pub mod payment_gateway;
pub mod rate_limit;
pub mod retry;
pub mod sms;
pub mod validation;
pub mod verification_token;
