pub mod error;
pub mod health;
pub mod order;
pub mod otp;
pub mod payment;
pub mod product;
