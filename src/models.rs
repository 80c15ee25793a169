pub mod health;
pub mod notification;
pub mod order;
pub mod otp;
pub mod product;
