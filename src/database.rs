pub mod order;
pub mod otp;
pub mod postgres_repository;
pub mod product;
