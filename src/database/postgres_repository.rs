use crate::error::app_error::AppError;
use sqlx::PgPool;

#[derive(Clone)]
pub struct PostgresRepository {
    pub pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// A stored row holds a value the domain types cannot represent.
pub(crate) fn decode_error(table: &str, message: String) -> AppError {
    AppError::db(format!("Invalid row in {table}"), sqlx::Error::Decode(message.into()))
}
