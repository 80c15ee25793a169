use crate::database::postgres_repository::{PostgresRepository, decode_error};
use crate::error::app_error::AppError;
use crate::models::otp::{NewOtpRecord, OtpPurpose, OtpRecord, OtpRow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

const OTP_COLUMNS: &str = "id, identifier, otp_type, otp_hash, verification_attempts, verified, verified_at, expires_at, ip_address, created_at";

#[async_trait::async_trait]
pub trait OtpRepository {
    async fn insert_otp(&self, record: &NewOtpRecord) -> Result<OtpRecord, AppError>;
    /// Most recently created unverified record for the identifier and purpose.
    async fn find_latest_unverified(&self, identifier: &str, purpose: OtpPurpose) -> Result<Option<OtpRecord>, AppError>;
    /// Increments the attempt counter unless it already reached `max_attempts`.
    /// Returns the new count, or `None` when the cap was already hit.
    async fn increment_attempts(&self, id: &Uuid, max_attempts: i32) -> Result<Option<i32>, AppError>;
    /// Marks the record verified. Returns false if it was already verified.
    async fn mark_verified(&self, id: &Uuid, verified_at: DateTime<Utc>) -> Result<bool, AppError>;
}

fn into_record(row: OtpRow) -> Result<OtpRecord, AppError> {
    OtpRecord::try_from(row).map_err(|e| decode_error("otp_verifications", e))
}

#[async_trait::async_trait]
impl OtpRepository for PostgresRepository {
    async fn insert_otp(&self, record: &NewOtpRecord) -> Result<OtpRecord, AppError> {
        let row = sqlx::query_as::<_, OtpRow>(&format!(
            r#"
            INSERT INTO otp_verifications (identifier, otp_type, otp_hash, expires_at, ip_address)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {OTP_COLUMNS}
            "#
        ))
        .bind(&record.identifier)
        .bind(record.purpose.as_str())
        .bind(&record.otp_hash)
        .bind(record.expires_at)
        .bind(&record.source_ip)
        .fetch_one(&self.pool)
        .await?;

        into_record(row)
    }

    async fn find_latest_unverified(&self, identifier: &str, purpose: OtpPurpose) -> Result<Option<OtpRecord>, AppError> {
        let row = sqlx::query_as::<_, OtpRow>(&format!(
            r#"
            SELECT {OTP_COLUMNS}
            FROM otp_verifications
            WHERE identifier = $1 AND otp_type = $2 AND verified = false
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(identifier)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_record).transpose()
    }

    async fn increment_attempts(&self, id: &Uuid, max_attempts: i32) -> Result<Option<i32>, AppError> {
        let attempts = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE otp_verifications
            SET verification_attempts = verification_attempts + 1, updated_at = NOW()
            WHERE id = $1 AND verification_attempts < $2
            RETURNING verification_attempts
            "#,
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempts)
    }

    async fn mark_verified(&self, id: &Uuid, verified_at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE otp_verifications
            SET verified = true, verified_at = $2, updated_at = NOW()
            WHERE id = $1 AND verified = false
            "#,
        )
        .bind(id)
        .bind(verified_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
