use crate::config::DatabaseConfig;
use rocket::fairing::AdHoc;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;

async fn init_pool(db_config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(&db_config.url)?.application_name("storefront");

    PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout))
        .idle_timeout(Duration::from_secs(30))
        .max_lifetime(Duration::from_secs(1800))
        .connect_with(options)
        .await
}

/// Host and database name only; credentials never reach the logs.
fn describe_target(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let without_credentials = without_scheme.rsplit_once('@').map_or(without_scheme, |(_, rest)| rest);
    without_credentials.split('?').next().unwrap_or_default().to_string()
}

pub fn stage_db(db_config: DatabaseConfig) -> AdHoc {
    AdHoc::try_on_ignite("Postgres (sqlx)", |rocket| async move {
        let target = describe_target(&db_config.url);
        let connect = tokio::time::timeout(Duration::from_secs(db_config.connection_timeout.max(1)), init_pool(&db_config));

        match connect.await {
            Ok(Ok(pool)) => {
                tracing::info!(database = %target, max_connections = db_config.max_connections, "database pool initialized");
                Ok(rocket.manage(pool))
            }
            Ok(Err(e)) => {
                tracing::error!(database = %target, error = %e, "failed to initialize database pool");
                Err(rocket)
            }
            Err(_) => {
                tracing::error!(database = %target, timeout_secs = db_config.connection_timeout, "timed out connecting to database");
                Err(rocket)
            }
        }
    })
}
