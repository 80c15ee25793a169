use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::error::json::JsonBody;
use crate::models::order::{CheckoutRequest, OnlineOrderResponse, PaymentVerificationRequest, PaymentVerifiedResponse};
use crate::service::notification::NotificationDispatcher;
use crate::service::order::OrderService;
use crate::service::payment_gateway::PaymentGateway;
use crate::service::verification_token::VerificationTokenIssuer;
use rocket::serde::json::Json;
use rocket::{State, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use std::sync::Arc;

/// Create a payment order with the gateway and a local `created` order
#[openapi(tag = "Payments")]
#[post("/orders", data = "<payload>")]
pub async fn create_payment_order(
    pool: &State<PgPool>,
    config: &State<Config>,
    gateway: &State<Arc<dyn PaymentGateway>>,
    issuer: &State<VerificationTokenIssuer>,
    dispatcher: &State<Arc<NotificationDispatcher>>,
    payload: JsonBody<CheckoutRequest>,
) -> Result<Json<OnlineOrderResponse>, AppError> {
    let repo = PostgresRepository::new(pool.inner().clone());
    let service = OrderService::new(
        &repo,
        gateway.inner().as_ref(),
        issuer.inner(),
        dispatcher.inner(),
        &config.verification,
        config.notifications.dispatch_mode,
    );

    let response = service.create_online_order(&payload).await?;
    Ok(Json(response))
}

/// Verify the gateway's payment signature and settle the order
#[openapi(tag = "Payments")]
#[post("/verify", data = "<payload>")]
pub async fn verify_payment(
    pool: &State<PgPool>,
    config: &State<Config>,
    gateway: &State<Arc<dyn PaymentGateway>>,
    issuer: &State<VerificationTokenIssuer>,
    dispatcher: &State<Arc<NotificationDispatcher>>,
    payload: JsonBody<PaymentVerificationRequest>,
) -> Result<Json<PaymentVerifiedResponse>, AppError> {
    let repo = PostgresRepository::new(pool.inner().clone());
    let service = OrderService::new(
        &repo,
        gateway.inner().as_ref(),
        issuer.inner(),
        dispatcher.inner(),
        &config.verification,
        config.notifications.dispatch_mode,
    );

    let response = service.verify_payment(&payload).await?;
    Ok(Json(response))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![create_payment_order, verify_payment]
}
