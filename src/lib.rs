mod config;
mod database;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod service;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;

use crate::db::stage_db;
use crate::middleware::RequestLogger;
use crate::routes as app_routes;
use crate::service::email::SmtpEmailSender;
use crate::service::notification::NotificationDispatcher;
use crate::service::otp::OtpHasher;
use crate::service::payment_gateway::{PaymentGateway, RazorpayGateway};
use crate::service::rate_limit::OtpRateLimiter;
use crate::service::retry::RetryPolicy;
use crate::service::sms::Msg91SmsSender;
use crate::service::verification_token::VerificationTokenIssuer;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, catchers, http::Method};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};
use rocket_okapi::{get_openapi_route, okapi::merge::marge_spec_list};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(log_level: &str, json_format: bool) {
    // RUST_LOG overrides the configured level, e.g. RUST_LOG=info,storefront::service=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    // A second build_rocket in the same process (tests) keeps the first subscriber.
    let _ = if json_format { subscriber.json().try_init() } else { subscriber.try_init() };
}

fn build_cors(cors_config: &config::CorsConfig) -> CorsOptions {
    let is_wildcard = cors_config.allowed_origins.len() == 1 && cors_config.allowed_origins[0] == "*";

    if is_wildcard && cors_config.allow_credentials {
        panic!(
            "Invalid CORS configuration: Cannot use wildcard origins (*) with credentials enabled. \
            Either set specific origins or disable credentials."
        );
    }

    let allowed_origins = if cors_config.allowed_origins.is_empty() {
        AllowedOrigins::some_exact::<&str>(&[])
    } else if is_wildcard {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Post, Method::Options, Method::Head]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Content-Type", "Accept", "X-Request-Id"]),
        expose_headers: ["X-Request-Id", "Retry-After"].iter().map(|h| h.to_string()).collect(),
        allow_credentials: cors_config.allow_credentials,
        ..Default::default()
    }
}

fn get_swagger_config(openapi_url: &str) -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: openapi_url.to_string(),
        ..Default::default()
    }
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return config::DEFAULT_API_BASE_PATH.to_string();
    }

    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };

    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }

    normalized
}

fn join_base_path(base_path: &str, path: &str) -> String {
    let base = base_path.trim_end_matches('/');
    let suffix = path.trim_start_matches('/');

    if base.is_empty() {
        format!("/{}", suffix)
    } else {
        format!("{}/{}", base, suffix)
    }
}

fn collect_base_paths(api_config: &config::ApiConfig) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    let mut push_unique = |path: String| {
        if !normalized.contains(&path) {
            normalized.push(path);
        }
    };

    push_unique(normalize_base_path(&api_config.base_path));
    for extra in &api_config.additional_base_paths {
        push_unique(normalize_base_path(extra));
    }

    normalized
}

struct RouteSpec {
    path: &'static str,
    routes: Vec<rocket::Route>,
    openapi: rocket_okapi::okapi::openapi3::OpenApi,
}

fn collect_route_specs() -> Vec<RouteSpec> {
    let (otp_routes, otp_openapi) = app_routes::otp::routes();
    let (payment_routes, payment_openapi) = app_routes::payment::routes();
    let (order_routes, order_openapi) = app_routes::order::routes();
    let (product_routes, product_openapi) = app_routes::product::routes();
    let (health_routes, health_openapi) = app_routes::health::routes();

    vec![
        RouteSpec {
            path: "/otp",
            routes: otp_routes,
            openapi: otp_openapi,
        },
        RouteSpec {
            path: "/payments",
            routes: payment_routes,
            openapi: payment_openapi,
        },
        RouteSpec {
            path: "/orders",
            routes: order_routes,
            openapi: order_openapi,
        },
        RouteSpec {
            path: "/products",
            routes: product_routes,
            openapi: product_openapi,
        },
        RouteSpec {
            path: "/health",
            routes: health_routes,
            openapi: health_openapi,
        },
    ]
}

fn mount_api_routes(mut rocket: Rocket<Build>, base_path: &str, enable_swagger: bool) -> Rocket<Build> {
    let route_specs = collect_route_specs();

    if !enable_swagger {
        for spec in route_specs {
            rocket = rocket.mount(join_base_path(base_path, spec.path), spec.routes);
        }
        return rocket;
    }

    let mut openapi_list = Vec::new();
    for spec in route_specs {
        rocket = rocket.mount(join_base_path(base_path, spec.path), spec.routes);
        openapi_list.push((spec.path, spec.openapi));
    }

    let openapi_docs = match marge_spec_list(&openapi_list) {
        Ok(docs) => docs,
        Err(err) => panic!("Could not merge OpenAPI spec: {}", err),
    };

    let settings = rocket_okapi::settings::OpenApiSettings::default();
    rocket = rocket.mount(base_path, vec![get_openapi_route(openapi_docs, &settings)]);

    let docs_path = join_base_path(base_path, "docs");
    let openapi_url = join_base_path(base_path, "openapi.json");
    rocket.mount(docs_path, make_swagger_ui(&get_swagger_config(&openapi_url)))
}

fn register_catchers(rocket: Rocket<Build>, base_path: &str) -> Rocket<Build> {
    rocket.register(
        base_path,
        catchers![
            app_routes::error::bad_request,
            app_routes::error::not_found,
            app_routes::error::payload_too_large,
            app_routes::error::unprocessable_entity,
            app_routes::error::too_many_requests,
            app_routes::error::internal_error
        ],
    )
}

/// Startup problems with the verification settings. Release builds refuse the
/// development secret outright and ignore the checkout bypass.
fn verification_problems(verification: &config::VerificationConfig, release: bool) -> Vec<String> {
    let mut problems = Vec::new();
    if release {
        if verification.secret.trim().is_empty() || verification.secret == config::DEV_VERIFICATION_SECRET {
            problems.push("verification.secret must be set to a private value in release builds".to_string());
        }
        if verification.token_ttl_minutes <= 0 {
            problems.push("verification.token_ttl_minutes must be positive".to_string());
        }
    }
    problems
}

fn stage_verification_checks(verification: config::VerificationConfig) -> AdHoc {
    AdHoc::try_on_ignite("Verification Settings", move |rocket| async move {
        let release = !cfg!(debug_assertions);

        if release && verification.skip_verification {
            tracing::error!("verification.skip_verification is set but ignored in release builds");
        } else if verification.bypass_enabled() {
            tracing::warn!("OTP verification bypass is enabled; checkout accepts orders without verification tokens");
        }

        let problems = verification_problems(&verification, release);
        if problems.is_empty() {
            Ok(rocket)
        } else {
            for problem in &problems {
                tracing::error!(problem = %problem, "refusing to start");
            }
            Err(rocket)
        }
    })
}

fn stage_rate_limiter(rate_limit_config: config::RateLimitConfig) -> AdHoc {
    AdHoc::on_ignite("OTP Rate Limiter", move |rocket| {
        let limiter = Arc::new(OtpRateLimiter::new(&rate_limit_config));
        limiter.clone().spawn_cleanup_task();

        Box::pin(async move { rocket.manage(limiter) })
    })
}

/// Builds the OTP, token, provider and notification singletons.
fn stage_services(config: Config) -> AdHoc {
    AdHoc::try_on_ignite("Checkout Services", move |rocket| async move {
        let hasher = match OtpHasher::new(&config.otp) {
            Ok(hasher) => hasher,
            Err(e) => {
                tracing::error!(error = %e.detail(), "invalid OTP hashing configuration");
                return Err(rocket);
            }
        };

        let gateway: Arc<dyn PaymentGateway> = match RazorpayGateway::new(&config.payment) {
            Ok(gateway) => Arc::new(gateway),
            Err(e) => {
                tracing::error!(error = %e.detail(), "failed to build payment gateway client");
                return Err(rocket);
            }
        };

        let sms = match Msg91SmsSender::new(config.sms.clone(), config.app.public_url.clone()) {
            Ok(sms) => Arc::new(sms),
            Err(e) => {
                tracing::error!(error = %e.detail(), "failed to build SMS client");
                return Err(rocket);
            }
        };

        if config.payment.key_id.is_empty() || config.payment.key_secret.is_empty() {
            tracing::warn!("payment gateway credentials missing; online checkout will fail");
        }

        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(SmtpEmailSender::new(config.email.clone())),
            sms,
            RetryPolicy::from(&config.notifications),
            config.notifications.skip,
            config.otp.expiry_seconds,
        ));

        tracing::info!(
            dispatch_mode = ?config.notifications.dispatch_mode,
            skip_notifications = config.notifications.skip,
            "checkout services ready"
        );

        Ok(rocket
            .manage(hasher)
            .manage(VerificationTokenIssuer::new(&config.verification))
            .manage(gateway)
            .manage(dispatcher)
            .manage(config))
    })
}

fn rocket_figment(server: &config::ServerConfig) -> rocket::figment::Figment {
    rocket::Config::figment()
        .merge(("port", server.port))
        .merge(("address", server.address.clone()))
}

pub fn build_rocket(config: Config) -> Rocket<Build> {
    init_tracing(&config.logging.level, config.logging.json_format);

    let cors = match build_cors(&config.cors).to_cors() {
        Ok(cors) => cors,
        Err(err) => panic!("Failed to create CORS fairing: {}", err),
    };

    let base_paths = collect_base_paths(&config.api);
    let enable_swagger = config.api.enable_swagger;

    let mut rocket = rocket::custom(rocket_figment(&config.server))
        .attach(stage_verification_checks(config.verification.clone()))
        .attach(stage_rate_limiter(config.rate_limit.clone()))
        .attach(cors)
        .attach(RequestLogger)
        .attach(stage_db(config.database.clone()))
        .attach(stage_services(config));

    for base_path in &base_paths {
        rocket = mount_api_routes(rocket, base_path, enable_swagger);
        rocket = register_catchers(rocket, base_path);
    }

    rocket
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_paths_are_normalized_and_deduplicated() {
        let api = config::ApiConfig {
            base_path: "api/".to_string(),
            additional_base_paths: vec!["/api".to_string(), " /v1 ".to_string()],
            enable_swagger: false,
        };
        assert_eq!(collect_base_paths(&api), vec!["/api".to_string(), "/v1".to_string()]);
        assert_eq!(normalize_base_path("  "), config::DEFAULT_API_BASE_PATH);
    }

    #[test]
    fn joined_paths_have_single_separator() {
        assert_eq!(join_base_path("/api/", "/docs"), "/api/docs");
        assert_eq!(join_base_path("/", "otp"), "/otp");
    }

    #[test]
    #[should_panic(expected = "Invalid CORS configuration")]
    fn wildcard_origin_with_credentials_is_rejected() {
        let cors = config::CorsConfig {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
        };
        build_cors(&cors);
    }

    #[test]
    fn release_builds_refuse_the_development_secret() {
        let verification = config::VerificationConfig::default();
        assert_eq!(verification_problems(&verification, true).len(), 1);
        assert!(verification_problems(&verification, false).is_empty());

        let private = config::VerificationConfig {
            secret: "a-long-private-secret".to_string(),
            ..config::VerificationConfig::default()
        };
        assert!(verification_problems(&private, true).is_empty());
    }

    #[test]
    fn every_route_group_is_documented() {
        let paths: Vec<&str> = collect_route_specs().iter().map(|spec| spec.path).collect();
        assert_eq!(paths, vec!["/otp", "/payments", "/orders", "/products", "/health"]);
        assert!(collect_route_specs().iter().all(|spec| !spec.routes.is_empty()));
    }
}
