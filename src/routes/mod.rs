use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, auth, driver, public, rider};
use crate::middleware::auth::{auth_middleware, require_admin, require_driver, require_rider};
use crate::middleware::rate_limit::{create_global_governor, create_public_governor, log_request};
use crate::middleware::role_rate_limit::{create_role_governor, RateLimitedRole};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    let driver_governor = create_role_governor(RateLimitedRole::Driver);
    let rider_governor = create_role_governor(RateLimitedRole::Rider);
    let public_governor = create_public_governor();

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/register/driver", post(auth::register_driver))
        .route("/login", post(auth::login))
        .route("/otp/request", post(auth::request_otp))
        .route("/otp/verify", post(auth::verify_otp))
        .layer(public_governor.clone());

    let public_routes = Router::new()
        .route("/fares/estimate", post(public::estimate_fare))
        .route("/vehicles/available", get(public::available_vehicles))
        .layer(public_governor);

    // Admin is covered by the global IP limiter only
    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{id}", delete(admin::delete_user))
        .route("/users/{id}/role", put(admin::update_user_role))
        .route("/rides", get(admin::list_rides))
        .route("/rides/{id}", delete(admin::delete_ride))
        .route("/rides/{id}/cancel", post(admin::cancel_ride))
        .route("/requests", get(admin::list_requests))
        .route("/requests/expire", post(admin::expire_requests))
        .route("/requests/{id}/timeout", post(admin::timeout_request))
        .route("/payments", get(admin::list_payments))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let driver_routes = Router::new()
        .route("/vehicles", get(driver::my_vehicles).post(driver::add_vehicle))
        .route("/requests", get(driver::open_requests))
        .route("/requests/{id}/accept", post(driver::accept_request))
        .route("/requests/{id}/release", post(driver::release_request))
        .route("/requests/{id}/start", post(driver::start_ride))
        .route("/requests/{id}/complete", post(driver::complete_ride))
        .route("/rides", get(driver::my_rides))
        .route("/rides/{id}/cancel", post(driver::cancel_ride))
        .route("/rides/{id}/rating", post(rider::rate_ride))
        .layer(driver_governor)
        .layer(middleware::from_fn(require_driver))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let rider_routes = Router::new()
        .route("/rides", get(rider::my_rides).post(rider::create_ride))
        .route("/rides/{id}", get(rider::get_ride))
        .route("/rides/{id}/schedule", put(rider::schedule_ride))
        .route("/rides/{id}/cancel", post(rider::cancel_ride))
        .route("/rides/{id}/rating", post(rider::rate_ride))
        .route("/rides/{id}/payments", post(rider::pay_for_ride))
        .route("/payments", get(rider::my_payments))
        .route("/payments/{id}/confirm", post(rider::confirm_payment))
        .route("/wallet", get(rider::my_wallet))
        .route("/wallet/top-up", post(rider::top_up_wallet))
        .layer(rider_governor)
        .layer(middleware::from_fn(require_rider))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api", public_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api/driver", driver_routes)
        .nest("/api/rider", rider_routes)
        .with_state(state)
}

/// The router with the server-wide layers applied. Serve it with connect info:
/// the IP limiters key on the peer address.
pub fn create_app(state: AppState) -> Router {
    // The IP limiter wraps the router on its own, outside tracing and CORS
    create_router(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
                .layer(middleware::from_fn(log_request)),
        )
        .layer(create_global_governor())
}
