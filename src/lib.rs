//! Checkout payment gateway
//!
//! Starts card payments through the Garanti BBVA 3-D Secure gateway and
//! hosted payments through PayTR, then settles them from the providers'
//! callbacks exactly once.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod payments;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::RedirectConfig;
use crate::payments::providers::{GarantiProvider, PaytrProvider};
use crate::payments::service::PaymentService;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentService>,
    pub garanti: Arc<GarantiProvider>,
    pub paytr: Arc<PaytrProvider>,
    pub redirects: RedirectConfig,
    pub environment: String,
    /// `None` when running on a non-Postgres store
    pub db: Option<PgPool>,
}

/// Build the HTTP router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health::health_check))
        .route(
            "/payments/garanti/initiate",
            post(api::payments::garanti_initiate),
        )
        .route(
            "/payments/garanti/callback",
            post(api::payments::garanti_callback),
        )
        .route("/payments/paytr/initiate", post(api::payments::paytr_initiate))
        .route("/payments/paytr/callback", post(api::payments::paytr_callback))
        .route(
            "/payments/installments/:order_id",
            get(api::payments::installments),
        )
        .route(
            "/payments/failure-message",
            get(api::payments::failure_message_lookup),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
