//! HTTP API Layer
//!
//! REST surface for previewing and committing unit payments, built on Axum.
//!
//! # Architecture
//!
//! - **Handlers**: preview, commit and health endpoints
//! - **Middleware**: Authentication, request correlation, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: `DistributionError` mapped to HTTP status codes
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::new(engine, guard, config).with_health_check(ledger);
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod auth;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware as axum_middleware,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use core_kernel::HealthCheckable;
use domain_billing::{CommitGuard, DistributionEngine};

use crate::config::ApiConfig;
use crate::middleware::{audit_middleware, auth_middleware, REQUEST_ID_HEADER};
use crate::handlers::{health, payments};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DistributionEngine>,
    pub guard: Arc<CommitGuard>,
    pub config: ApiConfig,
    /// Adapters probed by the readiness check
    pub health_checks: Vec<Arc<dyn HealthCheckable>>,
}

impl AppState {
    pub fn new(engine: Arc<DistributionEngine>, guard: Arc<CommitGuard>, config: ApiConfig) -> Self {
        Self {
            engine,
            guard,
            config,
            health_checks: Vec::new(),
        }
    }

    /// Registers an adapter for the readiness check
    pub fn with_health_check(mut self, adapter: Arc<dyn HealthCheckable>) -> Self {
        self.health_checks.push(adapter);
        self
    }
}

/// Creates the main API router
///
/// # Arguments
///
/// * `state` - Engine, commit guard, configuration and health checks
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let payment_routes = Router::new()
        .route("/preview", post(payments::preview_payment))
        .route("/commit", post(payments::commit_payment));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/clients/:client_id/units/:unit_id/payments", payment_routes)
        .layer(axum_middleware::from_fn_with_state(state.clone(), audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    let request_id = axum::http::HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
