//! HTTP application wiring.
//!
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: HTTP-only request shapes
//! - `errors.rs`: error to response mapping

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use warden_infra::AccessControl;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router around a bootstrapped service.
pub fn build_app(service: Arc<AccessControl>) -> Router {
    let auth_state = middleware::AuthState {
        service: service.clone(),
    };

    // Protected routes: require a live session.
    let protected = routes::protected().layer(axum::middleware::from_fn_with_state(
        auth_state.clone(),
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::public())
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    auth_state,
                    middleware::client_ip_middleware,
                ))
                .layer(Extension(service)),
        )
}
