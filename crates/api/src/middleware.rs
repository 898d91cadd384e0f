use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use warden_infra::{AccessControl, ServiceError};

use crate::app::errors::ApiError;
use crate::context::ClientIp;

#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<AccessControl>,
}

/// Record the caller address for every request.
pub async fn client_ip_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = ClientIp::from_request(&req, &state.service.config().server.trusted_proxies);
    req.extensions_mut().insert(ip);
    next.run(req).await
}

/// Resolve the bearer session into an [`warden_infra::Actor`] with its
/// permissions materialised once for the whole request.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?.to_string();
    let ip = req.extensions().get::<ClientIp>().cloned().unwrap_or_default();

    let actor = state.service.authenticate(&token, ip.as_deref())?;
    req.extensions_mut().insert(actor);

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(ServiceError::Unauthenticated)?;

    let header = header.to_str().map_err(|_| ServiceError::Unauthenticated)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(ServiceError::Unauthenticated)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(ServiceError::Unauthenticated.into());
    }

    Ok(token)
}
