//! Login, logout and self-service password reset.

use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use warden_infra::service::{Credentials, LoginOutcome, PasswordCheck};
use warden_infra::{AccessControl, Actor};

use crate::app::dto::{PasswordCheckRequest, ResetComplete, ResetRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::blocking;
use crate::context::ClientIp;

/// POST /auth/login
pub async fn login(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(ip): Extension<ClientIp>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<LoginOutcome>, ApiError> {
    let outcome = blocking(&service, move |s| s.login(&credentials, ip.as_deref())).await?;
    Ok(Json(outcome))
}

/// POST /auth/logout
pub async fn logout(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
) -> Result<StatusCode, ApiError> {
    service.logout(&actor)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/password-policy/check
pub async fn check_password(
    Extension(service): Extension<Arc<AccessControl>>,
    Json(body): Json<PasswordCheckRequest>,
) -> Json<PasswordCheck> {
    Json(service.check_password(&body.password))
}

/// POST /auth/password-reset/request
///
/// Always 202 so the response never reveals whether the account exists.
pub async fn request_reset(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(ip): Extension<ClientIp>,
    Json(body): Json<ResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    service.request_password_reset(&body.email, ip.as_deref())?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": "if the account exists, a reset link has been sent",
        })),
    ))
}

/// POST /auth/password-reset/complete
pub async fn complete_reset(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(ip): Extension<ClientIp>,
    Json(body): Json<ResetComplete>,
) -> Result<StatusCode, ApiError> {
    blocking(&service, move |s| {
        s.complete_password_reset(&body.token, &body.new_password, ip.as_deref())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
