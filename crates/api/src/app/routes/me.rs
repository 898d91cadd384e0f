//! The caller's own account: profile view, password and second factor.

use std::sync::Arc;

use axum::{extract::Extension, Json};

use warden_auth::TwoFactorEnrollment;
use warden_infra::service::{MeView, SessionGrant, UserView};
use warden_infra::{AccessControl, Actor};

use crate::app::dto::{ChangePasswordRequest, CodeRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::blocking;

/// GET /me
pub async fn me(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<MeView>, ApiError> {
    Ok(Json(service.me(&actor)?))
}

/// POST /me/password
///
/// Every other session of the account is revoked; the response carries the
/// replacement session.
pub async fn change_password(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<SessionGrant>, ApiError> {
    let grant = blocking(&service, move |s| {
        s.change_password(&actor, &body.current_password, &body.new_password)
    })
    .await?;
    Ok(Json(grant))
}

/// POST /me/two-factor
pub async fn enable_two_factor(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<TwoFactorEnrollment>, ApiError> {
    Ok(Json(service.enable_two_factor(&actor)?))
}

/// POST /me/two-factor/verify
pub async fn verify_two_factor(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<CodeRequest>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(service.verify_two_factor(&actor, &body.code)?))
}

/// DELETE /me/two-factor
pub async fn disable_two_factor(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(service.disable_two_factor(&actor)?))
}

/// POST /me/two-factor/recover
pub async fn recover(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<CodeRequest>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(service.use_recovery_code(&actor, &body.code)?))
}
