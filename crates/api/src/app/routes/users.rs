//! Account administration.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde_json::json;

use warden_auth::AuthorizationExplanation;
use warden_core::UserId;
use warden_infra::service::{
    AdminReset, CreatedUser, LockStatus, NewUser, PermissionsView, StatusChange, UserUpdate, UserView,
};
use warden_infra::{AccessControl, Actor};

use crate::app::dto::{AssignProfileRequest, ExplainQuery};
use crate::app::errors::ApiError;
use crate::app::routes::common::{blocking, parse_id};

/// GET /users
pub async fn list(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    Ok(Json(service.list_users(&actor)?))
}

/// POST /users
///
/// The generated temporary password, if any, is only ever returned here.
pub async fn create(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<NewUser>,
) -> Result<(StatusCode, Json<CreatedUser>), ApiError> {
    let created = blocking(&service, move |s| s.create_user(&actor, body)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /users/:id
pub async fn get(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(service.get_user(&actor, id)?))
}

/// PATCH /users/:id
pub async fn update(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(body): Json<UserUpdate>,
) -> Result<Json<UserView>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(service.update_user(&actor, id, body)?))
}

/// PUT /users/:id/status
pub async fn set_status(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(body): Json<StatusChange>,
) -> Result<Json<UserView>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(service.set_status(&actor, id, body)?))
}

/// PUT /users/:id/profile
pub async fn assign_profile(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(body): Json<AssignProfileRequest>,
) -> Result<Json<UserView>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(service.assign_profile(&actor, id, body.profile_id)?))
}

/// POST /users/:id/reset-password
pub async fn reset_password(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Option<Json<AdminReset>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id: UserId = parse_id(&id)?;
    let input = body.map(|Json(b)| b).unwrap_or_default();
    let temporary = blocking(&service, move |s| s.admin_reset_password(&actor, id, input)).await?;
    Ok(Json(json!({ "temporary_password": temporary })))
}

/// POST /users/:id/unlock
pub async fn unlock(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(service.unlock(&actor, id)?))
}

/// GET /users/:id/permissions
pub async fn permissions(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<PermissionsView>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(service.effective_permissions(&actor, id)?))
}

/// GET /users/:id/lock
pub async fn lock_status(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<LockStatus>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(service.is_account_locked(&actor, id)?))
}

/// GET /users/:id/explain?permission=module.action
pub async fn explain(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Query(query): Query<ExplainQuery>,
) -> Result<Json<AuthorizationExplanation>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(service.explain(&actor, id, &query.permission)?))
}
