//! Profiles and their permission grants.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde_json::json;

use warden_auth::{Permission, Profile, ProfileChanges};
use warden_core::{PermissionId, ProfileId};
use warden_infra::service::{NewProfile, ProfileDetail};
use warden_infra::{AccessControl, Actor};

use crate::app::errors::ApiError;
use crate::app::routes::common::parse_id;

/// GET /profiles
pub async fn list(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<Profile>>, ApiError> {
    Ok(Json(service.list_profiles(&actor)?))
}

/// POST /profiles
pub async fn create(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<NewProfile>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    Ok((StatusCode::CREATED, Json(service.create_profile(&actor, body)?)))
}

/// GET /profiles/:id
pub async fn get(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<ProfileDetail>, ApiError> {
    let id: ProfileId = parse_id(&id)?;
    Ok(Json(service.get_profile(&actor, id)?))
}

/// PATCH /profiles/:id
pub async fn update(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(body): Json<ProfileChanges>,
) -> Result<Json<Profile>, ApiError> {
    let id: ProfileId = parse_id(&id)?;
    Ok(Json(service.update_profile(&actor, id, body)?))
}

/// DELETE /profiles/:id
pub async fn delete(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id: ProfileId = parse_id(&id)?;
    let reassigned = service.delete_profile(&actor, id)?;
    Ok(Json(json!({ "reassigned_users": reassigned })))
}

/// GET /profiles/:id/permissions
pub async fn permissions(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Permission>>, ApiError> {
    let id: ProfileId = parse_id(&id)?;
    Ok(Json(service.profile_permissions(&actor, id)?))
}

/// PUT /profiles/:id/permissions/:permission_id
pub async fn grant(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path((id, permission_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id: ProfileId = parse_id(&id)?;
    let permission_id: PermissionId = parse_id(&permission_id)?;
    let granted = service.grant_permission(&actor, id, permission_id)?;
    Ok(Json(json!({ "changed": granted })))
}

/// DELETE /profiles/:id/permissions/:permission_id
pub async fn revoke(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path((id, permission_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id: ProfileId = parse_id(&id)?;
    let permission_id: PermissionId = parse_id(&permission_id)?;
    let revoked = service.revoke_permission(&actor, id, permission_id)?;
    Ok(Json(json!({ "changed": revoked })))
}
