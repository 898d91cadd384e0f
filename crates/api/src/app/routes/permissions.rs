use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde_json::json;

use warden_auth::Permission;
use warden_core::PermissionId;
use warden_infra::service::NewPermission;
use warden_infra::{AccessControl, Actor};

use crate::app::errors::ApiError;
use crate::app::routes::common::parse_id;

/// GET /permissions
pub async fn list(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<Permission>>, ApiError> {
    Ok(Json(service.list_permissions(&actor)?))
}

/// POST /permissions
pub async fn create(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<NewPermission>,
) -> Result<(StatusCode, Json<Permission>), ApiError> {
    Ok((StatusCode::CREATED, Json(service.create_permission(&actor, body)?)))
}

/// DELETE /permissions/:id
pub async fn delete(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id: PermissionId = parse_id(&id)?;
    let grants = service.delete_permission(&actor, id)?;
    Ok(Json(json!({ "revoked_grants": grants })))
}
