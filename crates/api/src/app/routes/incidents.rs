use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    Json,
};

use warden_infra::store::{IncidentPage, IncidentQuery, IncidentSummary};
use warden_infra::{AccessControl, Actor};

use crate::app::errors::ApiError;

/// GET /incidents?type=&status=&user_id=&from=&to=&page=&per_page=
pub async fn list(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<IncidentQuery>,
) -> Result<Json<IncidentPage>, ApiError> {
    Ok(Json(service.list_incidents(&actor, &query)?))
}

/// GET /incidents/summary
pub async fn summary(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<IncidentSummary>, ApiError> {
    Ok(Json(service.incident_summary(&actor)?))
}
