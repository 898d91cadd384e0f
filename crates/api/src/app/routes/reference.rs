//! Reference data lookups.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    Json,
};

use warden_infra::{AccessControl, Actor};
use warden_reference::{ReferenceItem, ResolveRequest, ResolvedLabel};

use crate::app::dto::{module_or_default, ReferenceQuery, ReferenceRefreshed, ResolveQuery};
use crate::app::errors::ApiError;
use crate::app::routes::common::blocking;

/// GET /reference/:type?module=users
pub async fn items(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
    Path(item_type): Path<String>,
    Query(query): Query<ReferenceQuery>,
) -> Result<Json<Vec<ReferenceItem>>, ApiError> {
    let module = module_or_default(query.module.as_deref());
    Ok(Json(service.reference_items(&actor, &item_type, module)?))
}

/// GET /reference/:type/resolve?id=&code=&module=
///
/// Never fails for an authenticated caller; unknown values resolve to a
/// neutral label.
pub async fn resolve(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(_actor): Extension<Actor>,
    Path(item_type): Path<String>,
    Query(query): Query<ResolveQuery>,
) -> Json<ResolvedLabel> {
    let module = module_or_default(query.module.as_deref());
    let mut request = ResolveRequest::new(&item_type, module);
    if let Some(id) = query.id {
        request = request.id(id);
    }
    if let Some(code) = query.code.as_deref() {
        request = request.code(code);
    }
    Json(service.resolve_reference(&request))
}

/// POST /reference
///
/// Reloads every preloaded scope from the configured source.
pub async fn refresh(
    Extension(service): Extension<Arc<AccessControl>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<ReferenceRefreshed>, ApiError> {
    let loaded = blocking(&service, move |s| s.refresh_reference(&actor)).await?;
    Ok(Json(ReferenceRefreshed { loaded }))
}
