use std::str::FromStr;
use std::sync::Arc;

use warden_core::DomainError;
use warden_infra::{AccessControl, ServiceError};

use crate::app::errors::ApiError;

/// Parse a path identifier, reporting failures as `400 invalid_id`.
pub fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(ApiError::from)
}

/// Run a service call on the blocking pool. Used for anything that hashes
/// or verifies a password.
pub async fn blocking<T, F>(service: &Arc<AccessControl>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AccessControl) -> Result<T, ServiceError> + Send + 'static,
{
    let service = service.clone();
    let result = tokio::task::spawn_blocking(move || f(service.as_ref())).await?;
    Ok(result?)
}
