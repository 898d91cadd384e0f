//! Incident log and reference data reads.

use warden_auth::permissions::{SECURITY_VIEW, SETTINGS_EDIT, SETTINGS_VIEW};
use warden_auth::{IncidentStatus, IncidentType};
use warden_reference::{resolve, ReferenceItem, ResolveRequest, ResolvedLabel};

use super::{subject, AccessControl, Actor, ServiceError};
use crate::store::{IncidentPage, IncidentQuery, IncidentSummary};

impl AccessControl {
    pub fn list_incidents(&self, actor: &Actor, query: &IncidentQuery) -> Result<IncidentPage, ServiceError> {
        self.require(actor, &SECURITY_VIEW)?;
        Ok(self.recorder.list(query)?)
    }

    pub fn incident_summary(&self, actor: &Actor) -> Result<IncidentSummary, ServiceError> {
        self.require(actor, &SECURITY_VIEW)?;
        Ok(self.recorder.summary()?)
    }

    /// Configured items of one type within a module. Empty when nothing was
    /// preloaded for that scope.
    pub fn reference_items(&self, actor: &Actor, item_type: &str, module: &str) -> Result<Vec<ReferenceItem>, ServiceError> {
        self.require(actor, &SETTINGS_VIEW)?;
        Ok(self.reference.get_items(item_type, module))
    }

    /// Reload the cache from the configured source after an administrative
    /// change to reference data. A failed reload keeps the previous items.
    pub fn refresh_reference(&self, actor: &Actor) -> Result<usize, ServiceError> {
        self.require(actor, &SETTINGS_EDIT)?;
        let loaded = self.load_reference()?;
        self.recorder.record(
            IncidentType::AdminAction,
            IncidentStatus::Info,
            format!("reference data reloaded ({loaded} items)"),
            actor.ip(),
            Some(subject(&actor.user)),
        )?;
        tracing::info!(items = loaded, actor = %actor.id(), "reference data refreshed");
        Ok(loaded)
    }

    /// Label for a stored code. Open to every authenticated caller and never
    /// fails.
    pub fn resolve_reference(&self, request: &ResolveRequest<'_>) -> ResolvedLabel {
        resolve(&self.reference, request)
    }
}
