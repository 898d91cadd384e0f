//! Append-only security incident log.
//!
//! There is deliberately no update or delete here. A wrong entry is
//! corrected by recording a compensating one.

use warden_auth::{IncidentStatus, IncidentSubject, IncidentType, SecurityIncident};
use warden_core::Clock;

use crate::store::{AccessStore, IncidentPage, IncidentQuery, IncidentSummary, StoreError};

#[derive(Debug, Clone)]
pub struct IncidentRecorder<S, C> {
    store: S,
    clock: C,
}

impl<S, C> IncidentRecorder<S, C>
where
    S: AccessStore,
    C: Clock,
{
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    /// Build an incident stamped with the current time without storing it,
    /// for callers that commit it together with a state change.
    pub fn draft(
        &self,
        incident_type: IncidentType,
        status: IncidentStatus,
        details: impl Into<String>,
        ip_address: Option<&str>,
        subject: Option<IncidentSubject<'_>>,
    ) -> SecurityIncident {
        SecurityIncident::new(incident_type, status, details, ip_address, subject, self.clock.now())
    }

    /// Append a standalone incident. The subject's email is copied now so
    /// the record stays readable after the account is gone.
    pub fn record(
        &self,
        incident_type: IncidentType,
        status: IncidentStatus,
        details: impl Into<String>,
        ip_address: Option<&str>,
        subject: Option<IncidentSubject<'_>>,
    ) -> Result<SecurityIncident, StoreError> {
        let incident = self.draft(incident_type, status, details, ip_address, subject);
        self.store.append_incident(incident.clone())?;
        tracing::info!(
            incident_id = %incident.id,
            incident_type = %incident.incident_type,
            status = %incident.status,
            "security incident recorded"
        );
        Ok(incident)
    }

    pub fn list(&self, query: &IncidentQuery) -> Result<IncidentPage, StoreError> {
        self.store.list_incidents(query)
    }

    pub fn summary(&self) -> Result<IncidentSummary, StoreError> {
        self.store.incident_summary()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use warden_core::{ManualClock, UserId};

    use super::*;
    use crate::store::InMemoryAccessStore;

    #[test]
    fn records_are_appended_with_clock_time_and_denormalized_email() {
        let store = Arc::new(InMemoryAccessStore::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        let recorder = IncidentRecorder::new(store, clock.clone());
        let user_id = UserId::new();

        let first = recorder
            .record(
                IncidentType::UnauthorizedAccess,
                IncidentStatus::Blocked,
                "attempted users.edit",
                Some("192.0.2.1"),
                Some(IncidentSubject::User {
                    id: user_id,
                    email: "dave@example.com",
                }),
            )
            .unwrap();
        clock.advance(Duration::minutes(1));
        recorder
            .record(
                IncidentType::FailedLogin,
                IncidentStatus::Alert,
                "unknown account",
                None,
                Some(IncidentSubject::Email("ghost@example.com")),
            )
            .unwrap();

        assert_eq!(first.created_at, Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        let page = recorder.list(&IncidentQuery::default()).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].user_email.as_deref(), Some("ghost@example.com"));
        assert!(page.items[0].user_id.is_none());
        assert_eq!(page.items[1].user_id, Some(user_id));

        let summary = recorder.summary().unwrap();
        assert_eq!(summary.by_status[&IncidentStatus::Blocked], 1);
    }
}
