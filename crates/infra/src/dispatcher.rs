//! Account command pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the user (with its version)
//!   ↓
//! 2. Handle command (pure decision, produces events)
//!   ↓
//! 3. Apply events and derive one incident per event
//!   ↓
//! 4. Commit state + incidents in one step (compare-and-swap on version)
//! ```
//!
//! A version mismatch means another request changed the user in between;
//! the whole pipeline is re-run against fresh state a bounded number of
//! times. That is what keeps concurrent failed logins from losing counts.

use thiserror::Error;

use warden_auth::user::{AccountCommand, AccountEvent, User};
use warden_auth::{IncidentSubject, SecurityIncident};
use warden_core::{Aggregate, AggregateRoot, DomainError, Event, ExpectedVersion, UserId};

use crate::store::{AccessStore, StoreError};

const DEFAULT_MAX_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Deterministic domain failure; nothing was stored.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Still losing the version race after every retry.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DispatchError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Outcome of a committed (or no-op) command.
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// State after the command.
    pub user: User,
    pub events: Vec<AccountEvent>,
    pub incidents: Vec<SecurityIncident>,
}

impl Dispatched {
    pub fn changed(&self) -> bool {
        !self.events.is_empty()
    }
}

/// Runs account commands against a store.
#[derive(Debug, Clone)]
pub struct AccountDispatcher<S> {
    store: S,
    max_attempts: usize,
}

impl<S> AccountDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// One incident per event, attributed to the user as it is after the event.
pub fn incidents_for(user: &User, events: &[AccountEvent], ip: Option<&str>) -> Vec<SecurityIncident> {
    events
        .iter()
        .map(|event| {
            let draft = event.incident();
            SecurityIncident::new(
                draft.incident_type,
                draft.status,
                draft.details,
                ip,
                Some(IncidentSubject::User {
                    id: user.id,
                    email: &user.email,
                }),
                event.occurred_at(),
            )
        })
        .collect()
}

impl<S: AccessStore> AccountDispatcher<S> {
    /// Create a new account. The `Register` command decides, the store
    /// enforces email uniqueness.
    pub fn register(&self, user_id: UserId, command: AccountCommand, ip: Option<&str>) -> Result<Dispatched, DispatchError> {
        let mut user = User::empty(user_id);
        let events = user.handle(&command)?;
        for event in &events {
            user.apply(event);
        }
        let incidents = incidents_for(&user, &events, ip);
        self.store.insert_user(user.clone(), incidents.clone())?;
        tracing::info!(user_id = %user.id, "account registered");
        Ok(Dispatched {
            user,
            events,
            incidents,
        })
    }

    /// Run `command` against the stored user.
    pub fn dispatch(&self, user_id: UserId, command: &AccountCommand, ip: Option<&str>) -> Result<Dispatched, DispatchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_dispatch(user_id, command, ip) {
                Err(DispatchError::Concurrency(msg)) if attempt < self.max_attempts => {
                    tracing::debug!(user_id = %user_id, attempt, reason = %msg, "version race; retrying");
                }
                other => return other,
            }
        }
    }

    fn try_dispatch(&self, user_id: UserId, command: &AccountCommand, ip: Option<&str>) -> Result<Dispatched, DispatchError> {
        // 1) Load
        let mut user = self.store.get_user(user_id)?.ok_or(DomainError::NotFound)?;
        let expected = ExpectedVersion::Exact(user.version());

        // 2) Decide (no mutation)
        let events = user.handle(command)?;
        if events.is_empty() {
            return Ok(Dispatched {
                user,
                events,
                incidents: vec![],
            });
        }

        // 3) Apply + derive incidents
        for event in &events {
            user.apply(event);
        }
        let incidents = incidents_for(&user, &events, ip);

        // 4) Commit atomically
        self.store.commit_user(&user, expected, incidents.clone())?;

        for (event, incident) in events.iter().zip(&incidents) {
            tracing::info!(
                user_id = %user.id,
                event_type = event.event_type(),
                incident_type = %incident.incident_type,
                "account event committed"
            );
        }

        Ok(Dispatched {
            user,
            events,
            incidents,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::Utc;

    use warden_auth::user::{LockoutPolicy, RecordFailedLogin, RegisterUser};
    use warden_auth::{IncidentType, LegacyRole};

    use super::*;
    use crate::store::{IncidentQuery, InMemoryAccessStore};

    fn register(dispatcher: &AccountDispatcher<Arc<InMemoryAccessStore>>) -> UserId {
        let id = UserId::new();
        let cmd = AccountCommand::Register(RegisterUser {
            user_id: id,
            email: "carol@example.com".to_string(),
            display_name: "Carol".to_string(),
            password_hash: "$argon2id$h".to_string(),
            role: LegacyRole::User,
            profile_id: None,
            first_login: false,
            password_expires_at: None,
            occurred_at: Utc::now(),
        });
        dispatcher.register(id, cmd, None).unwrap();
        id
    }

    fn failed_login(max_attempts: u32) -> AccountCommand {
        AccountCommand::RecordFailedLogin(RecordFailedLogin {
            lockout: LockoutPolicy {
                max_attempts,
                duration_minutes: 30,
            },
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn each_event_is_committed_with_one_incident() {
        let store = Arc::new(InMemoryAccessStore::new());
        let dispatcher = AccountDispatcher::new(store.clone());
        let id = register(&dispatcher);

        let out = dispatcher.dispatch(id, &failed_login(5), Some("10.0.0.9")).unwrap();
        assert_eq!(out.incidents.len(), 1);
        assert_eq!(out.incidents[0].incident_type, IncidentType::FailedLogin);
        assert_eq!(out.incidents[0].ip_address.as_deref(), Some("10.0.0.9"));
        assert_eq!(out.incidents[0].user_email.as_deref(), Some("carol@example.com"));

        // Register + failed login.
        assert_eq!(store.incident_summary().unwrap().total, 2);
    }

    #[test]
    fn unknown_user_is_not_found() {
        let dispatcher = AccountDispatcher::new(Arc::new(InMemoryAccessStore::new()));
        let err = dispatcher.dispatch(UserId::new(), &failed_login(5), None).unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::NotFound)));
    }

    #[test]
    fn concurrent_failures_are_all_counted() {
        let store = Arc::new(InMemoryAccessStore::new());
        let dispatcher = Arc::new(AccountDispatcher::new(store.clone()).with_max_attempts(64));
        let id = register(&dispatcher);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                thread::spawn(move || dispatcher.dispatch(id, &failed_login(100), None).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let user = store.get_user(id).unwrap().unwrap();
        assert_eq!(user.login_attempts, 8);
        let failures = store
            .list_incidents(&IncidentQuery {
                incident_type: Some(IncidentType::FailedLogin),
                ..IncidentQuery::default()
            })
            .unwrap();
        assert_eq!(failures.total, 8);
    }
}
