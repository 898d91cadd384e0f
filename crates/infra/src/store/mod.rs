//! Persistence boundary for accounts, profiles, permissions, grants,
//! sessions and incidents.
//!
//! Every mutating call is one transaction: the state change and the
//! incidents handed in with it are stored together or not at all.

pub mod in_memory;
pub mod query;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use warden_auth::{Permission, Profile, ProfilePermission, SecurityIncident, Session, User};
use warden_core::{ExpectedVersion, PermissionId, ProfileId, UserId};

pub use in_memory::InMemoryAccessStore;
pub use query::{IncidentPage, IncidentQuery, IncidentSummary};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency failure (stale aggregate version).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Uniqueness violation (email, profile name, permission key).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Transactional store for the access-control model.
pub trait AccessStore: Send + Sync {
    // ── users ───────────────────────────────────────────────────────────────

    /// Insert a new user. Fails with `Conflict` on a duplicate email.
    fn insert_user(&self, user: User, incidents: Vec<SecurityIncident>) -> Result<(), StoreError>;

    fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// User holding a pending reset token with this digest (expired or not).
    fn find_user_by_reset_digest(&self, digest: &str) -> Result<Option<User>, StoreError>;

    fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Compare-and-swap on the user's version, appending `incidents` in the
    /// same step.
    ///
    /// `expected` is the version the change was decided against; `user`
    /// carries the new state.
    fn commit_user(
        &self,
        user: &User,
        expected: ExpectedVersion,
        incidents: Vec<SecurityIncident>,
    ) -> Result<(), StoreError>;

    // ── profiles ────────────────────────────────────────────────────────────

    fn insert_profile(&self, profile: Profile, incidents: Vec<SecurityIncident>) -> Result<(), StoreError>;

    fn get_profile(&self, id: ProfileId) -> Result<Option<Profile>, StoreError>;

    fn list_profiles(&self) -> Result<Vec<Profile>, StoreError>;

    fn update_profile(&self, profile: &Profile, incidents: Vec<SecurityIncident>) -> Result<(), StoreError>;

    /// Delete a profile and its grants; its users are left with no profile.
    /// Returns how many users were reassigned.
    fn delete_profile(&self, id: ProfileId, incidents: Vec<SecurityIncident>) -> Result<usize, StoreError>;

    // ── permissions ─────────────────────────────────────────────────────────

    /// Fails with `Conflict` when the `(module, action)` key already exists.
    fn insert_permission(&self, permission: Permission, incidents: Vec<SecurityIncident>) -> Result<(), StoreError>;

    fn get_permission(&self, id: PermissionId) -> Result<Option<Permission>, StoreError>;

    fn list_permissions(&self) -> Result<Vec<Permission>, StoreError>;

    /// Delete a permission and every grant of it. Returns the number of
    /// grants removed.
    fn delete_permission(&self, id: PermissionId, incidents: Vec<SecurityIncident>) -> Result<usize, StoreError>;

    // ── grants ──────────────────────────────────────────────────────────────

    /// Grant a permission to a profile. Idempotent: returns `false` (and
    /// records nothing) when the grant already exists.
    fn grant(&self, grant: ProfilePermission, incident: SecurityIncident) -> Result<bool, StoreError>;

    /// Revoke a grant. Returns `false` (and records nothing) when absent.
    fn revoke(
        &self,
        profile_id: ProfileId,
        permission_id: PermissionId,
        incident: SecurityIncident,
    ) -> Result<bool, StoreError>;

    /// Permissions currently granted to a profile, in creation order.
    fn profile_permissions(&self, profile_id: ProfileId) -> Result<Vec<Permission>, StoreError>;

    // ── incidents (append-only) ─────────────────────────────────────────────

    fn append_incident(&self, incident: SecurityIncident) -> Result<(), StoreError>;

    fn list_incidents(&self, query: &IncidentQuery) -> Result<IncidentPage, StoreError>;

    fn incident_summary(&self) -> Result<IncidentSummary, StoreError>;

    // ── sessions ────────────────────────────────────────────────────────────

    fn insert_session(&self, session: Session) -> Result<(), StoreError>;

    fn get_session(&self, token_digest: &str) -> Result<Option<Session>, StoreError>;

    /// Delete one session, optionally recording why. Returns `false` if absent.
    fn delete_session(&self, token_digest: &str, incident: Option<SecurityIncident>) -> Result<bool, StoreError>;

    /// Revoke every session of a user. Returns how many were removed.
    fn delete_user_sessions(&self, user_id: UserId) -> Result<usize, StoreError>;

    /// Drop every session expired at `now`. Returns how many were removed.
    fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

impl<S> AccessStore for Arc<S>
where
    S: AccessStore + ?Sized,
{
    fn insert_user(&self, user: User, incidents: Vec<SecurityIncident>) -> Result<(), StoreError> {
        (**self).insert_user(user, incidents)
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        (**self).get_user(id)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        (**self).find_user_by_email(email)
    }

    fn find_user_by_reset_digest(&self, digest: &str) -> Result<Option<User>, StoreError> {
        (**self).find_user_by_reset_digest(digest)
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        (**self).list_users()
    }

    fn commit_user(
        &self,
        user: &User,
        expected: ExpectedVersion,
        incidents: Vec<SecurityIncident>,
    ) -> Result<(), StoreError> {
        (**self).commit_user(user, expected, incidents)
    }

    fn insert_profile(&self, profile: Profile, incidents: Vec<SecurityIncident>) -> Result<(), StoreError> {
        (**self).insert_profile(profile, incidents)
    }

    fn get_profile(&self, id: ProfileId) -> Result<Option<Profile>, StoreError> {
        (**self).get_profile(id)
    }

    fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        (**self).list_profiles()
    }

    fn update_profile(&self, profile: &Profile, incidents: Vec<SecurityIncident>) -> Result<(), StoreError> {
        (**self).update_profile(profile, incidents)
    }

    fn delete_profile(&self, id: ProfileId, incidents: Vec<SecurityIncident>) -> Result<usize, StoreError> {
        (**self).delete_profile(id, incidents)
    }

    fn insert_permission(&self, permission: Permission, incidents: Vec<SecurityIncident>) -> Result<(), StoreError> {
        (**self).insert_permission(permission, incidents)
    }

    fn get_permission(&self, id: PermissionId) -> Result<Option<Permission>, StoreError> {
        (**self).get_permission(id)
    }

    fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        (**self).list_permissions()
    }

    fn delete_permission(&self, id: PermissionId, incidents: Vec<SecurityIncident>) -> Result<usize, StoreError> {
        (**self).delete_permission(id, incidents)
    }

    fn grant(&self, grant: ProfilePermission, incident: SecurityIncident) -> Result<bool, StoreError> {
        (**self).grant(grant, incident)
    }

    fn revoke(
        &self,
        profile_id: ProfileId,
        permission_id: PermissionId,
        incident: SecurityIncident,
    ) -> Result<bool, StoreError> {
        (**self).revoke(profile_id, permission_id, incident)
    }

    fn profile_permissions(&self, profile_id: ProfileId) -> Result<Vec<Permission>, StoreError> {
        (**self).profile_permissions(profile_id)
    }

    fn append_incident(&self, incident: SecurityIncident) -> Result<(), StoreError> {
        (**self).append_incident(incident)
    }

    fn list_incidents(&self, query: &IncidentQuery) -> Result<IncidentPage, StoreError> {
        (**self).list_incidents(query)
    }

    fn incident_summary(&self) -> Result<IncidentSummary, StoreError> {
        (**self).incident_summary()
    }

    fn insert_session(&self, session: Session) -> Result<(), StoreError> {
        (**self).insert_session(session)
    }

    fn get_session(&self, token_digest: &str) -> Result<Option<Session>, StoreError> {
        (**self).get_session(token_digest)
    }

    fn delete_session(&self, token_digest: &str, incident: Option<SecurityIncident>) -> Result<bool, StoreError> {
        (**self).delete_session(token_digest, incident)
    }

    fn delete_user_sessions(&self, user_id: UserId) -> Result<usize, StoreError> {
        (**self).delete_user_sessions(user_id)
    }

    fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        (**self).purge_expired_sessions(now)
    }
}
