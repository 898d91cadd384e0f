//! Application service over the access-control model.
//!
//! ```text
//! Request (actor + input)
//!   ↓
//! 1. Authorize against the actor's materialised permission set
//!   ↓
//! 2. Validate input (password policy, referenced ids)
//!   ↓
//! 3. Run the account command through the dispatcher
//!    (state + incidents committed together)
//!   ↓
//! 4. Side effects that never roll back (session revocation, notices)
//! ```
//!
//! Every denied permission check is itself recorded as an
//! `UNAUTHORIZED_ACCESS` incident.

mod auth;
mod incidents;
mod rbac;
mod users;
pub mod views;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use warden_auth::password::{self, PolicyViolation};
use warden_auth::{
    authorize, AuthzError, EffectivePermissions, HashError, IncidentStatus, IncidentSubject, IncidentType,
    PasswordHasher, PermissionKey, Profile, TwoFactorError, User,
};
use warden_core::{Clock, DomainError, ProfileId, SystemClock, UserId};
use warden_reference::{ReferenceDataCache, ReferenceError};

use crate::config::WardenConfig;
use crate::dispatcher::{AccountDispatcher, DispatchError};
use crate::notifier::{Notifier, TracingNotifier};
use crate::recorder::IncidentRecorder;
use crate::store::{AccessStore, StoreError};

pub use auth::{Credentials, LoginOutcome, SessionGrant};
pub use rbac::{NewPermission, NewProfile};
pub use users::{AdminReset, NewUser, StatusChange, UserUpdate};
pub use views::{CreatedUser, LockStatus, MeView, PasswordCheck, PermissionsView, ProfileDetail, UserView};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("two-factor code required")]
    TwoFactorRequired,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) | StoreError::Concurrency(msg) => ServiceError::Domain(DomainError::Conflict(msg)),
            StoreError::NotFound(_) => ServiceError::Domain(DomainError::NotFound),
            other => ServiceError::Store(other),
        }
    }
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(e) => ServiceError::Domain(e),
            DispatchError::Concurrency(msg) => ServiceError::Domain(DomainError::Conflict(msg)),
            DispatchError::Store(e) => e.into(),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Forbidden(key) => ServiceError::Forbidden(key),
        }
    }
}

impl From<HashError> for ServiceError {
    fn from(value: HashError) -> Self {
        ServiceError::Internal(value.to_string())
    }
}

impl From<ReferenceError> for ServiceError {
    fn from(value: ReferenceError) -> Self {
        ServiceError::Internal(value.to_string())
    }
}

impl From<TwoFactorError> for ServiceError {
    fn from(value: TwoFactorError) -> Self {
        ServiceError::Internal(value.to_string())
    }
}

/// An authenticated caller, resolved once per request.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user: User,
    pub permissions: EffectivePermissions,
    /// Digest of the session token the caller presented.
    pub session_digest: String,
    pub ip: Option<String>,
}

impl Actor {
    pub fn id(&self) -> UserId {
        self.user.id
    }

    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }
}

pub(crate) fn subject(user: &User) -> IncidentSubject<'_> {
    IncidentSubject::User {
        id: user.id,
        email: &user.email,
    }
}

/// Entry point for every access-control operation.
pub struct AccessControl {
    pub(crate) store: Arc<dyn AccessStore>,
    pub(crate) dispatcher: AccountDispatcher<Arc<dyn AccessStore>>,
    pub(crate) recorder: IncidentRecorder<Arc<dyn AccessStore>, Arc<dyn Clock>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) hasher: PasswordHasher,
    pub(crate) config: WardenConfig,
    pub(crate) reference: Arc<ReferenceDataCache>,
}

impl AccessControl {
    /// Service on the system clock, logging notifier and an empty reference
    /// cache.
    ///
    /// Fails on a configuration that does not pass [`WardenConfig::validate`].
    pub fn new(store: Arc<dyn AccessStore>, config: WardenConfig) -> Result<Self, ServiceError> {
        config
            .validate()
            .map_err(|e| DomainError::validation(format!("invalid configuration: {e}")))?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let hasher = PasswordHasher::new(config.hashing)?;
        Ok(Self {
            dispatcher: AccountDispatcher::new(store.clone()),
            recorder: IncidentRecorder::new(store.clone(), clock.clone()),
            store,
            clock,
            notifier: Arc::new(TracingNotifier),
            hasher,
            config,
            reference: Arc::new(ReferenceDataCache::new()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.recorder = IncidentRecorder::new(self.store.clone(), clock.clone());
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_reference(mut self, reference: Arc<ReferenceDataCache>) -> Self {
        self.reference = reference;
        self
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AccessStore> {
        &self.store
    }

    pub fn reference(&self) -> &Arc<ReferenceDataCache> {
        &self.reference
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Check `required` against the actor, auditing a denial.
    pub fn require(&self, actor: &Actor, required: &PermissionKey) -> Result<(), ServiceError> {
        if let Err(err) = authorize(&actor.permissions, required) {
            let recorded = self.recorder.record(
                IncidentType::UnauthorizedAccess,
                IncidentStatus::Blocked,
                format!("attempted action requiring '{required}'"),
                actor.ip(),
                Some(subject(&actor.user)),
            );
            if let Err(e) = recorded {
                tracing::warn!(error = %e, user_id = %actor.id(), "failed to record denied access");
            }
            tracing::info!(user_id = %actor.id(), permission = %required, "permission denied");
            return Err(err.into());
        }
        Ok(())
    }

    // ── shared helpers ──────────────────────────────────────────────────────

    pub(crate) fn load_user(&self, id: UserId) -> Result<User, ServiceError> {
        self.store.get_user(id)?.ok_or(ServiceError::Domain(DomainError::NotFound))
    }

    pub(crate) fn load_profile(&self, id: ProfileId) -> Result<Profile, ServiceError> {
        self.store.get_profile(id)?.ok_or(ServiceError::Domain(DomainError::NotFound))
    }

    /// A profile users may be assigned to. Inactive profiles count as
    /// missing.
    pub(crate) fn active_profile(&self, id: ProfileId) -> Result<Profile, ServiceError> {
        match self.store.get_profile(id)? {
            Some(profile) if profile.is_active => Ok(profile),
            _ => Err(ServiceError::Domain(DomainError::NotFound)),
        }
    }

    /// The user's profile (if any) and the permission set it yields.
    pub(crate) fn resolve_permissions(&self, user: &User) -> Result<(Option<Profile>, EffectivePermissions), ServiceError> {
        let profile = match user.profile_id {
            Some(id) => self.store.get_profile(id)?,
            None => None,
        };
        let granted = match &profile {
            Some(p) => self.store.profile_permissions(p.id)?,
            None => Vec::new(),
        };
        let perms = EffectivePermissions::resolve(user, profile.as_ref(), granted.into_iter().map(|p| p.key));
        Ok((profile, perms))
    }

    /// Complexity rules plus, for an existing account, reuse of recent
    /// passwords. All unmet rules are reported together.
    pub(crate) fn check_new_password(&self, user: Option<&User>, candidate: &str) -> Result<(), ServiceError> {
        let policy = &self.config.password;
        let mut violations: Vec<PolicyViolation> = password::validate(candidate, policy).err().unwrap_or_default();
        if let Some(user) = user {
            if let Err(reused) =
                self.hasher
                    .check_reuse(candidate, Some(&user.password_hash), &user.password_history, policy)
            {
                violations.push(reused);
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(password::violations_to_error(&violations).into())
        }
    }

    /// Expiry for a password the user chose, per policy.
    pub(crate) fn password_expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.config.password.expiry_days {
            0 => None,
            days => Some(now + Duration::days(i64::from(days))),
        }
    }

    /// Expiry for a generated temporary password.
    pub(crate) fn temporary_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::hours(self.config.reset.temporary_password_hours)
    }

    pub(crate) fn revoke_sessions(&self, user_id: UserId) {
        match self.store.delete_user_sessions(user_id) {
            Ok(0) => {}
            Ok(count) => tracing::info!(user_id = %user_id, sessions = count, "sessions revoked"),
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "failed to revoke sessions"),
        }
    }
}
