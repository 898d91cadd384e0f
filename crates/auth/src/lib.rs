//! `warden-auth`: account security and access-control model.
//!
//! Pure domain logic: password policy, permission resolution, the per-user
//! security state machine, two-factor helpers and the incident record.
//! Storage, time and HTTP live elsewhere; this crate only sees what the
//! caller passes in.

pub mod incident;
pub mod password;
pub mod permissions;
pub mod profile;
pub mod rbac;
pub mod session;
pub mod token;
pub mod two_factor;
pub mod user;

pub use incident::{IncidentStatus, IncidentSubject, IncidentType, SecurityIncident};
pub use password::{
    HashError, HashingParams, PasswordHasher, PasswordPolicy, PasswordStrength, PolicyViolation,
};
pub use permissions::PermissionKey;
pub use profile::{Permission, Profile, ProfileChanges, ProfilePermission};
pub use rbac::{
    authorize, explain_authorization, AuthorizationExplanation, AuthzError, DenialKind,
    EffectivePermissions,
};
pub use session::Session;
pub use two_factor::{StoredEnrollment, TwoFactorEnrollment, TwoFactorError};
pub use user::{
    AccountCommand, AccountEvent, IncidentDraft, LegacyRole, LockoutPolicy, User, UserStatus,
};
