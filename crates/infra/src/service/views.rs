//! Read models handed to callers. None of them carries a secret.

use chrono::{DateTime, Utc};
use serde::Serialize;

use warden_auth::password::PasswordStrength;
use warden_auth::{EffectivePermissions, Permission, Profile, User};
use warden_core::{ProfileId, UserId};

/// Account as shown to administrators and to the account owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub status: String,
    pub deactivation_reason: Option<String>,
    pub profile_id: Option<ProfileId>,
    pub first_login: bool,
    pub login_attempts: u32,
    pub locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub last_password_change: Option<DateTime<Utc>>,
    pub password_expires_at: Option<DateTime<Utc>>,
    pub two_factor_enabled: bool,
    pub two_factor_pending: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserView {
    pub fn from_user(user: &User, now: DateTime<Utc>) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: user.role.code().to_string(),
            status: user.status.code().to_string(),
            deactivation_reason: user.deactivation_reason.clone(),
            profile_id: user.profile_id,
            first_login: user.first_login,
            login_attempts: user.login_attempts,
            locked: user.is_locked(now),
            // A lapsed lock is reported as no lock at all.
            locked_until: user.locked_until.filter(|_| user.is_locked(now)),
            last_login: user.last_login,
            last_password_change: user.last_password_change,
            password_expires_at: user.password_expires_at,
            two_factor_enabled: user.two_factor.enabled,
            two_factor_pending: user.two_factor.is_pending(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Result of creating an account. The temporary password is only ever
/// returned here.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedUser {
    pub user: UserView,
    pub temporary_password: Option<String>,
}

/// Policy verdict and strength estimate for a candidate password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordCheck {
    pub valid: bool,
    pub violations: Vec<String>,
    pub strength: PasswordStrength,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    pub user_id: UserId,
    pub locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub login_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionsView {
    pub user_id: UserId,
    pub profile_id: Option<ProfileId>,
    pub profile_name: Option<String>,
    pub permissions: Vec<String>,
}

impl From<&EffectivePermissions> for PermissionsView {
    fn from(perms: &EffectivePermissions) -> Self {
        Self {
            user_id: perms.user_id,
            profile_id: perms.profile_id,
            profile_name: perms.profile_name.clone(),
            permissions: perms.to_sorted_strings(),
        }
    }
}

/// A profile together with what it grants.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileDetail {
    #[serde(flatten)]
    pub profile: Profile,
    pub permissions: Vec<Permission>,
}

/// The caller's own account.
#[derive(Debug, Clone, Serialize)]
pub struct MeView {
    pub user: UserView,
    pub profile_name: Option<String>,
    pub permissions: Vec<String>,
    pub password_expired: bool,
    /// The user's profile is listed as needing two-factor and it is not on.
    pub two_factor_required: bool,
}
