//! Administrative account management.

use serde::Deserialize;

use warden_auth::password;
use warden_auth::permissions::{USERS_CREATE, USERS_EDIT, USERS_VIEW};
use warden_auth::user::{
    AccountCommand, AdminResetPassword, AssignProfile, RegisterUser, SetStatus, UnlockAccount, UpdateDetails,
};
use warden_auth::{explain_authorization, AuthorizationExplanation, LegacyRole, PermissionKey, UserStatus};
use warden_core::{ProfileId, UserId};

use super::views::{CreatedUser, LockStatus, PermissionsView, UserView};
use super::{AccessControl, Actor, ServiceError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    /// When absent a temporary password is generated and must be changed at
    /// first login.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub role: Option<LegacyRole>,
    #[serde(default)]
    pub profile_id: Option<ProfileId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<LegacyRole>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub status: UserStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminReset {
    /// Generated per policy when absent.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub require_change: bool,
}

impl Default for AdminReset {
    fn default() -> Self {
        Self {
            password: None,
            require_change: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl AccessControl {
    pub fn create_user(&self, actor: &Actor, input: NewUser) -> Result<CreatedUser, ServiceError> {
        self.require(actor, &USERS_CREATE)?;
        let now = self.now();
        if let Some(profile_id) = input.profile_id {
            self.active_profile(profile_id)?;
        }

        let (password, temporary, expires_at) = match input.password {
            Some(password) => {
                self.check_new_password(None, &password)?;
                (password, false, self.password_expiry(now))
            }
            None => (
                password::generate(&self.config.password),
                true,
                Some(self.temporary_expiry(now)),
            ),
        };

        let user_id = UserId::new();
        let cmd = AccountCommand::Register(RegisterUser {
            user_id,
            email: input.email,
            display_name: input.display_name,
            password_hash: self.hasher.hash(&password)?,
            role: input.role.unwrap_or_default(),
            profile_id: input.profile_id,
            first_login: temporary,
            password_expires_at: expires_at,
            occurred_at: now,
        });
        let done = self.dispatcher.register(user_id, cmd, actor.ip())?;
        tracing::info!(user_id = %user_id, actor = %actor.id(), temporary, "user created");

        Ok(CreatedUser {
            user: UserView::from_user(&done.user, now),
            temporary_password: temporary.then_some(password),
        })
    }

    pub fn update_user(&self, actor: &Actor, id: UserId, input: UserUpdate) -> Result<UserView, ServiceError> {
        self.require(actor, &USERS_EDIT)?;
        let now = self.now();
        let cmd = AccountCommand::UpdateDetails(UpdateDetails {
            actor: Some(actor.id()),
            email: input.email,
            display_name: input.display_name,
            role: input.role,
            occurred_at: now,
        });
        let done = self.dispatcher.dispatch(id, &cmd, actor.ip())?;
        Ok(UserView::from_user(&done.user, now))
    }

    pub fn get_user(&self, actor: &Actor, id: UserId) -> Result<UserView, ServiceError> {
        if actor.id() != id {
            self.require(actor, &USERS_VIEW)?;
        }
        Ok(UserView::from_user(&self.load_user(id)?, self.now()))
    }

    /// All accounts, ordered by email.
    pub fn list_users(&self, actor: &Actor) -> Result<Vec<UserView>, ServiceError> {
        self.require(actor, &USERS_VIEW)?;
        let now = self.now();
        let mut users = self.store.list_users()?;
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users.iter().map(|u| UserView::from_user(u, now)).collect())
    }

    /// Enable or disable an account. Disabling also ends its sessions.
    pub fn set_status(&self, actor: &Actor, id: UserId, change: StatusChange) -> Result<UserView, ServiceError> {
        self.require(actor, &USERS_EDIT)?;
        let now = self.now();
        let cmd = AccountCommand::SetStatus(SetStatus {
            actor: Some(actor.id()),
            status: change.status,
            reason: change.reason,
            occurred_at: now,
        });
        let done = self.dispatcher.dispatch(id, &cmd, actor.ip())?;
        if done.changed() && change.status == UserStatus::Inactive {
            self.revoke_sessions(id);
        }
        Ok(UserView::from_user(&done.user, now))
    }

    /// Replace the user's profile. The target must be an active profile;
    /// `None` removes the assignment.
    pub fn assign_profile(&self, actor: &Actor, id: UserId, profile_id: Option<ProfileId>) -> Result<UserView, ServiceError> {
        self.require(actor, &USERS_EDIT)?;
        if let Some(profile_id) = profile_id {
            self.active_profile(profile_id)?;
        }
        let now = self.now();
        let cmd = AccountCommand::AssignProfile(AssignProfile {
            actor: Some(actor.id()),
            profile_id,
            occurred_at: now,
        });
        let done = self.dispatcher.dispatch(id, &cmd, actor.ip())?;
        Ok(UserView::from_user(&done.user, now))
    }

    /// Set a new password on someone else's account. A generated password is
    /// returned exactly once.
    pub fn admin_reset_password(&self, actor: &Actor, id: UserId, input: AdminReset) -> Result<Option<String>, ServiceError> {
        self.require(actor, &USERS_EDIT)?;
        let now = self.now();
        let user = self.load_user(id)?;

        let (password, generated, expires_at) = match input.password {
            Some(password) => {
                self.check_new_password(Some(&user), &password)?;
                (password, false, self.password_expiry(now))
            }
            None => (
                password::generate(&self.config.password),
                true,
                Some(self.temporary_expiry(now)),
            ),
        };

        let cmd = AccountCommand::AdminResetPassword(AdminResetPassword {
            actor: Some(actor.id()),
            password_hash: self.hasher.hash(&password)?,
            require_change: input.require_change,
            password_expires_at: expires_at,
            occurred_at: now,
        });
        self.dispatcher.dispatch(id, &cmd, actor.ip())?;
        self.revoke_sessions(id);
        Ok(generated.then_some(password))
    }

    pub fn unlock(&self, actor: &Actor, id: UserId) -> Result<UserView, ServiceError> {
        self.require(actor, &USERS_EDIT)?;
        let now = self.now();
        let cmd = AccountCommand::Unlock(UnlockAccount {
            actor: Some(actor.id()),
            occurred_at: now,
        });
        let done = self.dispatcher.dispatch(id, &cmd, actor.ip())?;
        Ok(UserView::from_user(&done.user, now))
    }

    pub fn is_account_locked(&self, actor: &Actor, id: UserId) -> Result<LockStatus, ServiceError> {
        self.require(actor, &USERS_VIEW)?;
        let now = self.now();
        let user = self.load_user(id)?;
        let locked = user.is_locked(now);
        Ok(LockStatus {
            user_id: user.id,
            locked,
            locked_until: user.locked_until.filter(|_| locked),
            login_attempts: user.login_attempts,
        })
    }

    /// Effective permissions of `id`. Users may always read their own.
    pub fn effective_permissions(&self, actor: &Actor, id: UserId) -> Result<PermissionsView, ServiceError> {
        if actor.id() != id {
            self.require(actor, &USERS_VIEW)?;
        }
        let user = self.load_user(id)?;
        let (_, perms) = self.resolve_permissions(&user)?;
        Ok(PermissionsView::from(&perms))
    }

    /// Why `id` would or would not pass a check for `permission`
    /// (`"module.action"`).
    pub fn explain(&self, actor: &Actor, id: UserId, permission: &str) -> Result<AuthorizationExplanation, ServiceError> {
        self.require(actor, &USERS_VIEW)?;
        let required: PermissionKey = permission.parse()?;
        let user = self.load_user(id)?;
        let (profile, perms) = self.resolve_permissions(&user)?;
        Ok(explain_authorization(&user, profile.as_ref(), &perms, &required))
    }
}
