//! User aggregate: identity plus the per-account security state machine.
//!
//! Security state is not one enum column. It is derived from orthogonal
//! fields:
//!
//! - **Locked**: `locked_until` is in the future (evaluated lazily, never
//!   swept).
//! - **Pending password reset**: a live [`PendingReset`] exists.
//! - **Two-factor**: enrolment pending (`secret` set, not yet verified) or
//!   enabled.
//!
//! All of these are independent from [`UserStatus`], which is an
//! administrative enable/disable switch.
//!
//! Every command that changes state produces exactly one [`AccountEvent`],
//! and every event maps to exactly one incident through
//! [`AccountEvent::incident`]. Commands that would change nothing return no
//! events.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{Aggregate, AggregateRoot, DomainError, Event, ProfileId, UserId};

use crate::incident::{IncidentStatus, IncidentType};
use crate::{token, two_factor};

/// How many previous password hashes are retained for reuse checks.
pub const PASSWORD_HISTORY_LIMIT: usize = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Status, legacy role, lockout policy
// ─────────────────────────────────────────────────────────────────────────────

/// Administrative account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

impl UserStatus {
    /// Reference-data code for this status.
    pub fn code(self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UserStatus::Active => write!(f, "ACTIVE"),
            UserStatus::Inactive => write!(f, "INACTIVE"),
        }
    }
}

/// Coarse role enum kept for display.
///
/// Authorization never consults it; effective permissions come from the
/// user's profile only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LegacyRole {
    Admin,
    #[default]
    User,
    Operator,
    Viewer,
}

impl LegacyRole {
    pub fn code(self) -> &'static str {
        match self {
            LegacyRole::Admin => "admin",
            LegacyRole::User => "user",
            LegacyRole::Operator => "operator",
            LegacyRole::Viewer => "viewer",
        }
    }
}

impl core::str::FromStr for LegacyRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(LegacyRole::Admin),
            "user" => Ok(LegacyRole::User),
            "operator" => Ok(LegacyRole::Operator),
            "viewer" => Ok(LegacyRole::Viewer),
            other => Err(DomainError::validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Failed-login threshold and lock duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub duration_minutes: i64,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            duration_minutes: 30,
        }
    }
}

impl LockoutPolicy {
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate state
// ─────────────────────────────────────────────────────────────────────────────

/// Outstanding password-reset token. Token and expiry exist together or not
/// at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReset {
    pub token_digest: String,
    pub expires_at: DateTime<Utc>,
}

/// Two-factor fields. `Default` is the fully cleared state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwoFactorState {
    pub enabled: bool,
    pub secret: Option<String>,
    pub recovery_digest: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl TwoFactorState {
    pub fn is_pending(&self) -> bool {
        self.secret.is_some() && !self.enabled
    }

    fn is_cleared(&self) -> bool {
        *self == TwoFactorState::default()
    }
}

/// User account.
///
/// # Invariants
/// - `email` is lower-case and unique (uniqueness enforced by the store).
/// - At most one live reset token; a past-expiry token is inert.
/// - `locked_until` in the past means "not locked".
/// - `two_factor.enabled` implies `two_factor.verified_at` is set.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    /// Previous password hashes, newest first.
    pub password_history: Vec<String>,
    pub role: LegacyRole,
    pub status: UserStatus,
    pub deactivation_reason: Option<String>,
    pub profile_id: Option<ProfileId>,
    pub first_login: bool,
    pub login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub last_password_change: Option<DateTime<Utc>>,
    pub password_expires_at: Option<DateTime<Utc>>,
    pub reset: Option<PendingReset>,
    pub two_factor: TwoFactorState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
    pub created: bool,
}

impl User {
    /// Blank aggregate for `id`, ready to receive a `Register` command.
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            email: String::new(),
            display_name: String::new(),
            password_hash: String::new(),
            password_history: Vec::new(),
            role: LegacyRole::default(),
            status: UserStatus::Active,
            deactivation_reason: None,
            profile_id: None,
            first_login: false,
            login_attempts: 0,
            locked_until: None,
            last_login: None,
            last_password_change: None,
            password_expires_at: None,
            reset: None,
            two_factor: TwoFactorState::default(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            version: 0,
            created: false,
        }
    }

    /// `locked_until != None && locked_until > now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    fn lock_has_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until <= now)
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn is_password_expired(&self, now: DateTime<Utc>) -> bool {
        self.password_expires_at.is_some_and(|at| at <= now)
    }

    /// True when a reset token exists and has not expired.
    pub fn has_pending_reset(&self, now: DateTime<Utc>) -> bool {
        self.reset.as_ref().is_some_and(|r| r.expires_at > now)
    }

    /// Check a presented reset token.
    ///
    /// Unknown or mismatched tokens are `InvalidToken`; the right token past
    /// its expiry is `ExpiredToken`. Both render the same way.
    pub fn check_reset_token(&self, presented: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        let pending = self.reset.as_ref().ok_or(DomainError::InvalidToken)?;
        if token::digest(presented) != pending.token_digest {
            return Err(DomainError::InvalidToken);
        }
        if pending.expires_at <= now {
            return Err(DomainError::ExpiredToken);
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    fn ensure_not_self(&self, actor: Option<UserId>) -> Result<(), DomainError> {
        if actor == Some(self.id) {
            return Err(DomainError::Unauthorized);
        }
        Ok(())
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

pub fn normalize_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.'));
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("invalid email format"));
    }
    Ok(email)
}

fn normalize_display_name(raw: &str) -> Result<String, DomainError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation("display name cannot be empty"));
    }
    Ok(name.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Create the account. Password hashing happens before dispatch.
#[derive(Debug, Clone)]
pub struct RegisterUser {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: LegacyRole,
    pub profile_id: Option<ProfileId>,
    pub first_login: bool,
    pub password_expires_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecordFailedLogin {
    pub lockout: LockoutPolicy,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecordSuccessfulLogin {
    pub occurred_at: DateTime<Utc>,
}

/// Issue a reset token. Only the digest of the token travels in the command.
#[derive(Debug, Clone)]
pub struct RequestPasswordReset {
    pub token_digest: String,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CompletePasswordReset {
    pub token: String,
    pub password_hash: String,
    pub force_change: bool,
    pub password_expires_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChangePassword {
    pub password_hash: String,
    pub password_expires_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AdminResetPassword {
    pub actor: Option<UserId>,
    pub password_hash: String,
    pub require_change: bool,
    pub password_expires_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EnableTwoFactor {
    pub secret: String,
    pub recovery_digest: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VerifyTwoFactor {
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DisableTwoFactor {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UseRecoveryCode {
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SetStatus {
    pub actor: Option<UserId>,
    pub status: UserStatus,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Replace the user's single profile. Whether the profile exists and is
/// active is checked against the store before dispatch.
#[derive(Debug, Clone)]
pub struct AssignProfile {
    pub actor: Option<UserId>,
    pub profile_id: Option<ProfileId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpdateDetails {
    pub actor: Option<UserId>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<LegacyRole>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UnlockAccount {
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// All account commands.
#[derive(Debug, Clone)]
pub enum AccountCommand {
    Register(RegisterUser),
    RecordFailedLogin(RecordFailedLogin),
    RecordSuccessfulLogin(RecordSuccessfulLogin),
    RequestPasswordReset(RequestPasswordReset),
    CompletePasswordReset(CompletePasswordReset),
    ChangePassword(ChangePassword),
    AdminResetPassword(AdminResetPassword),
    EnableTwoFactor(EnableTwoFactor),
    VerifyTwoFactor(VerifyTwoFactor),
    DisableTwoFactor(DisableTwoFactor),
    UseRecoveryCode(UseRecoveryCode),
    SetStatus(SetStatus),
    AssignProfile(AssignProfile),
    UpdateDetails(UpdateDetails),
    Unlock(UnlockAccount),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// All account events.
#[derive(Debug, Clone)]
pub enum AccountEvent {
    Registered {
        email: String,
        display_name: String,
        password_hash: String,
        role: LegacyRole,
        profile_id: Option<ProfileId>,
        first_login: bool,
        password_expires_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
    LoginFailed {
        attempts: u32,
        at: DateTime<Utc>,
    },
    AccountLocked {
        attempts: u32,
        locked_until: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    LoginSucceeded {
        at: DateTime<Utc>,
    },
    PasswordResetRequested {
        token_digest: String,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    PasswordResetCompleted {
        password_hash: String,
        force_change: bool,
        password_expires_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
    PasswordChanged {
        password_hash: String,
        password_expires_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
    PasswordResetByAdmin {
        actor: Option<UserId>,
        password_hash: String,
        require_change: bool,
        password_expires_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
    TwoFactorEnrollmentStarted {
        secret: String,
        recovery_digest: String,
        at: DateTime<Utc>,
    },
    TwoFactorEnabled {
        at: DateTime<Utc>,
    },
    TwoFactorDisabled {
        at: DateTime<Utc>,
    },
    RecoveryCodeUsed {
        at: DateTime<Utc>,
    },
    StatusChanged {
        actor: Option<UserId>,
        status: UserStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
    ProfileAssigned {
        actor: Option<UserId>,
        profile_id: Option<ProfileId>,
        at: DateTime<Utc>,
    },
    DetailsUpdated {
        actor: Option<UserId>,
        email: Option<String>,
        display_name: Option<String>,
        role: Option<LegacyRole>,
        at: DateTime<Utc>,
    },
    Unlocked {
        actor: Option<UserId>,
        at: DateTime<Utc>,
    },
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::Registered { .. } => "account.registered",
            AccountEvent::LoginFailed { .. } => "account.login_failed",
            AccountEvent::AccountLocked { .. } => "account.locked",
            AccountEvent::LoginSucceeded { .. } => "account.login_succeeded",
            AccountEvent::PasswordResetRequested { .. } => "account.password_reset_requested",
            AccountEvent::PasswordResetCompleted { .. } => "account.password_reset_completed",
            AccountEvent::PasswordChanged { .. } => "account.password_changed",
            AccountEvent::PasswordResetByAdmin { .. } => "account.password_reset_by_admin",
            AccountEvent::TwoFactorEnrollmentStarted { .. } => "account.two_factor_enrollment_started",
            AccountEvent::TwoFactorEnabled { .. } => "account.two_factor_enabled",
            AccountEvent::TwoFactorDisabled { .. } => "account.two_factor_disabled",
            AccountEvent::RecoveryCodeUsed { .. } => "account.recovery_code_used",
            AccountEvent::StatusChanged { .. } => "account.status_changed",
            AccountEvent::ProfileAssigned { .. } => "account.profile_assigned",
            AccountEvent::DetailsUpdated { .. } => "account.details_updated",
            AccountEvent::Unlocked { .. } => "account.unlocked",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountEvent::Registered { at, .. }
            | AccountEvent::LoginFailed { at, .. }
            | AccountEvent::AccountLocked { at, .. }
            | AccountEvent::LoginSucceeded { at }
            | AccountEvent::PasswordResetRequested { at, .. }
            | AccountEvent::PasswordResetCompleted { at, .. }
            | AccountEvent::PasswordChanged { at, .. }
            | AccountEvent::PasswordResetByAdmin { at, .. }
            | AccountEvent::TwoFactorEnrollmentStarted { at, .. }
            | AccountEvent::TwoFactorEnabled { at }
            | AccountEvent::TwoFactorDisabled { at }
            | AccountEvent::RecoveryCodeUsed { at }
            | AccountEvent::StatusChanged { at, .. }
            | AccountEvent::ProfileAssigned { at, .. }
            | AccountEvent::DetailsUpdated { at, .. }
            | AccountEvent::Unlocked { at, .. } => *at,
        }
    }
}

/// Incident classification derived from an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentDraft {
    pub incident_type: IncidentType,
    pub status: IncidentStatus,
    pub details: String,
}

impl AccountEvent {
    /// The single incident this event is audited as. Never includes secrets.
    pub fn incident(&self) -> IncidentDraft {
        let by = |actor: &Option<UserId>| match actor {
            Some(id) => format!(" by {id}"),
            None => String::new(),
        };
        let (incident_type, status, details) = match self {
            AccountEvent::Registered { .. } => (
                IncidentType::AdminAction,
                IncidentStatus::Info,
                "user account created".to_string(),
            ),
            AccountEvent::LoginFailed { attempts, .. } => (
                IncidentType::FailedLogin,
                IncidentStatus::Alert,
                format!("failed login attempt {attempts}"),
            ),
            AccountEvent::AccountLocked {
                attempts,
                locked_until,
                ..
            } => (
                IncidentType::AccountLocked,
                IncidentStatus::Locked,
                format!("account locked after {attempts} failed attempts until {locked_until}"),
            ),
            AccountEvent::LoginSucceeded { .. } => (
                IncidentType::SuccessfulLogin,
                IncidentStatus::Info,
                "successful login".to_string(),
            ),
            AccountEvent::PasswordResetRequested { expires_at, .. } => (
                IncidentType::PasswordReset,
                IncidentStatus::Info,
                format!("password reset requested, token valid until {expires_at}"),
            ),
            AccountEvent::PasswordResetCompleted { .. } => (
                IncidentType::PasswordReset,
                IncidentStatus::Resolved,
                "password reset completed".to_string(),
            ),
            AccountEvent::PasswordChanged { .. } => (
                IncidentType::PasswordChange,
                IncidentStatus::Info,
                "password changed by the account owner".to_string(),
            ),
            AccountEvent::PasswordResetByAdmin {
                actor,
                require_change,
                ..
            } => (
                IncidentType::PasswordReset,
                IncidentStatus::Info,
                format!(
                    "password reset by administrator{}{}",
                    by(actor),
                    if *require_change { ", change required at next login" } else { "" }
                ),
            ),
            AccountEvent::TwoFactorEnrollmentStarted { .. } => (
                IncidentType::SecuritySettingChange,
                IncidentStatus::Info,
                "two-factor enrolment started".to_string(),
            ),
            AccountEvent::TwoFactorEnabled { .. } => (
                IncidentType::SecuritySettingChange,
                IncidentStatus::Resolved,
                "two-factor authentication enabled".to_string(),
            ),
            AccountEvent::TwoFactorDisabled { .. } => (
                IncidentType::SecuritySettingChange,
                IncidentStatus::Info,
                "two-factor authentication disabled".to_string(),
            ),
            AccountEvent::RecoveryCodeUsed { .. } => (
                IncidentType::SecuritySettingChange,
                IncidentStatus::Alert,
                "recovery code used, two-factor authentication disabled".to_string(),
            ),
            AccountEvent::StatusChanged {
                actor,
                status,
                reason,
                ..
            } => (
                IncidentType::AdminAction,
                IncidentStatus::Info,
                match reason {
                    Some(reason) => format!("status set to {status}{}: {reason}", by(actor)),
                    None => format!("status set to {status}{}", by(actor)),
                },
            ),
            AccountEvent::ProfileAssigned {
                actor, profile_id, ..
            } => (
                IncidentType::AdminAction,
                IncidentStatus::Info,
                match profile_id {
                    Some(p) => format!("profile {p} assigned{}", by(actor)),
                    None => format!("profile removed{}", by(actor)),
                },
            ),
            AccountEvent::DetailsUpdated { actor, .. } => (
                IncidentType::AdminAction,
                IncidentStatus::Info,
                format!("account details updated{}", by(actor)),
            ),
            AccountEvent::Unlocked { actor, .. } => (
                IncidentType::AdminAction,
                IncidentStatus::Resolved,
                format!("account unlocked{}", by(actor)),
            ),
        };
        IncidentDraft {
            incident_type,
            status,
            details,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for User {
    type Command = AccountCommand;
    type Event = AccountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::Registered {
                email,
                display_name,
                password_hash,
                role,
                profile_id,
                first_login,
                password_expires_at,
                at,
            } => {
                self.email = email.clone();
                self.display_name = display_name.clone();
                self.password_hash = password_hash.clone();
                self.role = *role;
                self.profile_id = *profile_id;
                self.first_login = *first_login;
                self.last_password_change = Some(*at);
                self.password_expires_at = *password_expires_at;
                self.status = UserStatus::Active;
                self.created_at = *at;
                self.created = true;
            }
            AccountEvent::LoginFailed { attempts, .. } => {
                self.login_attempts = *attempts;
            }
            AccountEvent::AccountLocked {
                attempts,
                locked_until,
                ..
            } => {
                self.login_attempts = *attempts;
                self.locked_until = Some(*locked_until);
            }
            AccountEvent::LoginSucceeded { at } => {
                self.login_attempts = 0;
                self.locked_until = None;
                self.last_login = Some(*at);
            }
            AccountEvent::PasswordResetRequested {
                token_digest,
                expires_at,
                ..
            } => {
                self.reset = Some(PendingReset {
                    token_digest: token_digest.clone(),
                    expires_at: *expires_at,
                });
            }
            AccountEvent::PasswordResetCompleted {
                password_hash,
                force_change,
                password_expires_at,
                at,
            } => {
                self.replace_password(password_hash, *password_expires_at, *at);
                self.reset = None;
                if *force_change {
                    self.first_login = true;
                }
            }
            AccountEvent::PasswordChanged {
                password_hash,
                password_expires_at,
                at,
            } => {
                self.replace_password(password_hash, *password_expires_at, *at);
                self.first_login = false;
            }
            AccountEvent::PasswordResetByAdmin {
                password_hash,
                require_change,
                password_expires_at,
                at,
                ..
            } => {
                self.replace_password(password_hash, *password_expires_at, *at);
                self.reset = None;
                self.first_login = *require_change;
                self.login_attempts = 0;
                self.locked_until = None;
            }
            AccountEvent::TwoFactorEnrollmentStarted {
                secret,
                recovery_digest,
                at,
            } => {
                self.two_factor = TwoFactorState {
                    enabled: false,
                    secret: Some(secret.clone()),
                    recovery_digest: Some(recovery_digest.clone()),
                    created_at: Some(*at),
                    verified_at: None,
                };
            }
            AccountEvent::TwoFactorEnabled { at } => {
                self.two_factor.enabled = true;
                self.two_factor.verified_at = Some(*at);
            }
            AccountEvent::TwoFactorDisabled { .. } | AccountEvent::RecoveryCodeUsed { .. } => {
                self.two_factor = TwoFactorState::default();
            }
            AccountEvent::StatusChanged { status, reason, .. } => {
                self.status = *status;
                self.deactivation_reason = match status {
                    UserStatus::Inactive => reason.clone(),
                    UserStatus::Active => None,
                };
            }
            AccountEvent::ProfileAssigned { profile_id, .. } => {
                self.profile_id = *profile_id;
            }
            AccountEvent::DetailsUpdated {
                email,
                display_name,
                role,
                ..
            } => {
                if let Some(email) = email {
                    self.email = email.clone();
                }
                if let Some(name) = display_name {
                    self.display_name = name.clone();
                }
                if let Some(role) = role {
                    self.role = *role;
                }
            }
            AccountEvent::Unlocked { .. } => {
                self.login_attempts = 0;
                self.locked_until = None;
            }
        }
        self.updated_at = event.occurred_at();
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if !matches!(command, AccountCommand::Register(_)) {
            self.ensure_created()?;
        }
        match command {
            AccountCommand::Register(cmd) => self.handle_register(cmd),
            AccountCommand::RecordFailedLogin(cmd) => Ok(vec![self.decide_failed_login(cmd)]),
            AccountCommand::RecordSuccessfulLogin(cmd) => Ok(vec![AccountEvent::LoginSucceeded {
                at: cmd.occurred_at,
            }]),
            AccountCommand::RequestPasswordReset(cmd) => {
                if cmd.expires_at <= cmd.occurred_at {
                    return Err(DomainError::validation("reset token must expire in the future"));
                }
                Ok(vec![AccountEvent::PasswordResetRequested {
                    token_digest: cmd.token_digest.clone(),
                    expires_at: cmd.expires_at,
                    at: cmd.occurred_at,
                }])
            }
            AccountCommand::CompletePasswordReset(cmd) => {
                self.check_reset_token(&cmd.token, cmd.occurred_at)?;
                Ok(vec![AccountEvent::PasswordResetCompleted {
                    password_hash: cmd.password_hash.clone(),
                    force_change: cmd.force_change,
                    password_expires_at: cmd.password_expires_at,
                    at: cmd.occurred_at,
                }])
            }
            AccountCommand::ChangePassword(cmd) => Ok(vec![AccountEvent::PasswordChanged {
                password_hash: cmd.password_hash.clone(),
                password_expires_at: cmd.password_expires_at,
                at: cmd.occurred_at,
            }]),
            AccountCommand::AdminResetPassword(cmd) => Ok(vec![AccountEvent::PasswordResetByAdmin {
                actor: cmd.actor,
                password_hash: cmd.password_hash.clone(),
                require_change: cmd.require_change,
                password_expires_at: cmd.password_expires_at,
                at: cmd.occurred_at,
            }]),
            AccountCommand::EnableTwoFactor(cmd) => self.handle_enable_two_factor(cmd),
            AccountCommand::VerifyTwoFactor(cmd) => self.handle_verify_two_factor(cmd),
            AccountCommand::DisableTwoFactor(cmd) => {
                if self.two_factor.is_cleared() {
                    return Ok(vec![]);
                }
                Ok(vec![AccountEvent::TwoFactorDisabled { at: cmd.occurred_at }])
            }
            AccountCommand::UseRecoveryCode(cmd) => self.handle_recovery_code(cmd),
            AccountCommand::SetStatus(cmd) => self.handle_set_status(cmd),
            AccountCommand::AssignProfile(cmd) => {
                if self.profile_id == cmd.profile_id {
                    return Ok(vec![]);
                }
                Ok(vec![AccountEvent::ProfileAssigned {
                    actor: cmd.actor,
                    profile_id: cmd.profile_id,
                    at: cmd.occurred_at,
                }])
            }
            AccountCommand::UpdateDetails(cmd) => self.handle_update_details(cmd),
            AccountCommand::Unlock(cmd) => {
                if self.login_attempts == 0 && self.locked_until.is_none() {
                    return Ok(vec![]);
                }
                Ok(vec![AccountEvent::Unlocked {
                    actor: cmd.actor,
                    at: cmd.occurred_at,
                }])
            }
        }
    }
}

impl User {
    // ─────────────────────────────────────────────────────────────────────────
    // Command Handlers
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_register(&self, cmd: &RegisterUser) -> Result<Vec<AccountEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }
        if cmd.password_hash.is_empty() {
            return Err(DomainError::validation("password hash is required"));
        }
        Ok(vec![AccountEvent::Registered {
            email: normalize_email(&cmd.email)?,
            display_name: normalize_display_name(&cmd.display_name)?,
            password_hash: cmd.password_hash.clone(),
            role: cmd.role,
            profile_id: cmd.profile_id,
            first_login: cmd.first_login,
            password_expires_at: cmd.password_expires_at,
            at: cmd.occurred_at,
        }])
    }

    /// A failure that leaves the counter at or above the threshold locks the
    /// account, including when the threshold was lowered below a count that
    /// is already stored.
    ///
    /// Failures while already locked keep counting but do not extend the lock.
    /// Once a lock has lapsed the counter starts over.
    fn decide_failed_login(&self, cmd: &RecordFailedLogin) -> AccountEvent {
        let previous = if self.lock_has_lapsed(cmd.occurred_at) {
            0
        } else {
            self.login_attempts
        };
        let attempts = previous.saturating_add(1);
        let threshold = cmd.lockout.max_attempts.max(1);

        if attempts >= threshold && !self.is_locked(cmd.occurred_at) {
            AccountEvent::AccountLocked {
                attempts,
                locked_until: cmd.occurred_at + cmd.lockout.duration(),
                at: cmd.occurred_at,
            }
        } else {
            AccountEvent::LoginFailed {
                attempts,
                at: cmd.occurred_at,
            }
        }
    }

    fn handle_enable_two_factor(&self, cmd: &EnableTwoFactor) -> Result<Vec<AccountEvent>, DomainError> {
        if self.two_factor.enabled {
            return Err(DomainError::conflict("two-factor authentication is already enabled"));
        }
        Ok(vec![AccountEvent::TwoFactorEnrollmentStarted {
            secret: cmd.secret.clone(),
            recovery_digest: cmd.recovery_digest.clone(),
            at: cmd.occurred_at,
        }])
    }

    fn handle_verify_two_factor(&self, cmd: &VerifyTwoFactor) -> Result<Vec<AccountEvent>, DomainError> {
        if self.two_factor.enabled {
            return Err(DomainError::conflict("two-factor authentication is already enabled"));
        }
        let secret = self
            .two_factor
            .secret
            .as_deref()
            .ok_or_else(|| DomainError::validation("no two-factor enrolment in progress"))?;
        if !two_factor::verify_code(secret, &cmd.code, cmd.occurred_at) {
            return Err(DomainError::InvalidToken);
        }
        Ok(vec![AccountEvent::TwoFactorEnabled { at: cmd.occurred_at }])
    }

    fn handle_recovery_code(&self, cmd: &UseRecoveryCode) -> Result<Vec<AccountEvent>, DomainError> {
        let stored = match (&self.two_factor.recovery_digest, self.two_factor.enabled) {
            (Some(digest), true) => digest,
            _ => return Err(DomainError::InvalidToken),
        };
        if two_factor::recovery_digest(&cmd.code) != *stored {
            return Err(DomainError::InvalidToken);
        }
        Ok(vec![AccountEvent::RecoveryCodeUsed { at: cmd.occurred_at }])
    }

    fn handle_set_status(&self, cmd: &SetStatus) -> Result<Vec<AccountEvent>, DomainError> {
        self.ensure_not_self(cmd.actor)?;
        if self.status == cmd.status {
            return Ok(vec![]);
        }
        let reason = cmd
            .reason
            .as_ref()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        Ok(vec![AccountEvent::StatusChanged {
            actor: cmd.actor,
            status: cmd.status,
            reason,
            at: cmd.occurred_at,
        }])
    }

    fn handle_update_details(&self, cmd: &UpdateDetails) -> Result<Vec<AccountEvent>, DomainError> {
        let email = cmd
            .email
            .as_deref()
            .map(normalize_email)
            .transpose()?
            .filter(|e| *e != self.email);
        let display_name = cmd
            .display_name
            .as_deref()
            .map(normalize_display_name)
            .transpose()?
            .filter(|n| *n != self.display_name);
        let role = cmd.role.filter(|r| *r != self.role);

        if email.is_none() && display_name.is_none() && role.is_none() {
            return Ok(vec![]);
        }
        Ok(vec![AccountEvent::DetailsUpdated {
            actor: cmd.actor,
            email,
            display_name,
            role,
            at: cmd.occurred_at,
        }])
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event Appliers
    // ─────────────────────────────────────────────────────────────────────────

    fn replace_password(&mut self, hash: &str, expires_at: Option<DateTime<Utc>>, at: DateTime<Utc>) {
        let previous = std::mem::replace(&mut self.password_hash, hash.to_string());
        if !previous.is_empty() {
            self.password_history.insert(0, previous);
            self.password_history.truncate(PASSWORD_HISTORY_LIMIT);
        }
        self.last_password_change = Some(at);
        self.password_expires_at = expires_at;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
