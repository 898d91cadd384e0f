//! Authentication: login, sessions, password reset and change, two-factor.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use warden_auth::user::{
    AccountCommand, AccountEvent, ChangePassword, CompletePasswordReset, DisableTwoFactor, EnableTwoFactor,
    RecordFailedLogin, RecordSuccessfulLogin, RequestPasswordReset, UseRecoveryCode, VerifyTwoFactor,
};
use warden_auth::{
    password, token, two_factor, IncidentStatus, IncidentSubject, IncidentType, Session, TwoFactorEnrollment, User,
};
use warden_core::DomainError;

use super::views::{MeView, PasswordCheck, UserView};
use super::{subject, AccessControl, Actor, ServiceError};
use crate::dispatcher::DispatchError;
use crate::notifier::ResetNotice;

/// Login input. At most one of the two second-factor fields is used; a
/// recovery code wins when both are present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub totp_code: Option<String>,
    #[serde(default)]
    pub recovery_code: Option<String>,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_totp(mut self, code: impl Into<String>) -> Self {
        self.totp_code = Some(code.into());
        self
    }

    pub fn with_recovery_code(mut self, code: impl Into<String>) -> Self {
        self.recovery_code = Some(code.into());
        self
    }
}

/// A freshly opened session. The token is shown once and only its digest is
/// kept.
#[derive(Debug, Clone, Serialize)]
pub struct SessionGrant {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    #[serde(flatten)]
    pub session: SessionGrant,
    pub user: UserView,
    /// Set after account creation or an administrative reset.
    pub must_change_password: bool,
    pub password_expired: bool,
}

impl AccessControl {
    // ── login ───────────────────────────────────────────────────────────────

    /// Authenticate with email and password (plus a second factor when the
    /// account has one) and open a session.
    pub fn login(&self, credentials: &Credentials, ip: Option<&str>) -> Result<LoginOutcome, ServiceError> {
        let now = self.now();
        let email = credentials.email.trim().to_lowercase();

        let Some(user) = self.store.find_user_by_email(&email)? else {
            self.recorder.record(
                IncidentType::FailedLogin,
                IncidentStatus::Alert,
                "login attempt for unknown account",
                ip,
                Some(IncidentSubject::Email(&email)),
            )?;
            return Err(DomainError::InvalidCredentials.into());
        };

        if let Some(until) = user.locked_until.filter(|_| user.is_locked(now)) {
            self.recorder.record(
                IncidentType::FailedLogin,
                IncidentStatus::Blocked,
                format!("login attempt while locked until {until}"),
                ip,
                Some(subject(&user)),
            )?;
            return Err(DomainError::Locked { until }.into());
        }

        if !user.is_active() {
            self.recorder.record(
                IncidentType::UnauthorizedAccess,
                IncidentStatus::Blocked,
                "login attempt on inactive account",
                ip,
                Some(subject(&user)),
            )?;
            return Err(DomainError::Inactive.into());
        }

        if !self.hasher.verify(&credentials.password, &user.password_hash) {
            return Err(self.fail_login(&user, ip, DomainError::InvalidCredentials.into()));
        }

        if user.two_factor.enabled {
            self.check_second_factor(&user, credentials, ip, now)?;
        }

        let done = self.dispatcher.dispatch(
            user.id,
            &AccountCommand::RecordSuccessfulLogin(RecordSuccessfulLogin { occurred_at: now }),
            ip,
        )?;
        let session = self.open_session(&done.user, now)?;
        tracing::info!(user_id = %done.user.id, "login succeeded");

        Ok(LoginOutcome {
            session,
            must_change_password: done.user.first_login,
            password_expired: done.user.is_password_expired(now),
            user: UserView::from_user(&done.user, now),
        })
    }

    fn check_second_factor(
        &self,
        user: &User,
        credentials: &Credentials,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if let Some(code) = &credentials.recovery_code {
            let cmd = AccountCommand::UseRecoveryCode(UseRecoveryCode {
                code: code.clone(),
                occurred_at: now,
            });
            return match self.dispatcher.dispatch(user.id, &cmd, ip) {
                Ok(_) => Ok(()),
                Err(DispatchError::Domain(DomainError::InvalidToken)) => {
                    Err(self.fail_login(user, ip, DomainError::InvalidCredentials.into()))
                }
                Err(e) => Err(e.into()),
            };
        }

        let Some(code) = &credentials.totp_code else {
            return Err(self.fail_login(user, ip, ServiceError::TwoFactorRequired));
        };
        let valid = user
            .two_factor
            .secret
            .as_deref()
            .is_some_and(|secret| two_factor::verify_code(secret, code, now));
        if valid {
            Ok(())
        } else {
            Err(self.fail_login(user, ip, DomainError::InvalidCredentials.into()))
        }
    }

    /// Count a failed attempt and pick the error to report: `Locked` when
    /// this very failure locked the account, `otherwise` if not.
    fn fail_login(&self, user: &User, ip: Option<&str>, otherwise: ServiceError) -> ServiceError {
        let cmd = AccountCommand::RecordFailedLogin(RecordFailedLogin {
            lockout: self.config.lockout,
            occurred_at: self.now(),
        });
        match self.dispatcher.dispatch(user.id, &cmd, ip) {
            Ok(done) => {
                let locked = done.events.iter().find_map(|e| match e {
                    AccountEvent::AccountLocked { locked_until, .. } => Some(*locked_until),
                    _ => None,
                });
                match locked {
                    Some(until) => {
                        tracing::warn!(user_id = %user.id, attempts = done.user.login_attempts, "account locked");
                        DomainError::Locked { until }.into()
                    }
                    None => otherwise,
                }
            }
            Err(e) => e.into(),
        }
    }

    // ── sessions ────────────────────────────────────────────────────────────

    fn open_session(&self, user: &User, now: DateTime<Utc>) -> Result<SessionGrant, ServiceError> {
        self.sweep_sessions(now);
        let (session, token) = Session::open(user.id, Duration::minutes(self.config.session.ttl_minutes), now);
        let expires_at = session.expires_at;
        self.store.insert_session(session)?;
        Ok(SessionGrant { token, expires_at })
    }

    /// Resolve a bearer token into an [`Actor`], materialising its
    /// permissions once.
    ///
    /// An expired session is removed and audited as `SESSION_EXPIRED`.
    pub fn authenticate(&self, token: &str, ip: Option<&str>) -> Result<Actor, ServiceError> {
        let digest = token::digest(token.trim());
        let session = self.store.get_session(&digest)?.ok_or(ServiceError::Unauthenticated)?;
        let now = self.now();

        if session.is_expired(now) {
            let owner = self.store.get_user(session.user_id)?;
            let incident = self.recorder.draft(
                IncidentType::SessionExpired,
                IncidentStatus::Info,
                "session expired",
                ip,
                owner.as_ref().map(subject),
            );
            self.store.delete_session(&digest, Some(incident))?;
            tracing::debug!(user_id = %session.user_id, "expired session removed");
            return Err(ServiceError::Unauthenticated);
        }

        let user = self.store.get_user(session.user_id)?.ok_or(ServiceError::Unauthenticated)?;
        if !user.is_active() {
            return Err(DomainError::Inactive.into());
        }
        let (_, permissions) = self.resolve_permissions(&user)?;

        Ok(Actor {
            user,
            permissions,
            session_digest: digest,
            ip: ip.map(str::to_string),
        })
    }

    pub fn logout(&self, actor: &Actor) -> Result<(), ServiceError> {
        self.store.delete_session(&actor.session_digest, None)?;
        tracing::info!(user_id = %actor.id(), "logged out");
        self.sweep_sessions(self.now());
        Ok(())
    }

    /// Housekeeping for sessions that expired without being presented again.
    fn sweep_sessions(&self, now: DateTime<Utc>) {
        match self.store.purge_expired_sessions(now) {
            Ok(0) => {}
            Ok(count) => tracing::debug!(sessions = count, "expired sessions purged"),
            Err(e) => tracing::warn!(error = %e, "failed to purge expired sessions"),
        }
    }

    /// The caller's own account with its permission set.
    pub fn me(&self, actor: &Actor) -> Result<MeView, ServiceError> {
        let now = self.now();
        let profile_name = actor.permissions.profile_name.clone();
        let two_factor_required = !actor.user.two_factor.enabled
            && profile_name.as_ref().is_some_and(|name| {
                self.config
                    .two_factor
                    .required_for_profiles
                    .iter()
                    .any(|required| required.eq_ignore_ascii_case(name))
            });
        Ok(MeView {
            user: UserView::from_user(&actor.user, now),
            profile_name,
            permissions: actor.permissions.to_sorted_strings(),
            password_expired: actor.user.is_password_expired(now),
            two_factor_required,
        })
    }

    // ── password reset (self-service) ───────────────────────────────────────

    /// Issue a reset token and hand it to the notifier.
    ///
    /// Always succeeds from the caller's point of view so the endpoint does
    /// not reveal which emails have accounts. A failed send is logged and
    /// the token stays issued.
    pub fn request_password_reset(&self, email: &str, ip: Option<&str>) -> Result<(), ServiceError> {
        let now = self.now();
        let email = email.trim().to_lowercase();

        let user = match self.store.find_user_by_email(&email)? {
            Some(user) if user.is_active() => user,
            Some(user) => {
                self.recorder.record(
                    IncidentType::PasswordReset,
                    IncidentStatus::Blocked,
                    "password reset requested for inactive account",
                    ip,
                    Some(subject(&user)),
                )?;
                return Ok(());
            }
            None => {
                self.recorder.record(
                    IncidentType::PasswordReset,
                    IncidentStatus::Alert,
                    "password reset requested for unknown account",
                    ip,
                    Some(IncidentSubject::Email(&email)),
                )?;
                return Ok(());
            }
        };

        let token = token::generate_token();
        let expires_at = now + Duration::minutes(self.config.reset.reset_token_ttl_minutes);
        let cmd = AccountCommand::RequestPasswordReset(RequestPasswordReset {
            token_digest: token::digest(&token),
            expires_at,
            occurred_at: now,
        });
        self.dispatcher.dispatch(user.id, &cmd, ip)?;

        let notice = ResetNotice {
            email: user.email.clone(),
            token,
            expires_at,
        };
        if let Err(e) = self.notifier.send_password_reset(&notice) {
            tracing::warn!(user_id = %user.id, error = %e, "password reset notice not delivered");
        }
        Ok(())
    }

    /// Finish a reset with the emailed token.
    ///
    /// The token is checked before the password, and a wrong, unknown or
    /// expired token all surface with the same message.
    pub fn complete_password_reset(&self, token: &str, new_password: &str, ip: Option<&str>) -> Result<(), ServiceError> {
        let now = self.now();
        let user = self
            .store
            .find_user_by_reset_digest(&token::digest(token.trim()))?
            .ok_or(ServiceError::Domain(DomainError::InvalidToken))?;
        user.check_reset_token(token.trim(), now)?;
        self.check_new_password(Some(&user), new_password)?;

        let cmd = AccountCommand::CompletePasswordReset(CompletePasswordReset {
            token: token.trim().to_string(),
            password_hash: self.hasher.hash(new_password)?,
            force_change: self.config.password.force_change_after_reset,
            password_expires_at: self.password_expiry(now),
            occurred_at: now,
        });
        self.dispatcher.dispatch(user.id, &cmd, ip)?;
        self.revoke_sessions(user.id);
        Ok(())
    }

    // ── password change (account owner) ─────────────────────────────────────

    /// Change the caller's password. Every existing session is revoked and a
    /// new one is returned in its place.
    pub fn change_password(&self, actor: &Actor, current: &str, new_password: &str) -> Result<SessionGrant, ServiceError> {
        let now = self.now();
        let user = self.load_user(actor.id())?;

        if !self.hasher.verify(current, &user.password_hash) {
            self.recorder.record(
                IncidentType::FailedLogin,
                IncidentStatus::Alert,
                "wrong current password on password change",
                actor.ip(),
                Some(subject(&user)),
            )?;
            return Err(DomainError::InvalidCredentials.into());
        }
        self.check_new_password(Some(&user), new_password)?;

        let cmd = AccountCommand::ChangePassword(ChangePassword {
            password_hash: self.hasher.hash(new_password)?,
            password_expires_at: self.password_expiry(now),
            occurred_at: now,
        });
        let done = self.dispatcher.dispatch(user.id, &cmd, actor.ip())?;
        self.revoke_sessions(user.id);
        self.open_session(&done.user, now)
    }

    /// Score a candidate against the configured policy without changing
    /// anything. History rules need an account and are not applied here.
    pub fn check_password(&self, candidate: &str) -> PasswordCheck {
        let violations: Vec<String> = password::validate(candidate, &self.config.password)
            .err()
            .unwrap_or_default()
            .iter()
            .map(ToString::to_string)
            .collect();
        PasswordCheck {
            valid: violations.is_empty(),
            violations,
            strength: password::strength(candidate),
        }
    }

    // ── two-factor ──────────────────────────────────────────────────────────

    /// Start enrolment. The secret and recovery code are returned once; the
    /// account is protected only after [`Self::verify_two_factor`].
    pub fn enable_two_factor(&self, actor: &Actor) -> Result<TwoFactorEnrollment, ServiceError> {
        let (shown, stored) = two_factor::start_enrollment(&self.config.two_factor.issuer, &actor.user.email)?;
        let cmd = AccountCommand::EnableTwoFactor(EnableTwoFactor {
            secret: stored.secret,
            recovery_digest: stored.recovery_digest,
            occurred_at: self.now(),
        });
        self.dispatcher.dispatch(actor.id(), &cmd, actor.ip())?;
        Ok(shown)
    }

    pub fn verify_two_factor(&self, actor: &Actor, code: &str) -> Result<UserView, ServiceError> {
        let now = self.now();
        let cmd = AccountCommand::VerifyTwoFactor(VerifyTwoFactor {
            code: code.to_string(),
            occurred_at: now,
        });
        let done = self.dispatcher.dispatch(actor.id(), &cmd, actor.ip())?;
        Ok(UserView::from_user(&done.user, now))
    }

    pub fn disable_two_factor(&self, actor: &Actor) -> Result<UserView, ServiceError> {
        let now = self.now();
        let cmd = AccountCommand::DisableTwoFactor(DisableTwoFactor { occurred_at: now });
        let done = self.dispatcher.dispatch(actor.id(), &cmd, actor.ip())?;
        Ok(UserView::from_user(&done.user, now))
    }

    /// Spend the recovery code, which switches two-factor off.
    pub fn use_recovery_code(&self, actor: &Actor, code: &str) -> Result<UserView, ServiceError> {
        let now = self.now();
        let cmd = AccountCommand::UseRecoveryCode(UseRecoveryCode {
            code: code.to_string(),
            occurred_at: now,
        });
        let done = self.dispatcher.dispatch(actor.id(), &cmd, actor.ip())?;
        Ok(UserView::from_user(&done.user, now))
    }
}
