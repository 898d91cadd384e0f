//! Security incident model (append-only audit records).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{Entity, IncidentId, UserId};

/// Kind of security-relevant event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentType {
    FailedLogin,
    AccountLocked,
    PasswordChange,
    UnauthorizedAccess,
    SessionExpired,
    UnusualIp,
    PasswordReset,
    AdminAction,
    SecuritySettingChange,
    SuccessfulLogin,
    Other,
}

impl IncidentType {
    pub const ALL: [IncidentType; 11] = [
        IncidentType::FailedLogin,
        IncidentType::AccountLocked,
        IncidentType::PasswordChange,
        IncidentType::UnauthorizedAccess,
        IncidentType::SessionExpired,
        IncidentType::UnusualIp,
        IncidentType::PasswordReset,
        IncidentType::AdminAction,
        IncidentType::SecuritySettingChange,
        IncidentType::SuccessfulLogin,
        IncidentType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IncidentType::FailedLogin => "FAILED_LOGIN",
            IncidentType::AccountLocked => "ACCOUNT_LOCKED",
            IncidentType::PasswordChange => "PASSWORD_CHANGE",
            IncidentType::UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
            IncidentType::SessionExpired => "SESSION_EXPIRED",
            IncidentType::UnusualIp => "UNUSUAL_IP",
            IncidentType::PasswordReset => "PASSWORD_RESET",
            IncidentType::AdminAction => "ADMIN_ACTION",
            IncidentType::SecuritySettingChange => "SECURITY_SETTING_CHANGE",
            IncidentType::SuccessfulLogin => "SUCCESSFUL_LOGIN",
            IncidentType::Other => "OTHER",
        }
    }
}

impl core::fmt::Display for IncidentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for IncidentType {
    type Err = warden_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        IncidentType::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| warden_core::DomainError::validation(format!("unknown incident type '{s}'")))
    }
}

/// Disposition recorded with an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    Resolved,
    Blocked,
    Alert,
    Locked,
    Info,
}

impl IncidentStatus {
    pub const ALL: [IncidentStatus; 5] = [
        IncidentStatus::Resolved,
        IncidentStatus::Blocked,
        IncidentStatus::Alert,
        IncidentStatus::Locked,
        IncidentStatus::Info,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IncidentStatus::Resolved => "RESOLVED",
            IncidentStatus::Blocked => "BLOCKED",
            IncidentStatus::Alert => "ALERT",
            IncidentStatus::Locked => "LOCKED",
            IncidentStatus::Info => "INFO",
        }
    }
}

impl core::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for IncidentStatus {
    type Err = warden_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        IncidentStatus::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| warden_core::DomainError::validation(format!("unknown incident status '{s}'")))
    }
}

/// Immutable audit record.
///
/// `user_email` is copied at write time so the record stays readable after the
/// user is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityIncident {
    pub id: IncidentId,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub status: IncidentStatus,
    pub details: String,
    pub ip_address: Option<String>,
    pub user_id: Option<UserId>,
    pub user_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SecurityIncident {
    pub fn new(
        incident_type: IncidentType,
        status: IncidentStatus,
        details: impl Into<String>,
        ip_address: Option<&str>,
        subject: Option<IncidentSubject<'_>>,
        at: DateTime<Utc>,
    ) -> Self {
        let (user_id, user_email) = match subject {
            Some(IncidentSubject::User { id, email }) => (Some(id), Some(email.to_string())),
            Some(IncidentSubject::Email(email)) => (None, Some(email.to_string())),
            None => (None, None),
        };
        Self {
            id: IncidentId::new(),
            incident_type,
            status,
            details: details.into(),
            ip_address: ip_address.map(str::to_string),
            user_id,
            user_email,
            created_at: at,
        }
    }
}

impl Entity for SecurityIncident {
    type Id = IncidentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Who an incident is about.
#[derive(Debug, Clone, Copy)]
pub enum IncidentSubject<'a> {
    /// A known account.
    User { id: UserId, email: &'a str },
    /// An attempted identity with no matching account.
    Email(&'a str),
}
