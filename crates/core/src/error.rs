//! Domain error model.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// policy, credentials, conflicts). Infrastructure concerns belong elsewhere.
///
/// A failed domain operation never leaves the entity half-updated: callers
/// receive one of these variants and the state they passed in is untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A password did not satisfy the configured policy.
    ///
    /// Carries every unmet rule, never just the first one.
    #[error("password policy violated: {}", .0.join("; "))]
    PolicyViolation(Vec<String>),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (duplicate email, stale version).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A one-time token or code did not match.
    #[error("invalid or expired token")]
    InvalidToken,

    /// A one-time token was correct but is past its expiry.
    ///
    /// Renders exactly like [`DomainError::InvalidToken`].
    #[error("invalid or expired token")]
    ExpiredToken,

    /// Authentication is blocked until the lockout window elapses.
    #[error("account locked until {until}")]
    Locked { until: DateTime<Utc> },

    /// Unknown account or wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The account has been administratively deactivated.
    #[error("account inactive")]
    Inactive,

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn policy<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::PolicyViolation(rules.into_iter().map(Into::into).collect())
    }

    /// True for both token variants; the boundary treats them identically.
    pub fn is_token_error(&self) -> bool {
        matches!(self, Self::InvalidToken | Self::ExpiredToken)
    }
}
