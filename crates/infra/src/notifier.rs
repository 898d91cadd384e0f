//! Outbound notifications (reset links).
//!
//! Delivery is fire-and-forget: callers log a failed send and carry on, and
//! a failed send never undoes the state change that triggered it.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// A password reset message to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetNotice {
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub trait Notifier: Send + Sync {
    fn send_password_reset(&self, notice: &ResetNotice) -> Result<(), NotifyError>;
}

/// Logs that a message would be sent. The token itself is never logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send_password_reset(&self, notice: &ResetNotice) -> Result<(), NotifyError> {
        tracing::info!(
            email = %notice.email,
            expires_at = %notice.expires_at,
            "password reset notice dispatched"
        );
        Ok(())
    }
}

/// Keeps every notice in memory. Used by tests and local tooling to pick up
/// reset tokens.
#[derive(Debug, Default)]
pub struct OutboxNotifier {
    sent: Mutex<Vec<ResetNotice>>,
}

impl OutboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<ResetNotice> {
        self.sent
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Most recent notice for `email`.
    pub fn last_for(&self, email: &str) -> Option<ResetNotice> {
        self.sent().into_iter().rev().find(|n| n.email == email)
    }
}

impl Notifier for OutboxNotifier {
    fn send_password_reset(&self, notice: &ResetNotice) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError("outbox lock poisoned".to_string()))?
            .push(notice.clone());
        Ok(())
    }
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn send_password_reset(&self, notice: &ResetNotice) -> Result<(), NotifyError> {
        (**self).send_password_reset(notice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_returns_latest_notice_per_email() {
        let outbox = OutboxNotifier::new();
        for token in ["t1", "t2"] {
            outbox
                .send_password_reset(&ResetNotice {
                    email: "erin@example.com".to_string(),
                    token: token.to_string(),
                    expires_at: Utc::now(),
                })
                .unwrap();
        }
        assert_eq!(outbox.sent().len(), 2);
        assert_eq!(outbox.last_for("erin@example.com").unwrap().token, "t2");
        assert!(outbox.last_for("nobody@example.com").is_none());
    }
}
