//! Login sessions.
//!
//! A session is only an authentication handle: it binds a token to one user
//! until it expires. Permissions are never stored on it and are resolved
//! fresh from the user's profile on each request.

use chrono::{DateTime, Duration, Utc};

use warden_core::UserId;

use crate::token;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// SHA-256 digest of the bearer token.
    pub token_digest: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Open a session, returning it with the plaintext token to hand out once.
    pub fn open(user_id: UserId, ttl: Duration, now: DateTime<Utc>) -> (Self, String) {
        let token = token::generate_token();
        let session = Self {
            token_digest: token::digest(&token),
            user_id,
            expires_at: now + ttl,
            created_at: now,
        };
        (session, token)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_stores_only_the_digest() {
        let now = Utc::now();
        let (session, token) = Session::open(UserId::new(), Duration::minutes(60), now);
        assert_ne!(session.token_digest, token);
        assert_eq!(session.token_digest, token::digest(&token));
        assert!(!session.is_expired(now + Duration::minutes(59)));
        assert!(session.is_expired(now + Duration::minutes(60)));
    }
}
