use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use warden_core::{ProfileId, UserId};

use crate::user::LegacyRole;
use crate::{PermissionKey, Profile, User};

/// A user's permission set, materialised once and then checked in O(1).
///
/// Only the assigned profile contributes. The legacy `role` field is carried
/// for display and never widens the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePermissions {
    pub user_id: UserId,
    pub profile_id: Option<ProfileId>,
    pub profile_name: Option<String>,
    keys: HashSet<PermissionKey>,
}

impl EffectivePermissions {
    /// Resolve from the user's profile and the keys granted to it.
    ///
    /// An absent, mismatched or inactive profile yields the empty set.
    pub fn resolve<I>(user: &User, profile: Option<&Profile>, granted: I) -> Self
    where
        I: IntoIterator<Item = PermissionKey>,
    {
        let profile = profile.filter(|p| Some(p.id) == user.profile_id);
        let keys = match profile {
            Some(p) if p.is_active => granted.into_iter().collect(),
            _ => HashSet::new(),
        };
        Self {
            user_id: user.id,
            profile_id: profile.map(|p| p.id),
            profile_name: profile.map(|p| p.name.clone()),
            keys,
        }
    }

    /// Set with nothing in it (unauthenticated or profile-less callers).
    pub fn none(user_id: UserId) -> Self {
        Self {
            user_id,
            profile_id: None,
            profile_name: None,
            keys: HashSet::new(),
        }
    }

    pub fn has(&self, key: &PermissionKey) -> bool {
        self.keys.contains(key)
    }

    /// Same lookup as [`Self::has`] from loose parts. Malformed parts never
    /// match.
    pub fn has_permission(&self, module: &str, action: &str) -> bool {
        PermissionKey::new(module, action).is_ok_and(|key| self.keys.contains(&key))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionKey> {
        self.keys.iter()
    }

    /// `"module.action"` strings, sorted for stable output.
    pub fn to_sorted_strings(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.iter().map(ToString::to_string).collect();
        keys.sort();
        keys
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Pure policy check against a materialised set.
pub fn authorize(perms: &EffectivePermissions, required: &PermissionKey) -> Result<(), AuthzError> {
    if perms.has(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Why a permission check came out the way it did.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub reason: String,
    pub principal: PrincipalState,
    pub denial_reason: Option<DenialReason>,
}

/// Snapshot of the user as the resolver saw it.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub user_id: UserId,
    pub email: String,
    pub status: String,
    /// Display-only; never consulted for the decision.
    pub legacy_role: String,
    pub profile_id: Option<ProfileId>,
    pub profile_name: Option<String>,
    pub profile_active: Option<bool>,
    pub effective_permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    AccountInactive,
    NoProfile,
    ProfileInactive,
    MissingPermission,
}

/// Explain the decision for `required` on `user`.
///
/// `profile` is the user's assigned profile (if any) and `perms` the set
/// resolved from it.
pub fn explain_authorization(
    user: &User,
    profile: Option<&Profile>,
    perms: &EffectivePermissions,
    required: &PermissionKey,
) -> AuthorizationExplanation {
    let required_str = required.to_string();
    let principal = PrincipalState {
        user_id: user.id,
        email: user.email.clone(),
        status: user.status.to_string(),
        legacy_role: user.role.code().to_string(),
        profile_id: user.profile_id,
        profile_name: profile.map(|p| p.name.clone()),
        profile_active: profile.map(|p| p.is_active),
        effective_permissions: perms.to_sorted_strings(),
    };

    let denial = |kind: DenialKind, message: String, mut suggestions: Vec<String>| {
        if user.role == LegacyRole::Admin {
            suggestions.push(format!(
                "The legacy role '{}' is shown for reference only and grants no permissions",
                user.role.code()
            ));
        }
        AuthorizationExplanation {
            required_permission: required_str.clone(),
            granted: false,
            reason: message.clone(),
            principal: principal.clone(),
            denial_reason: Some(DenialReason {
                kind,
                message,
                suggestions,
            }),
        }
    };

    if !user.is_active() {
        return denial(
            DenialKind::AccountInactive,
            "Account is inactive; inactive accounts cannot sign in".to_string(),
            vec!["Reactivate the account before granting access".to_string()],
        );
    }

    let Some(profile) = profile else {
        return denial(
            DenialKind::NoProfile,
            "User has no profile and therefore no permissions".to_string(),
            vec![format!("Assign a profile that grants '{required_str}'")],
        );
    };

    if !profile.is_active {
        return denial(
            DenialKind::ProfileInactive,
            format!("Profile '{}' is inactive and grants nothing", profile.name),
            vec![
                format!("Reactivate profile '{}'", profile.name),
                format!("Assign an active profile that grants '{required_str}'"),
            ],
        );
    }

    if perms.has(required) {
        return AuthorizationExplanation {
            required_permission: required_str.clone(),
            granted: true,
            reason: format!("Profile '{}' grants '{required_str}'", profile.name),
            principal: principal.clone(),
            denial_reason: None,
        };
    }

    denial(
        DenialKind::MissingPermission,
        format!(
            "Profile '{}' does not grant '{required_str}'. Current permissions: {:?}",
            profile.name, principal.effective_permissions
        ),
        vec![
            format!("Grant '{required_str}' to profile '{}'", profile.name),
            format!("Assign a different profile that grants '{required_str}'"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{PROFILES_VIEW, USERS_EDIT, USERS_VIEW};
    use crate::user::{AccountCommand, RegisterUser};
    use chrono::Utc;
    use proptest::prelude::*;
    use warden_core::Aggregate;

    fn user_with(profile: Option<&Profile>, role: LegacyRole) -> User {
        let id = UserId::new();
        let mut user = User::empty(id);
        let cmd = AccountCommand::Register(RegisterUser {
            user_id: id,
            email: "ops@example.com".to_string(),
            display_name: "Ops".to_string(),
            password_hash: "$argon2id$x".to_string(),
            role,
            profile_id: profile.map(|p| p.id),
            first_login: false,
            password_expires_at: None,
            occurred_at: Utc::now(),
        });
        for e in user.handle(&cmd).unwrap() {
            user.apply(&e);
        }
        user
    }

    #[test]
    fn no_profile_means_no_permissions_even_for_legacy_admin() {
        let user = user_with(None, LegacyRole::Admin);
        let perms = EffectivePermissions::resolve(&user, None, [USERS_VIEW]);
        assert!(perms.is_empty());
        assert_eq!(
            authorize(&perms, &USERS_VIEW),
            Err(AuthzError::Forbidden("users.view".to_string()))
        );

        let why = explain_authorization(&user, None, &perms, &USERS_VIEW);
        assert!(!why.granted);
        let denial = why.denial_reason.unwrap();
        assert_eq!(denial.kind, DenialKind::NoProfile);
        assert!(denial.suggestions.iter().any(|s| s.contains("legacy role")));
    }

    #[test]
    fn inactive_profile_grants_nothing() {
        let mut profile = Profile::new("Support", None, Utc::now()).unwrap();
        profile.is_active = false;
        let user = user_with(Some(&profile), LegacyRole::User);
        let perms = EffectivePermissions::resolve(&user, Some(&profile), [USERS_VIEW]);
        assert!(perms.is_empty());
        assert_eq!(perms.profile_name.as_deref(), Some("Support"));

        let why = explain_authorization(&user, Some(&profile), &perms, &USERS_VIEW);
        assert_eq!(why.denial_reason.unwrap().kind, DenialKind::ProfileInactive);
    }

    #[test]
    fn profile_permissions_are_checked_by_membership() {
        let profile = Profile::new("Support", None, Utc::now()).unwrap();
        let user = user_with(Some(&profile), LegacyRole::Viewer);
        let perms = EffectivePermissions::resolve(&user, Some(&profile), [USERS_VIEW, USERS_EDIT]);

        assert!(perms.has(&USERS_VIEW));
        assert!(perms.has_permission("users", "edit"));
        assert!(!perms.has(&PROFILES_VIEW));
        assert_eq!(perms.to_sorted_strings(), vec!["users.edit", "users.view"]);

        let granted = explain_authorization(&user, Some(&profile), &perms, &USERS_EDIT);
        assert!(granted.granted);
        assert!(granted.denial_reason.is_none());

        let denied = explain_authorization(&user, Some(&profile), &perms, &PROFILES_VIEW);
        assert_eq!(denied.denial_reason.unwrap().kind, DenialKind::MissingPermission);
    }

    #[test]
    fn has_permission_agrees_with_has() {
        let profile = Profile::new("Support", None, Utc::now()).unwrap();
        let user = user_with(Some(&profile), LegacyRole::User);
        let perms = EffectivePermissions::resolve(&user, Some(&profile), [USERS_VIEW]);

        for key in crate::permissions::catalog() {
            assert_eq!(perms.has_permission(key.module(), key.action()), perms.has(&key), "{key}");
        }
        assert!(perms.has_permission("Users", "VIEW"));
        assert!(!perms.has_permission("users.view", ""));
        assert!(!perms.has_permission("", "view"));
    }

    #[test]
    fn foreign_profile_is_ignored() {
        let assigned = Profile::new("Assigned", None, Utc::now()).unwrap();
        let other = Profile::new("Other", None, Utc::now()).unwrap();
        let user = user_with(Some(&assigned), LegacyRole::User);
        let perms = EffectivePermissions::resolve(&user, Some(&other), [USERS_VIEW]);
        assert!(perms.is_empty());
        assert!(perms.profile_id.is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn empty_iff_no_profile(has_profile in any::<bool>(), picks in proptest::collection::vec(0usize..35, 1..10)) {
            let catalog: Vec<PermissionKey> = crate::permissions::catalog().collect();
            let granted: Vec<PermissionKey> = picks.iter().map(|i| catalog[*i].clone()).collect();

            let profile = Profile::new("P", None, Utc::now()).unwrap();
            let profile = has_profile.then_some(&profile);
            let user = user_with(profile, LegacyRole::Admin);
            let perms = EffectivePermissions::resolve(&user, profile, granted.clone());

            prop_assert_eq!(perms.is_empty(), !has_profile);
            if has_profile {
                for key in &granted {
                    prop_assert!(perms.has(key));
                }
            }
        }
    }
}
