use std::borrow::Cow;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use warden_core::{DomainError, ValueObject};

/// Atomic capability identifier: an `(module, action)` pair.
///
/// Rendered as `"module.action"` (e.g. `"users.edit"`). Both halves are
/// lower-case identifiers without dots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionKey {
    module: Cow<'static, str>,
    action: Cow<'static, str>,
}

impl PermissionKey {
    /// Build a key from static parts (catalogue constants).
    pub const fn from_static(module: &'static str, action: &'static str) -> Self {
        Self {
            module: Cow::Borrowed(module),
            action: Cow::Borrowed(action),
        }
    }

    /// Build a key from runtime input, validating both halves.
    pub fn new(module: impl Into<String>, action: impl Into<String>) -> Result<Self, DomainError> {
        let module = normalize_part(module.into(), "module")?;
        let action = normalize_part(action.into(), "action")?;
        Ok(Self {
            module: Cow::Owned(module),
            action: Cow::Owned(action),
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

fn normalize_part(raw: String, what: &str) -> Result<String, DomainError> {
    let part = raw.trim().to_lowercase();
    if part.is_empty() {
        return Err(DomainError::validation(format!("permission {what} cannot be empty")));
    }
    if !part
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(DomainError::validation(format!(
            "permission {what} '{part}' may only contain letters, digits, '_' or '-'"
        )));
    }
    Ok(part)
}

impl ValueObject for PermissionKey {}

impl core::fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.module, self.action)
    }
}

impl FromStr for PermissionKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, action) = s
            .split_once('.')
            .ok_or_else(|| DomainError::validation(format!("'{s}' is not in module.action form")))?;
        Self::new(module, action)
    }
}

impl TryFrom<String> for PermissionKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PermissionKey> for String {
    fn from(value: PermissionKey) -> Self {
        value.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Seed catalogue
// ─────────────────────────────────────────────────────────────────────────────

/// Modules covered by the default permission catalogue.
pub const CATALOG_MODULES: &[&str] = &[
    "dashboard",
    "access_logs",
    "users",
    "reports",
    "settings",
    "profiles",
    "security",
];

/// Actions available on every catalogue module.
pub const CATALOG_ACTIONS: &[&str] = &["view", "create", "edit", "delete", "export"];

pub const USERS_VIEW: PermissionKey = PermissionKey::from_static("users", "view");
pub const USERS_CREATE: PermissionKey = PermissionKey::from_static("users", "create");
pub const USERS_EDIT: PermissionKey = PermissionKey::from_static("users", "edit");
pub const PROFILES_VIEW: PermissionKey = PermissionKey::from_static("profiles", "view");
pub const PROFILES_CREATE: PermissionKey = PermissionKey::from_static("profiles", "create");
pub const PROFILES_EDIT: PermissionKey = PermissionKey::from_static("profiles", "edit");
pub const PROFILES_DELETE: PermissionKey = PermissionKey::from_static("profiles", "delete");
pub const SECURITY_VIEW: PermissionKey = PermissionKey::from_static("security", "view");
pub const SETTINGS_VIEW: PermissionKey = PermissionKey::from_static("settings", "view");
pub const SETTINGS_EDIT: PermissionKey = PermissionKey::from_static("settings", "edit");

/// Every `(module, action)` pair of the default catalogue.
pub fn catalog() -> impl Iterator<Item = PermissionKey> {
    CATALOG_MODULES.iter().flat_map(|module| {
        CATALOG_ACTIONS
            .iter()
            .map(move |action| PermissionKey::from_static(module, action))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders_dotted_form() {
        let key: PermissionKey = " Users.Edit".parse().unwrap();
        assert_eq!(key, USERS_EDIT);
        assert_eq!(key.to_string(), "users.edit");
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!("users".parse::<PermissionKey>().is_err());
        assert!(".view".parse::<PermissionKey>().is_err());
        assert!("users.ed it".parse::<PermissionKey>().is_err());
    }

    #[test]
    fn serde_uses_dotted_string() {
        let json = serde_json::to_string(&SECURITY_VIEW).unwrap();
        assert_eq!(json, "\"security.view\"");
        let back: PermissionKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SECURITY_VIEW);
    }

    #[test]
    fn catalog_is_modules_times_actions() {
        assert_eq!(catalog().count(), CATALOG_MODULES.len() * CATALOG_ACTIONS.len());
        assert!(catalog().any(|k| k == USERS_CREATE));
    }
}
