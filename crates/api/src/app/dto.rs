//! Request bodies and query strings that are specific to the HTTP layer.

use serde::{Deserialize, Serialize};

use warden_core::ProfileId;
use warden_reference::MODULE_USERS;

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetComplete {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordCheckRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// A TOTP or recovery code.
#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

/// `null` clears the assignment.
#[derive(Debug, Deserialize)]
pub struct AssignProfileRequest {
    pub profile_id: Option<ProfileId>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub permission: String,
}

#[derive(Debug, Deserialize)]
pub struct ReferenceQuery {
    pub module: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub id: Option<i64>,
    pub code: Option<String>,
    pub module: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReferenceRefreshed {
    pub loaded: usize,
}

pub fn module_or_default(module: Option<&str>) -> &str {
    module.filter(|m| !m.trim().is_empty()).unwrap_or(MODULE_USERS)
}
