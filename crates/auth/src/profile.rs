//! Profiles, permissions and the grant join entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{DomainError, Entity, PermissionId, ProfileId};

use crate::PermissionKey;

/// Named, activatable bundle of permissions assignable to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let name = validate_name(name.into())?;
        Ok(Self {
            id: ProfileId::new(),
            name,
            description: clean_optional(description),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial update, returning the updated copy.
    pub fn updated(&self, changes: &ProfileChanges, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let mut next = self.clone();
        if let Some(name) = &changes.name {
            next.name = validate_name(name.clone())?;
        }
        if let Some(description) = &changes.description {
            next.description = clean_optional(Some(description.clone()));
        }
        if let Some(active) = changes.is_active {
            next.is_active = active;
        }
        next.updated_at = now;
        Ok(next)
    }
}

impl Entity for Profile {
    type Id = ProfileId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Partial update of a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

fn validate_name(name: String) -> Result<String, DomainError> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if name.chars().count() > 100 {
        return Err(DomainError::validation("name cannot exceed 100 characters"));
    }
    Ok(name)
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Atomic `(module, action)` capability with a human name.
///
/// There is no update path: once created a permission only goes away by
/// deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub key: PermissionKey,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(
        key: PermissionKey,
        name: impl Into<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: PermissionId::new(),
            key,
            name: validate_name(name.into())?,
            description: clean_optional(description),
            created_at: now,
        })
    }

    /// Catalogue entry with a generated name such as "Users: edit".
    pub fn from_catalog(key: PermissionKey, now: DateTime<Utc>) -> Self {
        let name = format!("{}: {}", title_case(key.module()), key.action());
        Self {
            id: PermissionId::new(),
            key,
            name,
            description: None,
            created_at: now,
        }
    }
}

fn title_case(raw: &str) -> String {
    let spaced = raw.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Entity for Permission {
    type Id = PermissionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Grant of one permission to one profile; unique on the id pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfilePermission {
    pub profile_id: ProfileId,
    pub permission_id: PermissionId,
    pub created_at: DateTime<Utc>,
}
