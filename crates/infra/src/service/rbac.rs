//! Profiles, permissions and grants.

use serde::Deserialize;

use warden_auth::permissions::{PROFILES_CREATE, PROFILES_DELETE, PROFILES_EDIT, PROFILES_VIEW};
use warden_auth::{IncidentStatus, IncidentType, Permission, PermissionKey, Profile, ProfileChanges, ProfilePermission};
use warden_core::{DomainError, PermissionId, ProfileId};

use super::views::ProfileDetail;
use super::{subject, AccessControl, Actor, ServiceError};

#[derive(Debug, Clone, Deserialize)]
pub struct NewProfile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPermission {
    pub module: String,
    pub action: String,
    /// Defaults to a name derived from the key.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl AccessControl {
    // ── profiles ────────────────────────────────────────────────────────────

    pub fn create_profile(&self, actor: &Actor, input: NewProfile) -> Result<Profile, ServiceError> {
        self.require(actor, &PROFILES_CREATE)?;
        let profile = Profile::new(input.name, input.description, self.now())?;
        let incident = self.recorder.draft(
            IncidentType::AdminAction,
            IncidentStatus::Info,
            format!("profile '{}' created", profile.name),
            actor.ip(),
            Some(subject(&actor.user)),
        );
        self.store.insert_profile(profile.clone(), vec![incident])?;
        tracing::info!(profile_id = %profile.id, actor = %actor.id(), "profile created");
        Ok(profile)
    }

    /// All profiles, ordered by name.
    pub fn list_profiles(&self, actor: &Actor) -> Result<Vec<Profile>, ServiceError> {
        self.require(actor, &PROFILES_VIEW)?;
        let mut profiles = self.store.list_profiles()?;
        profiles.sort_by_key(|p| p.name.to_lowercase());
        Ok(profiles)
    }

    pub fn get_profile(&self, actor: &Actor, id: ProfileId) -> Result<ProfileDetail, ServiceError> {
        self.require(actor, &PROFILES_VIEW)?;
        let profile = self.load_profile(id)?;
        let permissions = self.store.profile_permissions(id)?;
        Ok(ProfileDetail { profile, permissions })
    }

    /// Rename, re-describe or (de)activate a profile. Toggling the active
    /// flag changes what every member may do and is audited as a security
    /// setting change.
    pub fn update_profile(&self, actor: &Actor, id: ProfileId, changes: ProfileChanges) -> Result<Profile, ServiceError> {
        self.require(actor, &PROFILES_EDIT)?;
        let current = self.load_profile(id)?;
        let next = current.updated(&changes, self.now())?;
        let unchanged = next.name == current.name
            && next.description == current.description
            && next.is_active == current.is_active;
        if unchanged {
            return Ok(current);
        }

        let (incident_type, details) = if next.is_active != current.is_active {
            let verb = if next.is_active { "activated" } else { "deactivated" };
            (IncidentType::SecuritySettingChange, format!("profile '{}' {verb}", next.name))
        } else {
            (IncidentType::AdminAction, format!("profile '{}' updated", next.name))
        };
        let incident = self.recorder.draft(
            incident_type,
            IncidentStatus::Info,
            details,
            actor.ip(),
            Some(subject(&actor.user)),
        );
        self.store.update_profile(&next, vec![incident])?;
        Ok(next)
    }

    /// Delete a profile. Its members are left without a profile; returns
    /// how many were affected.
    pub fn delete_profile(&self, actor: &Actor, id: ProfileId) -> Result<usize, ServiceError> {
        self.require(actor, &PROFILES_DELETE)?;
        let profile = self.load_profile(id)?;
        let incident = self.recorder.draft(
            IncidentType::SecuritySettingChange,
            IncidentStatus::Info,
            format!("profile '{}' deleted", profile.name),
            actor.ip(),
            Some(subject(&actor.user)),
        );
        let reassigned = self.store.delete_profile(id, vec![incident])?;
        tracing::info!(profile_id = %id, reassigned, "profile deleted");
        Ok(reassigned)
    }

    pub fn profile_permissions(&self, actor: &Actor, id: ProfileId) -> Result<Vec<Permission>, ServiceError> {
        self.require(actor, &PROFILES_VIEW)?;
        self.load_profile(id)?;
        Ok(self.store.profile_permissions(id)?)
    }

    // ── permissions ─────────────────────────────────────────────────────────

    pub fn create_permission(&self, actor: &Actor, input: NewPermission) -> Result<Permission, ServiceError> {
        self.require(actor, &PROFILES_CREATE)?;
        let key = PermissionKey::new(input.module, input.action)?;
        let now = self.now();
        let permission = match input.name {
            Some(name) => Permission::new(key, name, input.description, now)?,
            None => {
                let mut permission = Permission::from_catalog(key, now);
                permission.description = input.description.filter(|d| !d.trim().is_empty());
                permission
            }
        };
        let incident = self.recorder.draft(
            IncidentType::AdminAction,
            IncidentStatus::Info,
            format!("permission '{}' created", permission.key),
            actor.ip(),
            Some(subject(&actor.user)),
        );
        self.store.insert_permission(permission.clone(), vec![incident])?;
        Ok(permission)
    }

    /// All permissions, ordered by key.
    pub fn list_permissions(&self, actor: &Actor) -> Result<Vec<Permission>, ServiceError> {
        self.require(actor, &PROFILES_VIEW)?;
        let mut permissions = self.store.list_permissions()?;
        permissions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(permissions)
    }

    /// Delete a permission and every grant of it.
    pub fn delete_permission(&self, actor: &Actor, id: PermissionId) -> Result<usize, ServiceError> {
        self.require(actor, &PROFILES_DELETE)?;
        let permission = self
            .store
            .get_permission(id)?
            .ok_or(ServiceError::Domain(DomainError::NotFound))?;
        let incident = self.recorder.draft(
            IncidentType::SecuritySettingChange,
            IncidentStatus::Info,
            format!("permission '{}' deleted", permission.key),
            actor.ip(),
            Some(subject(&actor.user)),
        );
        Ok(self.store.delete_permission(id, vec![incident])?)
    }

    // ── grants ──────────────────────────────────────────────────────────────

    /// Grant a permission to a profile. Granting twice is a no-op and
    /// returns `false`.
    pub fn grant_permission(&self, actor: &Actor, profile_id: ProfileId, permission_id: PermissionId) -> Result<bool, ServiceError> {
        self.require(actor, &PROFILES_EDIT)?;
        let (profile, permission) = self.grant_parties(profile_id, permission_id)?;
        let incident = self.recorder.draft(
            IncidentType::SecuritySettingChange,
            IncidentStatus::Info,
            format!("permission '{}' granted to profile '{}'", permission.key, profile.name),
            actor.ip(),
            Some(subject(&actor.user)),
        );
        let grant = ProfilePermission {
            profile_id,
            permission_id,
            created_at: self.now(),
        };
        Ok(self.store.grant(grant, incident)?)
    }

    /// Revoke a grant. Revoking an absent grant returns `false`.
    pub fn revoke_permission(&self, actor: &Actor, profile_id: ProfileId, permission_id: PermissionId) -> Result<bool, ServiceError> {
        self.require(actor, &PROFILES_EDIT)?;
        let (profile, permission) = self.grant_parties(profile_id, permission_id)?;
        let incident = self.recorder.draft(
            IncidentType::SecuritySettingChange,
            IncidentStatus::Info,
            format!("permission '{}' revoked from profile '{}'", permission.key, profile.name),
            actor.ip(),
            Some(subject(&actor.user)),
        );
        Ok(self.store.revoke(profile_id, permission_id, incident)?)
    }

    fn grant_parties(&self, profile_id: ProfileId, permission_id: PermissionId) -> Result<(Profile, Permission), ServiceError> {
        let profile = self.load_profile(profile_id)?;
        let permission = self
            .store
            .get_permission(permission_id)?
            .ok_or(ServiceError::Domain(DomainError::NotFound))?;
        Ok((profile, permission))
    }
}

#[cfg(test)]
mod tests {
    use warden_auth::IncidentType;

    use super::*;
    use crate::service::testing::harness;
    use crate::service::NewUser;
    use crate::store::{AccessStore, IncidentQuery};

    fn security_changes(h: &crate::service::testing::Harness) -> u64 {
        h.store
            .list_incidents(&IncidentQuery {
                incident_type: Some(IncidentType::SecuritySettingChange),
                ..IncidentQuery::default()
            })
            .unwrap()
            .total
    }

    #[test]
    fn duplicate_grant_is_idempotent_and_audited_once() {
        let h = harness();
        let admin = h.admin();
        let profile = h
            .service
            .create_profile(
                &admin,
                NewProfile {
                    name: "Auditors".to_string(),
                    description: Some("read-only".to_string()),
                },
            )
            .unwrap();
        let permission = h
            .service
            .create_permission(
                &admin,
                NewPermission {
                    module: "audit".to_string(),
                    action: "view".to_string(),
                    name: None,
                    description: None,
                },
            )
            .unwrap();
        assert_eq!(permission.name, "Audit: view");

        let before = security_changes(&h);
        assert!(h.service.grant_permission(&admin, profile.id, permission.id).unwrap());
        assert!(!h.service.grant_permission(&admin, profile.id, permission.id).unwrap());
        assert_eq!(h.service.profile_permissions(&admin, profile.id).unwrap().len(), 1);
        assert_eq!(security_changes(&h), before + 1);

        assert!(h.service.revoke_permission(&admin, profile.id, permission.id).unwrap());
        assert!(!h.service.revoke_permission(&admin, profile.id, permission.id).unwrap());
        assert_eq!(security_changes(&h), before + 2);
    }

    #[test]
    fn duplicate_keys_and_names_conflict() {
        let h = harness();
        let admin = h.admin();
        let dup = h.service.create_permission(
            &admin,
            NewPermission {
                module: "Users".to_string(),
                action: "VIEW".to_string(),
                name: None,
                description: None,
            },
        );
        assert!(matches!(dup, Err(ServiceError::Domain(DomainError::Conflict(_)))));

        let dup = h.service.create_profile(
            &admin,
            NewProfile {
                name: "administrator".to_string(),
                description: None,
            },
        );
        assert!(matches!(dup, Err(ServiceError::Domain(DomainError::Conflict(_)))));
    }

    #[test]
    fn deleting_a_profile_reassigns_members_to_no_profile() {
        let h = harness();
        let admin = h.admin();
        let profile = h
            .service
            .create_profile(
                &admin,
                NewProfile {
                    name: "Temp".to_string(),
                    description: None,
                },
            )
            .unwrap();
        let created = h
            .service
            .create_user(
                &admin,
                NewUser {
                    email: "pat@example.com".to_string(),
                    display_name: "Pat".to_string(),
                    password: Some("Pat-Passw0rd".to_string()),
                    profile_id: Some(profile.id),
                    ..NewUser::default()
                },
            )
            .unwrap();
        assert_eq!(created.user.profile_id, Some(profile.id));

        assert_eq!(h.service.delete_profile(&admin, profile.id).unwrap(), 1);
        let user = h.service.get_user(&admin, created.user.id).unwrap();
        assert!(user.profile_id.is_none());
        assert!(matches!(
            h.service.get_profile(&admin, profile.id),
            Err(ServiceError::Domain(DomainError::NotFound))
        ));
    }

    #[test]
    fn unchanged_profile_update_records_nothing() {
        let h = harness();
        let admin = h.admin();
        let profile = h
            .service
            .create_profile(
                &admin,
                NewProfile {
                    name: "Ops".to_string(),
                    description: None,
                },
            )
            .unwrap();
        let before = h.store.incident_summary().unwrap().total;
        h.service
            .update_profile(
                &admin,
                profile.id,
                ProfileChanges {
                    name: Some(" Ops ".to_string()),
                    ..ProfileChanges::default()
                },
            )
            .unwrap();
        assert_eq!(h.store.incident_summary().unwrap().total, before);
    }
}
