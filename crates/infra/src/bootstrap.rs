//! Startup seeding: permission catalogue, administrator profile, first
//! administrator account, reference data.
//!
//! Safe to run on every start; anything already present is left alone.

use std::collections::HashSet;

use warden_auth::password;
use warden_auth::permissions::catalog;
use warden_auth::user::{AccountCommand, RegisterUser};
use warden_auth::{IncidentStatus, IncidentType, LegacyRole, Permission, PermissionKey, Profile, ProfilePermission};
use warden_core::{ProfileId, UserId};
use warden_reference::{default_items, JsonFileSource, ReferenceDataSource, ReferenceError, StaticSource};

use crate::service::{AccessControl, ServiceError};

pub const ADMINISTRATOR_PROFILE: &str = "Administrator";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub permissions_created: usize,
    pub administrator_profile: ProfileId,
    /// Set when the configured administrator account was created by this run.
    pub admin_user: Option<UserId>,
}

impl AccessControl {
    /// Seed the catalogue, the all-permission `Administrator` profile and,
    /// when configured, the bootstrap administrator.
    pub fn bootstrap(&self) -> Result<BootstrapReport, ServiceError> {
        let now = self.now();

        let existing: HashSet<PermissionKey> = self.store.list_permissions()?.into_iter().map(|p| p.key).collect();
        let mut created = 0;
        for key in catalog().filter(|k| !existing.contains(k)) {
            let permission = Permission::from_catalog(key, now);
            let incident = self.recorder.draft(
                IncidentType::AdminAction,
                IncidentStatus::Info,
                format!("catalogue permission '{}' seeded", permission.key),
                None,
                None,
            );
            self.store.insert_permission(permission, vec![incident])?;
            created += 1;
        }

        let profile = self.administrator_profile()?;
        for permission in self.store.list_permissions()? {
            let incident = self.recorder.draft(
                IncidentType::SecuritySettingChange,
                IncidentStatus::Info,
                format!("permission '{}' granted to profile '{}'", permission.key, profile.name),
                None,
                None,
            );
            self.store.grant(
                ProfilePermission {
                    profile_id: profile.id,
                    permission_id: permission.id,
                    created_at: now,
                },
                incident,
            )?;
        }

        let admin_user = self.seed_admin(profile.id)?;
        tracing::info!(
            permissions_created = created,
            profile_id = %profile.id,
            admin_created = admin_user.is_some(),
            "bootstrap complete"
        );
        Ok(BootstrapReport {
            permissions_created: created,
            administrator_profile: profile.id,
            admin_user,
        })
    }

    fn administrator_profile(&self) -> Result<Profile, ServiceError> {
        let existing = self
            .store
            .list_profiles()?
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(ADMINISTRATOR_PROFILE));
        if let Some(profile) = existing {
            return Ok(profile);
        }
        let profile = Profile::new(
            ADMINISTRATOR_PROFILE,
            Some("Every permission in the catalogue".to_string()),
            self.now(),
        )?;
        let incident = self.recorder.draft(
            IncidentType::AdminAction,
            IncidentStatus::Info,
            format!("profile '{}' created", profile.name),
            None,
            None,
        );
        self.store.insert_profile(profile.clone(), vec![incident])?;
        Ok(profile)
    }

    fn seed_admin(&self, profile_id: ProfileId) -> Result<Option<UserId>, ServiceError> {
        let Some(admin) = self.config.server.bootstrap_admin.clone() else {
            return Ok(None);
        };
        if self.store.find_user_by_email(&admin.email.trim().to_lowercase())?.is_some() {
            return Ok(None);
        }
        if let Err(violations) = password::validate(&admin.password, &self.config.password) {
            return Err(password::violations_to_error(&violations).into());
        }

        let now = self.now();
        let user_id = UserId::new();
        let cmd = AccountCommand::Register(RegisterUser {
            user_id,
            email: admin.email,
            display_name: "Administrator".to_string(),
            password_hash: self.hasher.hash(&admin.password)?,
            role: LegacyRole::Admin,
            profile_id: Some(profile_id),
            first_login: false,
            password_expires_at: self.password_expiry(now),
            occurred_at: now,
        });
        self.dispatcher.register(user_id, cmd, None)?;
        tracing::info!(user_id = %user_id, "bootstrap administrator created");
        Ok(Some(user_id))
    }

    /// Fill the reference cache from the configured items file, or from the
    /// built-in items when none is set.
    ///
    /// A failed load leaves the cache as it was; resolution then falls back
    /// to the built-in labels.
    pub fn load_reference(&self) -> Result<usize, ReferenceError> {
        let settings = &self.config.reference;
        let source: Box<dyn ReferenceDataSource> = match &settings.items_file {
            Some(path) => Box::new(JsonFileSource::new(path)),
            None => Box::new(StaticSource::new(default_items())),
        };
        self.reference
            .preload(source.as_ref(), &settings.preload_types, &settings.preload_modules)
    }
}

#[cfg(test)]
mod tests {
    use warden_reference::{ResolveRequest, Tier, MODULE_USERS, TYPE_ROLE};

    use super::*;
    use crate::service::testing::{harness, ADMIN_EMAIL};
    use crate::store::AccessStore;

    #[test]
    fn bootstrap_is_idempotent() {
        let h = harness();
        let summary = h.store.incident_summary().unwrap().total;

        let again = h.service.bootstrap().unwrap();
        assert_eq!(again.permissions_created, 0);
        assert!(again.admin_user.is_none());
        assert_eq!(h.store.list_profiles().unwrap().len(), 1);
        assert_eq!(h.store.incident_summary().unwrap().total, summary);

        let admin = h.store.find_user_by_email(ADMIN_EMAIL).unwrap().unwrap();
        assert_eq!(admin.role, LegacyRole::Admin);
        assert_eq!(admin.profile_id, Some(again.administrator_profile));
        assert_eq!(
            h.store.profile_permissions(again.administrator_profile).unwrap().len(),
            catalog().count()
        );
    }

    #[test]
    fn reference_load_switches_resolution_to_the_cache() {
        let h = harness();
        let request = ResolveRequest::new(TYPE_ROLE, MODULE_USERS).id(1).code("admin");
        assert_eq!(h.service.resolve_reference(&request).tier, Tier::StaticTable);

        assert!(h.service.load_reference().unwrap() > 0);
        assert_eq!(h.service.resolve_reference(&request).tier, Tier::ById);
    }
}
