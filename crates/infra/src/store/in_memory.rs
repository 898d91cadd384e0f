use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use warden_auth::{Permission, Profile, ProfilePermission, SecurityIncident, Session, User};
use warden_core::{AggregateRoot, ExpectedVersion, PermissionId, ProfileId, UserId};

use super::query::{IncidentPage, IncidentQuery, IncidentSummary};
use super::{AccessStore, StoreError};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    /// Lower-case email -> user.
    emails: HashMap<String, UserId>,
    profiles: HashMap<ProfileId, Profile>,
    permissions: HashMap<PermissionId, Permission>,
    /// Unique on `(profile_id, permission_id)`, kept in grant order.
    grants: Vec<ProfilePermission>,
    incidents: Vec<SecurityIncident>,
    sessions: HashMap<String, Session>,
}

impl State {
    fn has_grant(&self, profile_id: ProfileId, permission_id: PermissionId) -> bool {
        self.grants
            .iter()
            .any(|g| g.profile_id == profile_id && g.permission_id == permission_id)
    }

    /// A user may only be pointed at a profile that exists and is active.
    fn check_assignable(&self, profile_id: Option<ProfileId>) -> Result<(), StoreError> {
        let Some(id) = profile_id else {
            return Ok(());
        };
        match self.profiles.get(&id) {
            None => Err(StoreError::NotFound(format!("profile {id}"))),
            Some(p) if !p.is_active => Err(StoreError::Conflict(format!("profile '{}' is inactive", p.name))),
            Some(_) => Ok(()),
        }
    }

    fn profile_name_taken(&self, name: &str, except: Option<ProfileId>) -> bool {
        self.profiles
            .values()
            .any(|p| Some(p.id) != except && p.name.eq_ignore_ascii_case(name))
    }
}

/// In-memory access store.
///
/// One `RwLock` guards everything, so each call is trivially atomic.
/// Intended for tests/dev and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryAccessStore {
    state: RwLock<State>,
}

impl InMemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

impl AccessStore for InMemoryAccessStore {
    fn insert_user(&self, user: User, incidents: Vec<SecurityIncident>) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("user {} already exists", user.id)));
        }
        if state.emails.contains_key(&user.email) {
            return Err(StoreError::Conflict(format!("email '{}' is already in use", user.email)));
        }
        state.check_assignable(user.profile_id)?;
        state.emails.insert(user.email.clone(), user.id);
        state.users.insert(user.id, user);
        state.incidents.extend(incidents);
        Ok(())
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.read()?;
        let key = email.trim().to_lowercase();
        Ok(state.emails.get(&key).and_then(|id| state.users.get(id)).cloned())
    }

    fn find_user_by_reset_digest(&self, digest: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.reset.as_ref().is_some_and(|r| r.token_digest == digest))
            .cloned())
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.read()?.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.email.cmp(&b.email)));
        Ok(users)
    }

    fn commit_user(
        &self,
        user: &User,
        expected: ExpectedVersion,
        incidents: Vec<SecurityIncident>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let current = state
            .users
            .get(&user.id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user.id)))?;

        if !expected.matches(current.version()) {
            return Err(StoreError::Concurrency(format!(
                "expected {expected:?}, found {}",
                current.version()
            )));
        }

        if current.profile_id != user.profile_id {
            state.check_assignable(user.profile_id)?;
        }

        let old_email = current.email.clone();
        if old_email != user.email {
            if state.emails.get(&user.email).is_some_and(|owner| *owner != user.id) {
                return Err(StoreError::Conflict(format!("email '{}' is already in use", user.email)));
            }
            state.emails.remove(&old_email);
            state.emails.insert(user.email.clone(), user.id);
        }

        state.users.insert(user.id, user.clone());
        state.incidents.extend(incidents);
        Ok(())
    }

    fn insert_profile(&self, profile: Profile, incidents: Vec<SecurityIncident>) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.profile_name_taken(&profile.name, None) {
            return Err(StoreError::Conflict(format!("profile '{}' already exists", profile.name)));
        }
        state.profiles.insert(profile.id, profile);
        state.incidents.extend(incidents);
        Ok(())
    }

    fn get_profile(&self, id: ProfileId) -> Result<Option<Profile>, StoreError> {
        Ok(self.read()?.profiles.get(&id).cloned())
    }

    fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let mut profiles: Vec<Profile> = self.read()?.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(profiles)
    }

    fn update_profile(&self, profile: &Profile, incidents: Vec<SecurityIncident>) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.profiles.contains_key(&profile.id) {
            return Err(StoreError::NotFound(format!("profile {}", profile.id)));
        }
        if state.profile_name_taken(&profile.name, Some(profile.id)) {
            return Err(StoreError::Conflict(format!("profile '{}' already exists", profile.name)));
        }
        state.profiles.insert(profile.id, profile.clone());
        state.incidents.extend(incidents);
        Ok(())
    }

    fn delete_profile(&self, id: ProfileId, incidents: Vec<SecurityIncident>) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        if state.profiles.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("profile {id}")));
        }
        state.grants.retain(|g| g.profile_id != id);

        let mut reassigned = 0;
        for user in state.users.values_mut() {
            if user.profile_id == Some(id) {
                user.profile_id = None;
                // Stale in-flight decisions about this user must not commit.
                user.version += 1;
                reassigned += 1;
            }
        }
        state.incidents.extend(incidents);
        Ok(reassigned)
    }

    fn insert_permission(&self, permission: Permission, incidents: Vec<SecurityIncident>) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.permissions.values().any(|p| p.key == permission.key) {
            return Err(StoreError::Conflict(format!("permission '{}' already exists", permission.key)));
        }
        state.permissions.insert(permission.id, permission);
        state.incidents.extend(incidents);
        Ok(())
    }

    fn get_permission(&self, id: PermissionId) -> Result<Option<Permission>, StoreError> {
        Ok(self.read()?.permissions.get(&id).cloned())
    }

    fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let mut permissions: Vec<Permission> = self.read()?.permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(permissions)
    }

    fn delete_permission(&self, id: PermissionId, incidents: Vec<SecurityIncident>) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        if state.permissions.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("permission {id}")));
        }
        let before = state.grants.len();
        state.grants.retain(|g| g.permission_id != id);
        let removed = before - state.grants.len();
        state.incidents.extend(incidents);
        Ok(removed)
    }

    fn grant(&self, grant: ProfilePermission, incident: SecurityIncident) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        if !state.profiles.contains_key(&grant.profile_id) {
            return Err(StoreError::NotFound(format!("profile {}", grant.profile_id)));
        }
        if !state.permissions.contains_key(&grant.permission_id) {
            return Err(StoreError::NotFound(format!("permission {}", grant.permission_id)));
        }
        if state.has_grant(grant.profile_id, grant.permission_id) {
            return Ok(false);
        }
        state.grants.push(grant);
        state.incidents.push(incident);
        Ok(true)
    }

    fn revoke(
        &self,
        profile_id: ProfileId,
        permission_id: PermissionId,
        incident: SecurityIncident,
    ) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        if !state.profiles.contains_key(&profile_id) {
            return Err(StoreError::NotFound(format!("profile {profile_id}")));
        }
        if !state.has_grant(profile_id, permission_id) {
            return Ok(false);
        }
        state
            .grants
            .retain(|g| !(g.profile_id == profile_id && g.permission_id == permission_id));
        state.incidents.push(incident);
        Ok(true)
    }

    fn profile_permissions(&self, profile_id: ProfileId) -> Result<Vec<Permission>, StoreError> {
        let state = self.read()?;
        if !state.profiles.contains_key(&profile_id) {
            return Err(StoreError::NotFound(format!("profile {profile_id}")));
        }
        Ok(state
            .grants
            .iter()
            .filter(|g| g.profile_id == profile_id)
            .filter_map(|g| state.permissions.get(&g.permission_id))
            .cloned()
            .collect())
    }

    fn append_incident(&self, incident: SecurityIncident) -> Result<(), StoreError> {
        self.write()?.incidents.push(incident);
        Ok(())
    }

    fn list_incidents(&self, query: &IncidentQuery) -> Result<IncidentPage, StoreError> {
        Ok(query.paginate(&self.read()?.incidents))
    }

    fn incident_summary(&self) -> Result<IncidentSummary, StoreError> {
        Ok(IncidentSummary::from_incidents(&self.read()?.incidents))
    }

    fn insert_session(&self, session: Session) -> Result<(), StoreError> {
        self.write()?.sessions.insert(session.token_digest.clone(), session);
        Ok(())
    }

    fn get_session(&self, token_digest: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.read()?.sessions.get(token_digest).cloned())
    }

    fn delete_session(&self, token_digest: &str, incident: Option<SecurityIncident>) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let removed = state.sessions.remove(token_digest).is_some();
        if removed {
            state.incidents.extend(incident);
        }
        Ok(removed)
    }

    fn delete_user_sessions(&self, user_id: UserId) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.user_id != user_id);
        Ok(before - state.sessions.len())
    }

    fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| !s.is_expired(now));
        Ok(before - state.sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use warden_auth::permissions::USERS_VIEW;
    use warden_auth::user::{AccountCommand, RegisterUser, UnlockAccount};
    use warden_auth::{IncidentStatus, IncidentType, LegacyRole};
    use warden_core::Aggregate;

    fn note(details: &str) -> SecurityIncident {
        SecurityIncident::new(
            IncidentType::AdminAction,
            IncidentStatus::Info,
            details,
            None,
            None,
            Utc::now(),
        )
    }

    fn new_user(email: &str, profile_id: Option<ProfileId>) -> User {
        let id = UserId::new();
        let mut user = User::empty(id);
        let cmd = AccountCommand::Register(RegisterUser {
            user_id: id,
            email: email.to_string(),
            display_name: "Someone".to_string(),
            password_hash: "$argon2id$h".to_string(),
            role: LegacyRole::User,
            profile_id,
            first_login: false,
            password_expires_at: None,
            occurred_at: Utc::now(),
        });
        for e in user.handle(&cmd).unwrap() {
            user.apply(&e);
        }
        user
    }

    fn incident_count(store: &InMemoryAccessStore) -> u64 {
        store.incident_summary().unwrap().total
    }

    #[test]
    fn duplicate_email_conflicts() {
        let store = InMemoryAccessStore::new();
        store.insert_user(new_user("a@example.com", None), vec![]).unwrap();
        let err = store
            .insert_user(new_user("A@example.com", None), vec![])
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.find_user_by_email(" A@EXAMPLE.com ").unwrap().is_some());
    }

    #[test]
    fn stale_commit_is_rejected_without_recording() {
        let store = InMemoryAccessStore::new();
        let mut user = new_user("a@example.com", None);
        store.insert_user(user.clone(), vec![]).unwrap();
        let expected = ExpectedVersion::Exact(user.version);

        user.login_attempts = 3;
        user.version += 1;
        store.commit_user(&user, expected, vec![note("first")]).unwrap();

        let err = store.commit_user(&user, expected, vec![note("second")]).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
        assert_eq!(incident_count(&store), 1);
    }

    #[test]
    fn deleting_profile_cascades_to_grants_and_users() {
        let store = InMemoryAccessStore::new();
        let profile = Profile::new("Support", None, Utc::now()).unwrap();
        let permission = Permission::from_catalog(USERS_VIEW, Utc::now());
        store.insert_profile(profile.clone(), vec![]).unwrap();
        store.insert_permission(permission.clone(), vec![]).unwrap();
        let grant = ProfilePermission {
            profile_id: profile.id,
            permission_id: permission.id,
            created_at: Utc::now(),
        };
        assert!(store.grant(grant, note("grant")).unwrap());

        let user = new_user("a@example.com", Some(profile.id));
        let version = user.version;
        store.insert_user(user.clone(), vec![]).unwrap();

        assert_eq!(store.delete_profile(profile.id, vec![note("delete")]).unwrap(), 1);
        let after = store.get_user(user.id).unwrap().unwrap();
        assert!(after.profile_id.is_none());
        assert_eq!(after.version, version + 1);
        assert!(store.get_permission(permission.id).unwrap().is_some());
        assert!(matches!(
            store.profile_permissions(profile.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn deleting_permission_removes_its_grants() {
        let store = InMemoryAccessStore::new();
        let profile = Profile::new("Support", None, Utc::now()).unwrap();
        let permission = Permission::from_catalog(USERS_VIEW, Utc::now());
        store.insert_profile(profile.clone(), vec![]).unwrap();
        store.insert_permission(permission.clone(), vec![]).unwrap();
        store
            .grant(
                ProfilePermission {
                    profile_id: profile.id,
                    permission_id: permission.id,
                    created_at: Utc::now(),
                },
                note("grant"),
            )
            .unwrap();
        assert_eq!(store.delete_permission(permission.id, vec![]).unwrap(), 1);
        assert!(store.profile_permissions(profile.id).unwrap().is_empty());
    }

    #[test]
    fn duplicate_permission_key_conflicts() {
        let store = InMemoryAccessStore::new();
        store
            .insert_permission(Permission::from_catalog(USERS_VIEW, Utc::now()), vec![])
            .unwrap();
        let err = store
            .insert_permission(Permission::from_catalog(USERS_VIEW, Utc::now()), vec![])
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn revoke_of_missing_grant_is_quiet() {
        let store = InMemoryAccessStore::new();
        let profile = Profile::new("Support", None, Utc::now()).unwrap();
        store.insert_profile(profile.clone(), vec![]).unwrap();
        assert!(!store.revoke(profile.id, PermissionId::new(), note("revoke")).unwrap());
        assert_eq!(incident_count(&store), 0);
    }

    #[test]
    fn unlock_commit_round_trip() {
        let store = InMemoryAccessStore::new();
        let mut user = new_user("a@example.com", None);
        user.login_attempts = 2;
        store.insert_user(user.clone(), vec![]).unwrap();

        let expected = ExpectedVersion::Exact(user.version);
        let cmd = AccountCommand::Unlock(UnlockAccount {
            actor: None,
            occurred_at: Utc::now(),
        });
        for e in user.handle(&cmd).unwrap() {
            user.apply(&e);
        }
        store.commit_user(&user, expected, vec![]).unwrap();
        assert_eq!(store.get_user(user.id).unwrap().unwrap().login_attempts, 0);
    }

    #[test]
    fn profile_deactivated_before_commit_is_not_assigned() {
        let store = InMemoryAccessStore::new();
        let profile = Profile::new("Support", None, Utc::now()).unwrap();
        store.insert_profile(profile.clone(), vec![]).unwrap();
        let mut member = new_user("a@example.com", Some(profile.id));
        let mut newcomer = new_user("b@example.com", None);
        store.insert_user(member.clone(), vec![]).unwrap();
        store.insert_user(newcomer.clone(), vec![]).unwrap();

        // Another writer deactivates the profile after the caller checked it.
        let mut inactive = profile.clone();
        inactive.is_active = false;
        store.update_profile(&inactive, vec![]).unwrap();

        let expected = ExpectedVersion::Exact(newcomer.version);
        newcomer.profile_id = Some(profile.id);
        let err = store.commit_user(&newcomer, expected, vec![note("assign")]).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.get_user(newcomer.id).unwrap().unwrap().profile_id.is_none());
        assert_eq!(incident_count(&store), 0);

        // Existing members keep committing unrelated changes.
        let expected = ExpectedVersion::Exact(member.version);
        member.login_attempts = 1;
        store.commit_user(&member, expected, vec![]).unwrap();

        let late = new_user("c@example.com", Some(profile.id));
        assert!(matches!(store.insert_user(late, vec![]), Err(StoreError::Conflict(_))));
        let orphan = new_user("d@example.com", Some(ProfileId::new()));
        assert!(matches!(store.insert_user(orphan, vec![]), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn purge_drops_only_expired_sessions() {
        let store = InMemoryAccessStore::new();
        let now = Utc::now();
        let user = UserId::new();
        let (stale, _) = Session::open(user, chrono::Duration::minutes(5), now - chrono::Duration::hours(1));
        let (live, _) = Session::open(user, chrono::Duration::minutes(60), now);
        store.insert_session(stale.clone()).unwrap();
        store.insert_session(live.clone()).unwrap();

        assert_eq!(store.purge_expired_sessions(now).unwrap(), 1);
        assert!(store.get_session(&stale.token_digest).unwrap().is_none());
        assert!(store.get_session(&live.token_digest).unwrap().is_some());
        assert_eq!(store.purge_expired_sessions(now).unwrap(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn granting_twice_leaves_one_row(repeats in 1usize..6) {
            let store = InMemoryAccessStore::new();
            let profile = Profile::new("P", None, Utc::now()).unwrap();
            let permission = Permission::from_catalog(USERS_VIEW, Utc::now());
            store.insert_profile(profile.clone(), vec![]).unwrap();
            store.insert_permission(permission.clone(), vec![]).unwrap();

            let mut inserted = 0;
            for _ in 0..repeats {
                let grant = ProfilePermission {
                    profile_id: profile.id,
                    permission_id: permission.id,
                    created_at: Utc::now(),
                };
                if store.grant(grant, note("grant")).unwrap() {
                    inserted += 1;
                }
            }
            prop_assert_eq!(inserted, 1);
            prop_assert_eq!(store.profile_permissions(profile.id).unwrap().len(), 1);
            prop_assert_eq!(incident_count(&store), 1);
        }
    }
}
