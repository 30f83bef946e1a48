use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use tollgate_auth::Role;
use tollgate_core::{ApplicationId, Origin, RegisteredApplication, RoleId, UserId};

use super::{
    ApplicationDirectory, ApplicationUpdate, DirectoryError, DirectoryResult, NewApplication, Page, PageRequest,
    RoleDirectory, UserDirectory, UserRecord,
};

/// Per-table id counter, starting at 1 like a BIGSERIAL.
#[derive(Debug, Default)]
struct Sequence(i64);

impl Sequence {
    fn next(&mut self) -> i64 {
        self.0 += 1;
        self.0
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    user_ids: Sequence,
    role_ids: Sequence,
    application_ids: Sequence,
    users: BTreeMap<UserId, UserRecord>,
    roles: BTreeMap<RoleId, Role>,
    assignments: BTreeSet<(UserId, RoleId)>,
    applications: BTreeMap<ApplicationId, RegisteredApplication>,
}

impl DirectoryState {
    fn role_id(&self, role: &Role) -> Option<RoleId> {
        self.roles
            .iter()
            .find(|(_, r)| *r == role)
            .map(|(id, _)| *id)
    }

    fn application_conflict(&self, skip: Option<ApplicationId>, site: &Origin, redirect: &str, key: Option<&str>) -> Option<String> {
        self.applications
            .values()
            .filter(|app| Some(app.id) != skip)
            .find_map(|app| {
                if &app.site == site {
                    Some(format!("site {site} already registered"))
                } else if app.redirect == redirect {
                    Some(format!("redirect {redirect} already registered"))
                } else if key.is_some_and(|k| app.app_key.expose() == k) {
                    Some("application key already registered".to_string())
                } else {
                    None
                }
            })
    }
}

/// In-memory directory holding users, roles and applications.
///
/// Intended for tests/dev. Starts with the `admin` role registered.
#[derive(Debug)]
pub struct InMemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        let mut state = DirectoryState::default();
        let id = RoleId::new(state.role_ids.next());
        state.roles.insert(id, Role::ADMIN);
        Self {
            state: RwLock::new(state),
        }
    }

    fn read(&self) -> DirectoryResult<RwLockReadGuard<'_, DirectoryState>> {
        self.state
            .read()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))
    }

    fn write(&self) -> DirectoryResult<RwLockWriteGuard<'_, DirectoryState>> {
        self.state
            .write()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))
    }
}

fn paginate<T: Clone>(matching: Vec<&T>, page: PageRequest) -> Page<T> {
    let total = matching.len() as u64;
    let items = matching
        .into_iter()
        .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
        .take(page.page_size as usize)
        .cloned()
        .collect();
    Page {
        request: page,
        total,
        items,
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn find_user(&self, id: UserId) -> DirectoryResult<Option<UserRecord>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_name(&self, username: &str) -> DirectoryResult<Option<UserRecord>> {
        Ok(self.read()?.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> DirectoryResult<UserRecord> {
        let mut state = self.write()?;
        if state.users.values().any(|u| u.username == username) {
            return Err(DirectoryError::Conflict(format!("username {username} already exists")));
        }
        let now = Utc::now();
        let record = UserRecord {
            id: UserId::new(state.user_ids.next()),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn rename_user(&self, id: UserId, username: &str) -> DirectoryResult<()> {
        let mut state = self.write()?;
        if state.users.values().any(|u| u.username == username && u.id != id) {
            return Err(DirectoryError::Conflict(format!("username {username} already exists")));
        }
        let user = state.users.get_mut(&id).ok_or(DirectoryError::NotFound)?;
        user.username = username.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_password_hash(&self, id: UserId, password_hash: &str) -> DirectoryResult<()> {
        let mut state = self.write()?;
        let user = state.users.get_mut(&id).ok_or(DirectoryError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> DirectoryResult<()> {
        let mut state = self.write()?;
        state.users.remove(&id).ok_or(DirectoryError::NotFound)?;
        state.assignments.retain(|(user, _)| *user != id);
        Ok(())
    }

    async fn list_users(&self, username_filter: Option<&str>, page: PageRequest) -> DirectoryResult<Page<UserRecord>> {
        let state = self.read()?;
        let matching = state
            .users
            .values()
            .filter(|u| username_filter.is_none_or(|f| u.username.contains(f)))
            .collect();
        Ok(paginate(matching, page))
    }
}

#[async_trait]
impl ApplicationDirectory for InMemoryDirectory {
    async fn applications_by_site(&self, site: &Origin) -> DirectoryResult<Vec<RegisteredApplication>> {
        Ok(self
            .read()?
            .applications
            .values()
            .filter(|app| &app.site == site)
            .cloned()
            .collect())
    }

    async fn applications_by_key(&self, app_key: &str) -> DirectoryResult<Vec<RegisteredApplication>> {
        Ok(self
            .read()?
            .applications
            .values()
            .filter(|app| app.app_key.expose() == app_key)
            .cloned()
            .collect())
    }

    async fn create_application(&self, new: NewApplication) -> DirectoryResult<RegisteredApplication> {
        let mut state = self.write()?;
        if let Some(conflict) = state.application_conflict(None, &new.site, &new.redirect, Some(new.app_key.expose())) {
            return Err(DirectoryError::Conflict(conflict));
        }
        let app = RegisteredApplication {
            id: ApplicationId::new(state.application_ids.next()),
            name: new.name,
            app_key: new.app_key,
            site: new.site,
            redirect: new.redirect,
        };
        state.applications.insert(app.id, app.clone());
        Ok(app)
    }

    async fn update_application(&self, update: ApplicationUpdate) -> DirectoryResult<()> {
        let mut state = self.write()?;
        if !state.applications.contains_key(&update.id) {
            return Err(DirectoryError::NotFound);
        }
        if let Some(conflict) = state.application_conflict(Some(update.id), &update.site, &update.redirect, None) {
            return Err(DirectoryError::Conflict(conflict));
        }
        let app = state.applications.get_mut(&update.id).ok_or(DirectoryError::NotFound)?;
        app.name = update.name;
        app.site = update.site;
        app.redirect = update.redirect;
        Ok(())
    }

    async fn delete_application(&self, id: ApplicationId) -> DirectoryResult<()> {
        self.write()?
            .applications
            .remove(&id)
            .map(|_| ())
            .ok_or(DirectoryError::NotFound)
    }

    async fn list_applications(
        &self,
        name_filter: Option<&str>,
        page: PageRequest,
    ) -> DirectoryResult<Page<RegisteredApplication>> {
        let state = self.read()?;
        let matching = state
            .applications
            .values()
            .filter(|app| name_filter.is_none_or(|f| app.name.contains(f)))
            .collect();
        Ok(paginate(matching, page))
    }
}

#[async_trait]
impl RoleDirectory for InMemoryDirectory {
    async fn roles_for_user(&self, user: UserId) -> DirectoryResult<Vec<Role>> {
        let state = self.read()?;
        Ok(state
            .assignments
            .iter()
            .filter(|(u, _)| *u == user)
            .filter_map(|(_, role_id)| state.roles.get(role_id).cloned())
            .collect())
    }

    async fn ensure_role(&self, role: &Role, _description: &str) -> DirectoryResult<RoleId> {
        let mut state = self.write()?;
        if let Some(id) = state.role_id(role) {
            return Ok(id);
        }
        let id = RoleId::new(state.role_ids.next());
        state.roles.insert(id, role.clone());
        Ok(id)
    }

    async fn grant_role(&self, user: UserId, role: &Role) -> DirectoryResult<()> {
        let mut state = self.write()?;
        if !state.users.contains_key(&user) {
            return Err(DirectoryError::NotFound);
        }
        let role_id = state.role_id(role).ok_or(DirectoryError::NotFound)?;
        state.assignments.insert((user, role_id));
        Ok(())
    }

    async fn revoke_role(&self, user: UserId, role: &Role) -> DirectoryResult<()> {
        let mut state = self.write()?;
        if let Some(role_id) = state.role_id(role) {
            state.assignments.remove(&(user, role_id));
        }
        Ok(())
    }
}
