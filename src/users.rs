use crate::error::{Result, RosterError};
use crate::models::{NewUser, Role, User};
use crate::roster::Roster;
use crate::storage::{self, Storage, SESSION_KEY};

pub(crate) fn check_user(user: &User) -> std::result::Result<(), String> {
    if user.name.trim().is_empty() {
        return Err("empty name".into());
    }
    if !user.email.contains('@') {
        return Err(format!("invalid email '{}'", user.email));
    }
    Ok(())
}

/// Accounts present on first run.
pub(crate) fn demo_users() -> Vec<User> {
    let user = |id, name: &str, email: &str, role, facility: &str| User {
        id,
        name: name.to_string(),
        email: email.to_string(),
        role,
        facility: Some(facility.to_string()),
        is_active: true,
    };
    vec![
        user(1, "Manager User", "manager@example.com", Role::Manager, "Central Hospital"),
        user(2, "Employee One", "employee1@example.com", Role::Employee, "Central Hospital"),
        user(3, "Employee Two", "employee2@example.com", Role::Employee, "East Health Center"),
    ]
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Fails if `users` no longer contains an active manager.
fn ensure_manager_remains(users: &[User]) -> Result<()> {
    if users.iter().any(User::is_active_manager) {
        Ok(())
    } else {
        Err(RosterError::LastManager)
    }
}

impl<S: Storage> Roster<S> {
    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn user(&self, id: u64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    /// The logged-in user, if any.
    pub fn current_user(&self) -> Option<&User> {
        self.require_user().ok()
    }

    /// Case-insensitive match on name, email or facility. An empty query
    /// returns everyone.
    pub fn search_users(&self, query: &str) -> Vec<&User> {
        let q = query.trim().to_lowercase();
        self.users
            .iter()
            .filter(|u| {
                q.is_empty()
                    || u.name.to_lowercase().contains(&q)
                    || u.email.to_lowercase().contains(&q)
                    || u.facility.as_deref().is_some_and(|f| f.to_lowercase().contains(&q))
            })
            .collect()
    }

    fn user_index(&self, id: u64) -> Result<usize> {
        self.users
            .iter()
            .position(|u| u.id == id)
            .ok_or(RosterError::UserNotFound(id))
    }

    fn insert_user(&mut self, data: NewUser) -> Result<User> {
        let name = data.name.trim();
        if name.is_empty() {
            return Err(RosterError::Validation("Name cannot be empty".into()));
        }
        let email = data.email.trim();
        if !email.contains('@') {
            return Err(RosterError::Validation(format!("Invalid email '{}'", email)));
        }
        let wanted = normalize_email(email);
        if self.users.iter().any(|u| normalize_email(&u.email) == wanted) {
            return Err(RosterError::DuplicateEmail(email.to_string()));
        }
        let user = User {
            id: self.users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
            name: name.to_string(),
            email: email.to_string(),
            role: data.role,
            facility: data.facility.map(|f| f.trim().to_string()).filter(|f| !f.is_empty()),
            is_active: true,
        };
        let mut users = self.users.clone();
        users.push(user.clone());
        self.commit_users(users)?;
        tracing::info!(user = user.id, role = %user.role, "user created");
        Ok(user)
    }

    /// Adds a user on behalf of the logged-in manager.
    pub fn create_user(&mut self, data: NewUser) -> Result<User> {
        self.require_manager()?;
        self.insert_user(data)
    }

    /// Self-service registration as an employee, followed by login.
    pub fn sign_up(&mut self, name: &str, email: &str, facility: Option<String>, password: &str) -> Result<User> {
        let user = self.insert_user(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            role: Role::Employee,
            facility,
        })?;
        self.login(&user.email, password)
    }

    pub fn update_user_role(&mut self, id: u64, role: Role) -> Result<User> {
        self.require_manager()?;
        let idx = self.user_index(id)?;
        let mut users = self.users.clone();
        users[idx].role = role;
        if self.users[idx].is_active_manager() {
            ensure_manager_remains(&users)?;
        }
        self.commit_users(users)?;
        tracing::info!(user = id, %role, "user role changed");
        Ok(self.users[idx].clone())
    }

    pub fn update_user_status(&mut self, id: u64, active: bool) -> Result<User> {
        self.require_manager()?;
        let idx = self.user_index(id)?;
        let mut users = self.users.clone();
        users[idx].is_active = active;
        if self.users[idx].is_active_manager() {
            ensure_manager_remains(&users)?;
        }
        self.commit_users(users)?;
        tracing::info!(user = id, active, "user status changed");
        Ok(self.users[idx].clone())
    }

    /// Deletes a user unless that would leave no active manager.
    pub fn delete_user(&mut self, id: u64) -> Result<User> {
        self.require_manager()?;
        let idx = self.user_index(id)?;
        let mut users = self.users.clone();
        let removed = users.remove(idx);
        if removed.role == Role::Manager {
            ensure_manager_remains(&users)?;
        }
        self.commit_users(users)?;
        tracing::info!(user = id, "user deleted");
        Ok(removed)
    }

    /// Starts a session for the active user with this email.
    ///
    /// The password is accepted as given; accounts carry no credential to
    /// check it against.
    pub fn login(&mut self, email: &str, password: &str) -> Result<User> {
        let wanted = normalize_email(email);
        let user = self
            .users
            .iter()
            .find(|u| u.is_active && normalize_email(&u.email) == wanted)
            .cloned()
            .ok_or(RosterError::InvalidCredentials)?;
        tracing::debug!(user = user.id, password_given = !password.is_empty(), "login");
        storage::save_json(&mut self.storage, SESSION_KEY, &user)?;
        self.session = Some(user.id);
        tracing::info!(user = user.id, "logged in");
        Ok(user)
    }

    pub fn logout(&mut self) -> Result<()> {
        self.storage.remove(SESSION_KEY)?;
        if let Some(id) = self.session.take() {
            tracing::info!(user = id, "logged out");
        }
        Ok(())
    }
}
