use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{AssignmentPolicy, Config};
use crate::error::{Result, RosterError};
use crate::models::{Role, Task, Template, User};
use crate::storage::{self, Storage, SESSION_KEY, TASKS_KEY, TEMPLATES_KEY, USERS_KEY};

/// The scheduling service: users, session, tasks and templates over one
/// injected [`Storage`].
///
/// Operations live next to the data they touch: task lifecycle in
/// `tasks.rs`, templates in `templates.rs`, users and login in `users.rs`.
/// Every mutation writes the affected collection back to storage before it
/// becomes visible in memory, so a failed write leaves both unchanged.
pub struct Roster<S: Storage> {
    pub(crate) storage: S,
    pub(crate) users: Vec<User>,
    pub(crate) session: Option<u64>,
    pub(crate) tasks: Vec<Task>,
    pub(crate) templates: BTreeMap<String, Template>,
    pub(crate) assignment: AssignmentPolicy,
    pub(crate) deadline_lead_days: i64,
    pub(crate) rng: StdRng,
}

impl<S: Storage> Roster<S> {
    /// Loads all state from `storage`, seeding demo users on first run,
    /// then runs the deadline sweep once.
    pub fn open(storage: S, config: &Config) -> Result<Self> {
        let users = match storage::load_records(&storage, USERS_KEY, crate::users::check_user)? {
            Some(users) if users.iter().any(User::is_active_manager) => users,
            Some(_) => {
                tracing::warn!("stored users have no active manager, reseeding demo accounts");
                crate::users::demo_users()
            }
            None => crate::users::demo_users(),
        };

        let session = storage::load_json::<S, User>(&storage, SESSION_KEY)?
            .and_then(|saved| users.iter().find(|u| u.id == saved.id && u.is_active))
            .map(|u| u.id);

        let tasks: Vec<Task> = storage::load_records(&storage, TASKS_KEY, crate::tasks::check_task)?
            .unwrap_or_default()
            .into_iter()
            .map(crate::tasks::normalize_task)
            .collect();

        let templates = storage::load_map(&storage, TEMPLATES_KEY, crate::templates::check_template)?;

        let mut roster = Roster {
            storage,
            users,
            session,
            tasks,
            templates,
            assignment: config.assignment,
            deadline_lead_days: config.deadline_lead_days,
            rng: StdRng::from_entropy(),
        };
        storage::save_json(&mut roster.storage, USERS_KEY, &roster.users)?;
        roster.refresh()?;
        Ok(roster)
    }

    /// Replaces the random source with a seeded one.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn assignment_policy(&self) -> AssignmentPolicy {
        self.assignment
    }

    pub fn set_assignment_policy(&mut self, policy: AssignmentPolicy) {
        self.assignment = policy;
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Gives the storage back, e.g. to reopen a roster on the same data.
    pub fn into_storage(self) -> S {
        self.storage
    }

    pub(crate) fn require_user(&self) -> Result<&User> {
        self.session
            .and_then(|id| self.users.iter().find(|u| u.id == id))
            .ok_or(RosterError::NotLoggedIn)
    }

    pub(crate) fn require_manager(&self) -> Result<&User> {
        let user = self.require_user()?;
        if user.role != Role::Manager {
            return Err(RosterError::Forbidden("a manager"));
        }
        Ok(user)
    }

    pub(crate) fn commit_tasks(&mut self, tasks: Vec<Task>) -> Result<()> {
        storage::save_json(&mut self.storage, TASKS_KEY, &tasks)?;
        self.tasks = tasks;
        Ok(())
    }

    pub(crate) fn commit_users(&mut self, users: Vec<User>) -> Result<()> {
        storage::save_json(&mut self.storage, USERS_KEY, &users)?;
        self.users = users;
        let Some(id) = self.session else {
            return Ok(());
        };
        // A session survives only while its user exists and is active.
        match self.users.iter().find(|u| u.id == id && u.is_active).cloned() {
            Some(current) => storage::save_json(&mut self.storage, SESSION_KEY, &current)?,
            None => {
                tracing::info!(user = id, "session ended, user removed or deactivated");
                self.session = None;
                self.storage.remove(SESSION_KEY)?;
            }
        }
        Ok(())
    }

    pub(crate) fn commit_templates(&mut self, templates: BTreeMap<String, Template>) -> Result<()> {
        storage::save_json(&mut self.storage, TEMPLATES_KEY, &templates)?;
        self.templates = templates;
        Ok(())
    }
}
