use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;

use crate::config::AssignmentPolicy;
use crate::error::{Result, RosterError};
use crate::models::{NewTask, Role, Task, TaskDuration, TaskPatch, TaskStatus, User};
use crate::roster::Roster;
use crate::schedule;
use crate::storage::Storage;

/// Title given to batch lines that have none.
pub const UNTITLED_TASK: &str = "Untitled task";

/// One registrant picked by the deadline sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub task_id: u64,
    pub user_id: u64,
}

/// Shared start, deadline and duration for a batch of tasks.
#[derive(Debug, Clone)]
pub struct BatchDefaults {
    pub start_date: DateTime<Utc>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub duration: TaskDuration,
}

/// Schema check for stored tasks; failures drop the record on load.
pub(crate) fn check_task(task: &Task) -> std::result::Result<(), String> {
    if task.title.trim().is_empty() {
        return Err("empty title".into());
    }
    schedule::validate_duration(&task.duration).map_err(|e| e.to_string())?;
    schedule::end_date(task.start_date, &task.duration).map_err(|e| e.to_string())?;
    schedule::validate_deadline(task.registration_deadline, task.start_date).map_err(|e| e.to_string())?;
    match (task.status, task.assigned_to) {
        (TaskStatus::Pending, Some(_)) => Err("pending task already has an assignee".into()),
        (TaskStatus::Assigned | TaskStatus::Completed, None) => {
            Err(format!("{} task has no assignee", task.status))
        }
        _ => Ok(()),
    }
}

/// Repairs derivable fields of a stored task.
pub(crate) fn normalize_task(mut task: Task) -> Task {
    if let Ok(expected_end) = schedule::end_date(task.start_date, &task.duration) {
        if task.end_date != expected_end {
            tracing::warn!(task = task.id, "end date disagrees with duration, recomputing");
            task.end_date = expected_end;
        }
    }
    let mut seen = Vec::with_capacity(task.registered_employees.len());
    task.registered_employees.retain(|id| {
        if seen.contains(id) {
            false
        } else {
            seen.push(*id);
            true
        }
    });
    task
}

/// Splits batch input into `(title, description)` pairs.
///
/// One task per non-blank line, title and description separated by `|`.
pub fn parse_batch(input: &str) -> Vec<(String, String)> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut parts = line.splitn(2, '|').map(str::trim);
            let title = parts.next().filter(|t| !t.is_empty()).unwrap_or(UNTITLED_TASK);
            let description = parts.next().unwrap_or("");
            (title.to_string(), description.to_string())
        })
        .collect()
}

impl<S: Storage> Roster<S> {
    /// All tasks, in creation order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks relevant to the logged-in user.
    ///
    /// Managers see what they created; employees see what they are
    /// registered for or assigned to.
    pub fn user_tasks(&self) -> Result<Vec<&Task>> {
        let user = self.require_user()?;
        Ok(self
            .tasks
            .iter()
            .filter(|t| match user.role {
                Role::Manager => t.created_by == user.id,
                Role::Employee => t.assigned_to == Some(user.id) || t.is_registered(user.id),
            })
            .collect())
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.status == status).collect()
    }

    /// Tasks starting on `day` (local calendar).
    pub fn tasks_on(&self, day: NaiveDate) -> Vec<&Task> {
        self.tasks.iter().filter(|t| schedule::falls_on(t.start_date, day)).collect()
    }

    /// Users registered for a task, in registration order.
    pub fn registrants(&self, id: u64) -> Result<Vec<&User>> {
        let task = self.task(id).ok_or(RosterError::TaskNotFound(id))?;
        Ok(task
            .registered_employees
            .iter()
            .filter_map(|uid| self.users.iter().find(|u| u.id == *uid))
            .collect())
    }

    fn task_index(&self, id: u64) -> Result<usize> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(RosterError::TaskNotFound(id))
    }

    fn next_task_id(&self) -> u64 {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    /// Creates a pending task owned by the logged-in manager.
    ///
    /// The duration comes from `input.duration`, else from the gap between
    /// start and `input.end_date`, else the one hour default. The end date
    /// is always recomputed from start and duration.
    pub fn add_task(&mut self, input: NewTask) -> Result<Task> {
        let creator = self.require_manager()?.id;
        let task = self.build_task(input, self.next_task_id(), creator)?;
        let mut tasks = self.tasks.clone();
        tasks.push(task.clone());
        self.commit_tasks(tasks)?;
        tracing::info!(task = task.id, title = %task.title, "task created");
        self.refresh()?;
        Ok(task)
    }

    /// Validates `input` into a pending task without storing it.
    fn build_task(&self, input: NewTask, id: u64, creator: u64) -> Result<Task> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(RosterError::Validation("Task title cannot be empty".into()));
        }
        let duration = match (input.duration, input.end_date) {
            (Some(d), _) => d,
            (None, Some(end)) => schedule::duration_between(input.start_date, end)?,
            (None, None) => TaskDuration::default(),
        };
        schedule::validate_duration(&duration)?;
        let deadline = match input.registration_deadline {
            Some(deadline) => deadline,
            None => schedule::default_deadline(input.start_date, self.deadline_lead_days)?,
        };
        schedule::validate_deadline(deadline, input.start_date)?;

        Ok(Task {
            id,
            title: title.to_string(),
            description: input.description.trim().to_string(),
            start_date: input.start_date,
            end_date: schedule::end_date(input.start_date, &duration)?,
            duration,
            registration_deadline: deadline,
            created_by: creator,
            status: TaskStatus::Pending,
            assigned_to: None,
            registered_employees: Vec::new(),
        })
    }

    /// Creates one task per line of `input` (see [`parse_batch`]).
    ///
    /// All lines are validated first and written in one commit, so either
    /// every task is created or none is.
    pub fn add_tasks_batch(&mut self, input: &str, defaults: &BatchDefaults) -> Result<Vec<Task>> {
        let creator = self.require_manager()?.id;
        if input.trim().is_empty() {
            return Err(RosterError::Validation("Enter at least one task".into()));
        }
        let entries = parse_batch(input);
        if entries.is_empty() {
            return Err(RosterError::Validation(
                "No tasks found; use one 'title|description' per line".into(),
            ));
        }
        schedule::validate_duration(&defaults.duration)?;
        if let Some(deadline) = defaults.registration_deadline {
            schedule::validate_deadline(deadline, defaults.start_date)?;
        }

        let first_id = self.next_task_id();
        let mut created = Vec::with_capacity(entries.len());
        for (offset, (title, description)) in entries.into_iter().enumerate() {
            let input = NewTask {
                title,
                description,
                start_date: defaults.start_date,
                end_date: None,
                duration: Some(defaults.duration),
                registration_deadline: defaults.registration_deadline,
            };
            created.push(self.build_task(input, first_id + offset as u64, creator)?);
        }
        let mut tasks = self.tasks.clone();
        tasks.extend(created.iter().cloned());
        self.commit_tasks(tasks)?;
        tracing::info!(count = created.len(), "batch of tasks created");
        self.refresh()?;
        Ok(created)
    }

    /// Applies `patch` to task `id`, then runs the deadline sweep.
    ///
    /// Field edits and assignment need a manager; completion needs the
    /// assignee. The end date is recomputed and the deadline re-checked
    /// against the (possibly new) start.
    pub fn update_task(&mut self, id: u64, patch: TaskPatch) -> Result<Task> {
        let actor = self.require_user()?.clone();
        let idx = self.task_index(id)?;
        let mut task = self.tasks[idx].clone();

        let edits_fields = patch.title.is_some()
            || patch.description.is_some()
            || patch.start_date.is_some()
            || patch.duration.is_some()
            || patch.registration_deadline.is_some();
        if edits_fields && actor.role != Role::Manager {
            return Err(RosterError::Forbidden("a manager"));
        }

        if let Some(title) = patch.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(RosterError::Validation("Task title cannot be empty".into()));
            }
            task.title = title.to_string();
        }
        if let Some(description) = patch.description {
            task.description = description.trim().to_string();
        }
        if let Some(start) = patch.start_date {
            task.start_date = start;
        }
        if let Some(duration) = patch.duration {
            schedule::validate_duration(&duration)?;
            task.duration = duration;
        }
        if let Some(deadline) = patch.registration_deadline {
            task.registration_deadline = deadline;
        }
        task.end_date = schedule::end_date(task.start_date, &task.duration)?;
        schedule::validate_deadline(task.registration_deadline, task.start_date)?;

        let target = match (patch.status, patch.assigned_to) {
            (Some(status), _) => Some(status),
            (None, Some(_)) => Some(TaskStatus::Assigned),
            (None, None) => None,
        };
        if let Some(user) = patch.assigned_to.filter(|u| task.assigned_to != Some(*u)) {
            if !self.is_active_user(user) {
                return Err(RosterError::UserNotFound(user));
            }
        }
        if let Some(target) = target {
            transition(&mut task, target, patch.assigned_to, &actor)?;
        }

        let mut tasks = self.tasks.clone();
        tasks[idx] = task;
        self.commit_tasks(tasks)?;
        tracing::info!(task = id, "task updated");
        self.refresh()?;
        Ok(self.tasks[idx].clone())
    }

    /// Manually assigns a pending task to one of its registrants.
    pub fn assign_task(&mut self, id: u64, user_id: u64) -> Result<Task> {
        self.update_task(
            id,
            TaskPatch {
                status: Some(TaskStatus::Assigned),
                assigned_to: Some(user_id),
                ..TaskPatch::default()
            },
        )
    }

    /// Marks an assigned task done; only its assignee may do this.
    pub fn complete_task(&mut self, id: u64) -> Result<Task> {
        self.update_task(
            id,
            TaskPatch {
                status: Some(TaskStatus::Completed),
                ..TaskPatch::default()
            },
        )
    }

    /// Removes a task.
    pub fn delete_task(&mut self, id: u64) -> Result<Task> {
        self.require_manager()?;
        let idx = self.task_index(id)?;
        let mut tasks = self.tasks.clone();
        let removed = tasks.remove(idx);
        self.commit_tasks(tasks)?;
        tracing::info!(task = id, "task deleted");
        self.refresh()?;
        Ok(removed)
    }

    /// Adds the logged-in user to the task's registrants.
    ///
    /// Registering twice is a no-op. Registration is refused once the task
    /// has left pending or its deadline has passed.
    pub fn register_for_task(&mut self, id: u64) -> Result<Task> {
        let user_id = self.require_user()?.id;
        self.refresh()?;
        let idx = self.task_index(id)?;
        if self.tasks[idx].is_registered(user_id) {
            return Ok(self.tasks[idx].clone());
        }
        if !self.tasks[idx].accepts_registrations(Utc::now()) {
            return Err(RosterError::RegistrationClosed(id));
        }
        let mut tasks = self.tasks.clone();
        tasks[idx].registered_employees.push(user_id);
        self.commit_tasks(tasks)?;
        tracing::info!(task = id, user = user_id, "registered for task");
        Ok(self.tasks[idx].clone())
    }

    /// Removes the logged-in user from the task's registrants.
    pub fn unregister_from_task(&mut self, id: u64) -> Result<Task> {
        let user_id = self.require_user()?.id;
        let idx = self.task_index(id)?;
        if !self.tasks[idx].is_registered(user_id) {
            return Ok(self.tasks[idx].clone());
        }
        let mut tasks = self.tasks.clone();
        tasks[idx].registered_employees.retain(|u| *u != user_id);
        self.commit_tasks(tasks)?;
        tracing::info!(task = id, user = user_id, "unregistered from task");
        self.refresh()?;
        Ok(self.tasks[idx].clone())
    }

    /// Runs the deadline sweep against the current time.
    pub fn refresh(&mut self) -> Result<Vec<Assignment>> {
        self.sweep_deadlines(Utc::now())
    }

    fn is_active_user(&self, id: u64) -> bool {
        self.users.iter().any(|u| u.id == id && u.is_active)
    }

    /// Assigns every pending, unassigned task whose registration deadline
    /// is before `now` and that has at least one registrant.
    ///
    /// Registrants that were deleted or deactivated are passed over; a task
    /// with none left stays pending.
    pub fn sweep_deadlines(&mut self, now: DateTime<Utc>) -> Result<Vec<Assignment>> {
        let mut tasks = self.tasks.clone();
        let mut made = Vec::new();
        for task in tasks.iter_mut() {
            if task.status != TaskStatus::Pending
                || task.assigned_to.is_some()
                || !schedule::deadline_passed(task.registration_deadline, now)
            {
                continue;
            }
            let candidates: Vec<u64> = task
                .registered_employees
                .iter()
                .copied()
                .filter(|id| self.is_active_user(*id))
                .collect();
            let picked = match self.assignment {
                AssignmentPolicy::Random => candidates.choose(&mut self.rng),
                AssignmentPolicy::FirstRegistered => candidates.first(),
            };
            let Some(&user_id) = picked else {
                continue;
            };
            task.assigned_to = Some(user_id);
            task.status = TaskStatus::Assigned;
            tracing::info!(task = task.id, user = user_id, "registration closed, task auto-assigned");
            made.push(Assignment { task_id: task.id, user_id });
        }
        tracing::debug!(assigned = made.len(), "deadline sweep finished");
        if !made.is_empty() {
            self.commit_tasks(tasks)?;
        }
        Ok(made)
    }
}

/// Moves `task` to `target`, enforcing the one-way lifecycle.
fn transition(task: &mut Task, target: TaskStatus, assignee: Option<u64>, actor: &User) -> Result<()> {
    if target == task.status && assignee.map_or(true, |a| task.assigned_to == Some(a)) {
        return Ok(());
    }
    if !task.status.can_become(target) {
        return Err(RosterError::InvalidTransition {
            task: task.id,
            from: task.status,
            to: target,
        });
    }
    match target {
        TaskStatus::Assigned => {
            if actor.role != Role::Manager {
                return Err(RosterError::Forbidden("a manager"));
            }
            let user = assignee
                .ok_or_else(|| RosterError::Validation("Choose a registrant to assign".into()))?;
            if !task.is_registered(user) {
                return Err(RosterError::NotRegistered { task: task.id, user });
            }
            task.assigned_to = Some(user);
        }
        TaskStatus::Completed => {
            if task.assigned_to != Some(actor.id) {
                return Err(RosterError::Forbidden("the assignee"));
            }
        }
        TaskStatus::Pending => {}
    }
    task.status = target;
    Ok(())
}
