use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a user is allowed to do.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Creates, edits and deletes tasks; manages users.
    Manager,
    /// Registers for open tasks and completes assigned ones.
    Employee,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Manager => write!(f, "manager"),
            Role::Employee => write!(f, "employee"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manager" => Ok(Role::Manager),
            "employee" => Ok(Role::Employee),
            other => Err(format!("Unknown role '{}'. Use manager or employee.", other)),
        }
    }
}

/// A member of facility staff.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier for the user.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Login email, unique across users (case-insensitive).
    pub email: String,
    pub role: Role,
    /// Hospital or health center the user works at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility: Option<String>,
    /// Inactive users cannot log in.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl User {
    pub fn is_active_manager(&self) -> bool {
        self.is_active && self.role == Role::Manager
    }
}

/// Data for a user that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub facility: Option<String>,
}

/// Lifecycle of a task. Only ever moves forward.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Completed,
}

impl TaskStatus {
    /// Position in the lifecycle; transitions must strictly increase it.
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Assigned => 1,
            TaskStatus::Completed => 2,
        }
    }

    /// Whether `self -> next` is a legal single step.
    pub fn can_become(self, next: TaskStatus) -> bool {
        next.rank() == self.rank() + 1
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Assigned => write!(f, "assigned"),
            TaskStatus::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "assigned" => Ok(TaskStatus::Assigned),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!(
                "Unknown status '{}'. Use pending, assigned or completed.",
                other
            )),
        }
    }
}

/// Length of a task as whole hours and minutes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDuration {
    pub hours: u32,
    pub minutes: u32,
}

impl Default for TaskDuration {
    fn default() -> Self {
        TaskDuration { hours: 1, minutes: 0 }
    }
}

impl TaskDuration {
    pub fn new(hours: u32, minutes: u32) -> Self {
        TaskDuration { hours, minutes }
    }

    pub fn total_minutes(&self) -> i64 {
        i64::from(self.hours) * 60 + i64::from(self.minutes)
    }
}

impl fmt::Display for TaskDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h {:02}m", self.hours, self.minutes)
    }
}

/// A unit of work employees can register for.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_date: DateTime<Utc>,
    /// Always `start_date + duration`.
    pub end_date: DateTime<Utc>,
    pub duration: TaskDuration,
    /// No registrations are accepted after this instant.
    pub registration_deadline: DateTime<Utc>,
    /// Id of the manager who created the task.
    pub created_by: u64,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<u64>,
    /// Registrant ids in registration order, without duplicates.
    #[serde(default)]
    pub registered_employees: Vec<u64>,
}

impl Task {
    pub fn is_registered(&self, user_id: u64) -> bool {
        self.registered_employees.contains(&user_id)
    }

    /// Registration is open while pending and before the deadline.
    pub fn accepts_registrations(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && now <= self.registration_deadline
    }
}

/// Input for creating a task.
///
/// Either `end_date` or `duration` may be supplied; when both are, the
/// duration wins and the end is recomputed.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub duration: Option<TaskDuration>,
    /// Defaults to a fixed lead time before the start.
    pub registration_deadline: Option<DateTime<Utc>>,
}

/// Partial update for an existing task. `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub duration: Option<TaskDuration>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<u64>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.start_date.is_none()
            && self.duration.is_none()
            && self.registration_deadline.is_none()
            && self.status.is_none()
            && self.assigned_to.is_none()
    }
}

/// A reusable set of task defaults, keyed by name in the template map.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: TaskDuration,
}
