use thiserror::Error;

use crate::models::TaskStatus;

/// Failures of the flat key/value backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON under '{key}': {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Every way a roster operation can be refused.
///
/// All of these are recoverable: the caller reports the message and the
/// user tries again. A failed operation leaves the roster unchanged.
#[derive(Error, Debug)]
pub enum RosterError {
    /// Input failed a field-level check (empty title, bad duration, ...).
    #[error("{0}")]
    Validation(String),

    #[error("Registration deadline {deadline} is after the start {start}")]
    DeadlineAfterStart { deadline: String, start: String },

    #[error("Task {0} not found")]
    TaskNotFound(u64),

    #[error("User {0} not found")]
    UserNotFound(u64),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Only {0} may do this")]
    Forbidden(&'static str),

    #[error("Registration for task {0} is closed")]
    RegistrationClosed(u64),

    #[error("User {user} is not registered for task {task}")]
    NotRegistered { task: u64, user: u64 },

    #[error("Task {task} cannot go from {from} to {to}")]
    InvalidTransition {
        task: u64,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Email '{0}' is already in use")]
    DuplicateEmail(String),

    #[error("At least one active manager must remain")]
    LastManager,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, RosterError>;
