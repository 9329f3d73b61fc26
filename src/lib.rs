//! Task scheduling and registration for facility staff.
//!
//! Managers publish tasks with a start, a duration and a registration
//! deadline; employees register for open tasks; once a deadline passes the
//! roster assigns one registrant. All state sits in a [`Roster`] over an
//! injected [`Storage`] and is written back after every change.

pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod roster;
pub mod schedule;
pub mod storage;
pub mod tasks;
pub mod templates;
pub mod users;

pub use config::{AssignmentPolicy, Config};
pub use error::{Result, RosterError, StorageError};
pub use roster::Roster;
pub use storage::{JsonFileStorage, MemoryStorage, Storage};
pub use tasks::{Assignment, BatchDefaults};
