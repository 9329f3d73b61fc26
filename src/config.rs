use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, RosterError};
use crate::schedule::{DEFAULT_DEADLINE_LEAD_DAYS, MAX_DEADLINE_LEAD_DAYS};

/// How the deadline sweep picks one registrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignmentPolicy {
    /// Uniformly random index into the registrant list.
    #[default]
    Random,
    /// Whoever registered first.
    FirstRegistered,
}

impl FromStr for AssignmentPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "random" => Ok(AssignmentPolicy::Random),
            "first" | "first-registered" => Ok(AssignmentPolicy::FirstRegistered),
            other => Err(format!("Unknown assignment policy '{}'. Use random or first.", other)),
        }
    }
}

/// Runtime settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the `*.json` key files.
    pub data_dir: PathBuf,
    pub assignment: AssignmentPolicy,
    /// Default gap between registration deadline and start.
    pub deadline_lead_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: default_data_dir(),
            assignment: AssignmentPolicy::default(),
            deadline_lead_days: DEFAULT_DEADLINE_LEAD_DAYS,
        }
    }
}

impl Config {
    /// Reads overrides from the environment.
    ///
    /// - `TASKROSTER_DATA`: data directory.
    /// - `TASKROSTER_ASSIGNMENT`: `random` or `first`.
    /// - `TASKROSTER_DEADLINE_LEAD_DAYS`: whole days, 0 to 3650.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        if let Ok(dir) = std::env::var("TASKROSTER_DATA") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(policy) = std::env::var("TASKROSTER_ASSIGNMENT") {
            config.assignment = policy.parse().map_err(RosterError::Config)?;
        }
        if let Ok(days) = std::env::var("TASKROSTER_DEADLINE_LEAD_DAYS") {
            config.deadline_lead_days = match days.trim().parse::<i64>() {
                Ok(d) if (0..=MAX_DEADLINE_LEAD_DAYS).contains(&d) => d,
                _ => {
                    return Err(RosterError::Config(format!(
                        "TASKROSTER_DEADLINE_LEAD_DAYS must be a whole number from 0 to {}, got '{}'",
                        MAX_DEADLINE_LEAD_DAYS, days
                    )))
                }
            };
        }
        Ok(config)
    }
}

/// `~/.local/share/taskroster` on Linux, `./taskroster` if there is no
/// local data directory.
fn default_data_dir() -> PathBuf {
    let mut p = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    p.push("taskroster");
    p
}
