use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StorageError;

/// Key holding the logged-in user.
pub const SESSION_KEY: &str = "user";
/// Key holding the full user list.
pub const USERS_KEY: &str = "users";
/// Key holding the full task list.
pub const TASKS_KEY: &str = "tasks";
/// Key holding the template map.
pub const TEMPLATES_KEY: &str = "taskTemplates";

/// Flat key/value store of JSON strings.
pub trait Storage {
    /// Returns `None` when the key has never been written.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// Keeps each key as `<key>.json` inside one directory.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    /// Opens (creating if needed) the data directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
                key: dir.display().to_string(),
                source,
            })?;
        }
        Ok(JsonFileStorage { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Deletes every known key from disk.
    pub fn wipe(&mut self) -> Result<(), StorageError> {
        for key in [SESSION_KEY, USERS_KEY, TASKS_KEY, TEMPLATES_KEY] {
            self.remove(key)?;
        }
        Ok(())
    }
}

impl Storage for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let io_err = |source| StorageError::Io { key: key.to_string(), source };
        let mut f = OpenOptions::new().read(true).open(&path).map_err(io_err)?;
        let mut s = String::new();
        f.read_to_string(&mut s).map_err(io_err)?;
        Ok(Some(s))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io { key: key.to_string(), source };
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.path_for(key))
            .map_err(io_err)?;
        f.write_all(value.as_bytes()).map_err(io_err)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { key: key.to_string(), source }),
        }
    }
}

/// Process-local storage, used by tests and throwaway sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Serializes `value` as pretty JSON under `key`.
pub fn save_json<S: Storage + ?Sized, T: Serialize + ?Sized>(
    storage: &mut S,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let s = serde_json::to_string_pretty(value).map_err(|source| StorageError::Json {
        key: key.to_string(),
        source,
    })?;
    storage.set(key, &s)
}

/// Loads a single JSON value stored under `key`.
///
/// Returns `Ok(None)` when the key is absent or holds something that no
/// longer matches `T`; the latter is logged and treated as absent.
pub fn load_json<S: Storage + ?Sized, T: DeserializeOwned>(
    storage: &S,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = storage.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            tracing::warn!(key, error = %e, "ignoring malformed stored value");
            Ok(None)
        }
    }
}

/// Loads a JSON array record by record.
///
/// Entries that do not deserialize into `T`, or that `check` rejects, are
/// dropped with a warning so one bad record cannot hide the rest. A value
/// that is not an array at all yields `Ok(None)`.
pub fn load_records<S, T, F>(storage: &S, key: &str, check: F) -> Result<Option<Vec<T>>, StorageError>
where
    S: Storage + ?Sized,
    T: DeserializeOwned,
    F: Fn(&T) -> Result<(), String>,
{
    let Some(raw) = load_json::<S, Value>(storage, key)? else {
        return Ok(None);
    };
    let Value::Array(items) = raw else {
        tracing::warn!(key, "expected a JSON array, ignoring stored value");
        return Ok(None);
    };
    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let parsed = serde_json::from_value::<T>(item)
            .map_err(|e| e.to_string())
            .and_then(|record| check(&record).map(|()| record));
        match parsed {
            Ok(record) => records.push(record),
            Err(reason) => tracing::warn!(key, index, %reason, "dropping malformed record"),
        }
    }
    Ok(Some(records))
}

/// Loads a JSON object as a name-keyed map, dropping bad entries.
pub fn load_map<S, T, F>(storage: &S, key: &str, check: F) -> Result<BTreeMap<String, T>, StorageError>
where
    S: Storage + ?Sized,
    T: DeserializeOwned,
    F: Fn(&str, &T) -> Result<(), String>,
{
    let Some(raw) = load_json::<S, Value>(storage, key)? else {
        return Ok(BTreeMap::new());
    };
    let Value::Object(entries) = raw else {
        tracing::warn!(key, "expected a JSON object, ignoring stored value");
        return Ok(BTreeMap::new());
    };
    let mut map = BTreeMap::new();
    for (name, item) in entries {
        let parsed = serde_json::from_value::<T>(item)
            .map_err(|e| e.to_string())
            .and_then(|record| check(&name, &record).map(|()| record));
        match parsed {
            Ok(record) => {
                map.insert(name, record);
            }
            Err(reason) => tracing::warn!(key, entry = %name, %reason, "dropping malformed entry"),
        }
    }
    Ok(map)
}
