//! Session preferences kept outside the fetch/aggregate core: a remembered
//! token and per-repository list flags.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::github::RepoRef;

const TOKEN_KEY: &str = "gh_token";

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("Failed to access preference file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode preferences: {0}")]
    Json(#[from] serde_json::Error),
}

/// Minimal string key-value persistence.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), PrefsError>;
    fn remove(&mut self, key: &str) -> Result<(), PrefsError>;
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), PrefsError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PrefsError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if it doesn't exist yet. A file that is
    /// not a JSON object of strings is ignored and replaced on the next write.
    pub fn open(path: &Path) -> Result<Self, PrefsError> {
        let entries = if path.exists() {
            let raw = fs::read_to_string(path)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring unreadable preference file");
                BTreeMap::new()
            })
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    fn flush(&self) -> Result<(), PrefsError> {
        debug!(path = %self.path.display(), "writing preferences");
        fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), PrefsError> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), PrefsError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// Per-repository list state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoPreferences {
    pub completed: BTreeSet<u64>,
    pub deferred: BTreeSet<u64>,
    /// PR number → assigned reviewer login
    pub assigned: BTreeMap<u64, String>,
    pub show_closed: bool,
}

impl Default for RepoPreferences {
    fn default() -> Self {
        Self {
            completed: BTreeSet::new(),
            deferred: BTreeSet::new(),
            assigned: BTreeMap::new(),
            show_closed: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Done,
    Deferred,
    Clear,
}

impl RepoPreferences {
    /// Flags are exclusive: marking done clears deferred and vice versa.
    pub fn mark(&mut self, number: u64, mark: Mark) {
        self.completed.remove(&number);
        self.deferred.remove(&number);
        match mark {
            Mark::Done => {
                self.completed.insert(number);
            }
            Mark::Deferred => {
                self.deferred.insert(number);
            }
            Mark::Clear => {}
        }
    }
}

/// Typed view over a [`KeyValueStore`].
pub struct Preferences<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> Preferences<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn remembered_token(&self) -> Option<String> {
        self.store.get(TOKEN_KEY)
    }

    pub fn remember_token(&mut self, token: &str) -> Result<(), PrefsError> {
        self.store.set(TOKEN_KEY, token.to_string())
    }

    pub fn forget_token(&mut self) -> Result<(), PrefsError> {
        self.store.remove(TOKEN_KEY)
    }

    /// Preferences for `repo`; defaults when nothing (or something unreadable) is stored.
    pub fn repo(&self, repo: &RepoRef) -> RepoPreferences {
        self.load(&repo_key(repo)).unwrap_or_default()
    }

    pub fn save_repo(&mut self, repo: &RepoRef, prefs: &RepoPreferences) -> Result<(), PrefsError> {
        self.store.set(&repo_key(repo), serde_json::to_string(prefs)?)
    }

    /// Load, modify and save the preferences of one repository.
    pub fn update_repo<F>(&mut self, repo: &RepoRef, f: F) -> Result<RepoPreferences, PrefsError>
    where
        F: FnOnce(&mut RepoPreferences),
    {
        let mut prefs = self.repo(repo);
        f(&mut prefs);
        self.save_repo(repo, &prefs)?;
        Ok(prefs)
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, error = %e, "ignoring unreadable preference");
                None
            }
        }
    }
}

fn repo_key(repo: &RepoRef) -> String {
    format!("repo:{}/{}", repo.owner, repo.repo)
}
