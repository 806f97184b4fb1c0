use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::auth::Identity;

/// Session accrual constants. The tick cadence and the per-tick increments
/// only drive the live display; `xp_per_minute` is what a stopped session
/// actually earns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    pub tick_interval_ms: u64,
    pub minutes_per_tick: f64,
    pub xp_per_tick: f64,
    pub xp_per_minute: f64,
    /// Sessions shorter than this are dropped without a write.
    pub min_session_minutes: f64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 6_000,
            minutes_per_tick: 0.1,
            xp_per_tick: 1.0,
            xp_per_minute: 10.0,
            min_session_minutes: 0.1,
        }
    }
}

impl TimerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub database_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_file: "studyxp.sqlite3".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    timer: TimerSettings,
    storage: StorageSettings,
    identity: Option<Identity>,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn timer(&self) -> TimerSettings {
        self.read().timer.clone()
    }

    pub fn storage(&self) -> StorageSettings {
        self.read().storage.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.read().identity.clone()
    }

    pub fn update_identity(&self, identity: Identity) -> Result<()> {
        let mut guard = self.write();
        guard.identity = Some(identity);
        self.persist(&guard)
    }

    /// The stored identity, generating and saving one on first launch.
    pub fn local_identity(&self) -> Result<Identity> {
        if let Some(identity) = self.identity() {
            return Ok(identity);
        }
        let identity = Identity::generate(None);
        self.update_identity(identity.clone())?;
        Ok(identity)
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.timer(), TimerSettings::default());
        assert_eq!(store.storage().backend, StorageBackend::Sqlite);
        assert!(store.identity().is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "timer": { "tick_interval_ms": 1000 }, "storage": { "backend": "memory" } }"#)
            .unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.timer().tick_interval(), Duration::from_secs(1));
        assert_eq!(store.timer().xp_per_minute, 10.0);
        assert_eq!(store.storage().backend, StorageBackend::Memory);
        assert_eq!(store.storage().database_file, "studyxp.sqlite3");
    }

    #[test]
    fn local_identity_is_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let first = SettingsStore::new(path.clone()).unwrap().local_identity().unwrap();
        let second = SettingsStore::new(path).unwrap().local_identity().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.timer(), TimerSettings::default());
    }
}
