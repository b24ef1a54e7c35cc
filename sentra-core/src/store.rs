//! JSON-backed config stores for alert rules and health checks.
//!
//! Both stores share one file-backed backbone: pretty-printed JSON under a
//! single top-level key, mutated under an exclusive lock, with the
//! in-memory set rolled back whenever the disk write fails so callers
//! observe create/update/delete atomically.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sentra_model::{AlertRule, HealthCheck, HealthCheckKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::watchdog::RemediationAction;

/// Upper bound on entries per store.
pub const MAX_ENTRIES: usize = 50;

pub trait StoreEntry: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Top-level key in the JSON document (`rules`, `checks`).
    const FILE_KEY: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    /// Fill unset optional fields with their documented defaults.
    fn apply_defaults(&mut self);
    fn validate(&self) -> Result<()>;
}

#[derive(Debug)]
pub struct JsonStore<T> {
    path: PathBuf,
    entries: Mutex<Vec<T>>,
}

impl<T: StoreEntry> JsonStore<T> {
    /// Open the store, reading the backing file. A missing file is an
    /// empty store; malformed content is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => {
                let mut doc: HashMap<String, Vec<T>> = serde_json::from_str(&raw)?;
                doc.remove(T::FILE_KEY).unwrap_or_default()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        info!(path = %path.display(), count = entries.len(), "store loaded");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn all(&self) -> Vec<T> {
        self.entries.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.entries.lock().iter().find(|e| e.id() == id).cloned()
    }

    /// Insert a new entry. Assigns an id when empty, applies defaults and
    /// validates before anything is stored.
    pub fn create(&self, mut entry: T) -> Result<T> {
        if entry.id().is_empty() {
            entry.set_id(Uuid::new_v4().to_string());
        }
        entry.apply_defaults();
        entry.validate()?;

        let mut entries = self.entries.lock();
        if entries.len() >= MAX_ENTRIES {
            return Err(CoreError::LimitExceeded(MAX_ENTRIES));
        }
        if entries.iter().any(|e| e.id() == entry.id()) {
            return Err(CoreError::Duplicate(entry.id().to_string()));
        }
        entries.push(entry.clone());
        if let Err(err) = self.persist(&entries) {
            entries.pop();
            return Err(err);
        }
        debug!(id = %entry.id(), "store entry created");
        Ok(entry)
    }

    pub fn update(&self, mut entry: T) -> Result<T> {
        entry.apply_defaults();
        entry.validate()?;

        let mut entries = self.entries.lock();
        let idx = entries
            .iter()
            .position(|e| e.id() == entry.id())
            .ok_or_else(|| CoreError::NotFound(entry.id().to_string()))?;
        let previous = std::mem::replace(&mut entries[idx], entry.clone());
        if let Err(err) = self.persist(&entries) {
            entries[idx] = previous;
            return Err(err);
        }
        Ok(entry)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        let idx = entries
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        let removed = entries.remove(idx);
        if let Err(err) = self.persist(&entries) {
            entries.insert(idx, removed);
            return Err(err);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &[T]) -> Result<()> {
        let mut doc = serde_json::Map::new();
        doc.insert(T::FILE_KEY.to_string(), serde_json::to_value(entries)?);
        let raw = serde_json::to_string_pretty(&doc)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, raw)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl StoreEntry for AlertRule {
    const FILE_KEY: &'static str = "rules";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn apply_defaults(&mut self) {
        if self.cooldown_minutes == 0 {
            self.cooldown_minutes = 5;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Invalid {
                what: "alert rule",
                reason: "name must not be empty".into(),
            });
        }
        crate::alert::expr::parse(&self.expression)
            .map_err(|err| CoreError::Expression(err.to_string()))?;
        Ok(())
    }
}

impl StoreEntry for HealthCheck {
    const FILE_KEY: &'static str = "checks";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn apply_defaults(&mut self) {
        if self.interval_secs == 0 {
            self.interval_secs = 30;
        }
        if self.timeout_secs == 0 {
            self.timeout_secs = 5;
        }
        if self.kind == HealthCheckKind::Http && self.success_code.is_none() {
            self.success_code = Some(200);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Invalid {
                what: "health check",
                reason: "name must not be empty".into(),
            });
        }
        if self.target.trim().is_empty() {
            return Err(CoreError::Invalid {
                what: "health check",
                reason: "target must not be empty".into(),
            });
        }
        if self.interval_secs < 10 {
            return Err(CoreError::Invalid {
                what: "health check",
                reason: format!("interval {}s below the 10s minimum", self.interval_secs),
            });
        }
        if !self.on_fail.is_empty() && RemediationAction::parse(&self.on_fail).is_none() {
            return Err(CoreError::Invalid {
                what: "health check",
                reason: format!("unrecognised on_fail action {:?}", self.on_fail),
            });
        }
        Ok(())
    }
}

/// Alert rules, persisted in `alerts.json` as `{"rules": [...]}`.
pub type AlertRuleStore = JsonStore<AlertRule>;

/// Health checks, persisted in `healthchecks.json` as `{"checks": [...]}`.
pub type HealthCheckStore = JsonStore<HealthCheck>;

pub fn alert_rules_path(config_dir: &Path) -> PathBuf {
    config_dir.join("alerts.json")
}

pub fn health_checks_path(config_dir: &Path) -> PathBuf {
    config_dir.join("healthchecks.json")
}

#[cfg(test)]
mod tests {
    use sentra_model::AlertSeverity;

    use super::*;

    fn rule(name: &str) -> AlertRule {
        AlertRule {
            id: String::new(),
            name: name.to_string(),
            expression: "CPU > 90".to_string(),
            duration_secs: 0,
            severity: AlertSeverity::Warning,
            channels: vec![],
            enabled: true,
            cooldown_minutes: 0,
        }
    }

    #[test]
    fn test_create_get_roundtrip_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertRuleStore::open(alert_rules_path(dir.path())).unwrap();
        let created = store.create(rule("high cpu")).unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(created.cooldown_minutes, 5);

        let fetched = store.get(&created.id).unwrap();
        assert_eq!(fetched.name, created.name);
        assert_eq!(fetched.cooldown_minutes, 5);
    }

    #[test]
    fn test_create_delete_get_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertRuleStore::open(alert_rules_path(dir.path())).unwrap();
        let created = store.create(rule("r")).unwrap();
        store.delete(&created.id).unwrap();
        assert!(store.get(&created.id).is_none());
        assert!(matches!(
            store.delete(&created.id),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_reload_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = alert_rules_path(dir.path());
        {
            let store = AlertRuleStore::open(&path).unwrap();
            store.create(rule("persisted")).unwrap();
        }
        let reopened = AlertRuleStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.all()[0].name, "persisted");
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertRuleStore::open(dir.path().join("nope.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.json");
        fs::write(&path, "{not json").unwrap();
        assert!(AlertRuleStore::open(&path).is_err());
    }

    #[test]
    fn test_limit_enforced_at_fifty() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertRuleStore::open(alert_rules_path(dir.path())).unwrap();
        for n in 0..MAX_ENTRIES {
            store.create(rule(&format!("rule {n}"))).unwrap();
        }
        assert_eq!(store.len(), 50);
        assert!(matches!(
            store.create(rule("one too many")),
            Err(CoreError::LimitExceeded(50))
        ));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertRuleStore::open(alert_rules_path(dir.path())).unwrap();
        let mut a = rule("a");
        a.id = "same".into();
        store.create(a).unwrap();
        let mut b = rule("b");
        b.id = "same".into();
        assert!(matches!(store.create(b), Err(CoreError::Duplicate(_))));
    }

    #[test]
    fn test_invalid_expression_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertRuleStore::open(alert_rules_path(dir.path())).unwrap();
        let mut bad = rule("bad");
        bad.expression = "CPU >".into();
        assert!(matches!(
            store.create(bad),
            Err(CoreError::Expression(_))
        ));
    }

    #[test]
    fn test_write_failure_rolls_back_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = alert_rules_path(dir.path());
        let store = AlertRuleStore::open(&path).unwrap();
        let first = store.create(rule("kept")).unwrap();

        // Make the next write fail: replace the backing file with a
        // directory of the same name.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(store.create(rule("lost")).is_err());
        let rules = store.all();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, first.id);
    }

    #[test]
    fn test_health_check_defaults_and_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let store = HealthCheckStore::open(health_checks_path(dir.path())).unwrap();
        let created = store
            .create(HealthCheck {
                id: String::new(),
                name: "web".into(),
                kind: HealthCheckKind::Http,
                target: "http://localhost".into(),
                interval_secs: 0,
                timeout_secs: 0,
                success_code: None,
                on_fail: String::new(),
                enabled: true,
            })
            .unwrap();
        assert_eq!(created.interval_secs, 30);
        assert_eq!(created.timeout_secs, 5);
        assert_eq!(created.success_code, Some(200));

        let mut too_fast = HealthCheck {
            interval_secs: 9,
            ..created.clone()
        };
        too_fast.id = String::new();
        assert!(store.create(too_fast).is_err());
    }
}
