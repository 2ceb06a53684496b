//! Persistence of per-player, per-model driving stats
//!
//! A finished session is folded into whatever is already stored for the same
//! (model, player) pair: distance and time add up, top speed keeps the best
//! value and the name is replaced by the latest one. The read-merge-write runs
//! under a per-key lock so two merges for the same key never lose an update.
//!
//! Storage goes through the [`StatBackend`] trait. [`JsonFileBackend`] writes
//! one JSON file per record below a data directory:
//!
//! ```text
//! <root>/<model>/<model>.json          model summary
//! <root>/<model>/<guid>/<guid>.json    player totals
//! ```

use crate::error::StatStoreError;
use crate::session::FinalizedSession;
use log::{debug, warn};
use shared::{ModelStat, PlayerGuid, PlayerStat};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Storage key of a player record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatKey {
    pub model: String,
    pub guid: PlayerGuid,
}

impl StatKey {
    pub fn new(model: impl Into<String>, guid: PlayerGuid) -> Self {
        Self {
            model: model.into(),
            guid,
        }
    }
}

/// Whole-record storage for stats
///
/// Loads return `Ok(None)` when nothing is stored; stores overwrite the
/// complete record.
pub trait StatBackend: Send + Sync {
    fn load_player(&self, key: &StatKey) -> Result<Option<PlayerStat>, StatStoreError>;
    fn store_player(&self, key: &StatKey, stat: &PlayerStat) -> Result<(), StatStoreError>;
    fn load_model(&self, model: &str) -> Result<Option<ModelStat>, StatStoreError>;
    fn store_model(&self, model: &str, stat: &ModelStat) -> Result<(), StatStoreError>;
}

/// Combines a prior record with a session's metrics
pub fn merge_stats(prior: Option<&PlayerStat>, session: &PlayerStat) -> PlayerStat {
    match prior {
        Some(prior) => prior.merged_with(session),
        None => session.clone(),
    }
}

/// Merge-on-finalize front end over a backend
pub struct StatStore<B> {
    backend: B,
    key_locks: Mutex<HashMap<StatKey, Arc<Mutex<()>>>>,
}

impl<B: StatBackend> StatStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Merges one session into the stored totals and writes the result back
    ///
    /// An unreadable or corrupt prior record counts as missing, so the session
    /// is still written. Only a failed write is reported as an error.
    pub fn merge_and_persist(
        &self,
        model: &str,
        guid: PlayerGuid,
        sanitized_name: &str,
        distance_km: f64,
        time_spent_ms: f64,
        top_speed: i32,
    ) -> Result<PlayerStat, StatStoreError> {
        let key = StatKey::new(model, guid);
        let session = PlayerStat {
            username: sanitized_name.to_string(),
            km_driven: distance_km,
            time_spent: time_spent_ms,
            top_speed,
        };

        let key_lock = self.lock_for(&key);
        let result = {
            let _guard = key_lock.lock().unwrap_or_else(PoisonError::into_inner);

            let prior = match self.backend.load_player(&key) {
                Ok(prior) => prior,
                Err(e) => {
                    warn!("Ignoring unreadable stats for {} in {}: {}", guid, model, e);
                    None
                }
            };

            let merged = merge_stats(prior.as_ref(), &session);
            self.backend.store_player(&key, &merged).map(|()| merged)
        };
        self.release_lock(&key, key_lock);
        let merged = result?;

        debug!(
            "Stored stats for {} in {}: {:.2} km, {} km/h top",
            guid, model, merged.km_driven, merged.top_speed
        );
        Ok(merged)
    }

    pub fn persist_session(&self, session: &FinalizedSession) -> Result<PlayerStat, StatStoreError> {
        self.merge_and_persist(
            &session.model,
            session.guid,
            &session.name,
            session.distance_km,
            session.time_spent_ms,
            session.top_speed,
        )
    }

    /// Writes the model summary unless one already exists
    ///
    /// Returns true if a new record was written. Existing records, readable or
    /// not, are never touched.
    pub fn ensure_model_record(
        &self,
        model: &str,
        driver: Option<&str>,
    ) -> Result<bool, StatStoreError> {
        match self.backend.load_model(model) {
            Ok(Some(_)) => Ok(false),
            Ok(None) => {
                self.backend.store_model(model, &ModelStat::new(driver))?;
                debug!("Created model summary for {}", model);
                Ok(true)
            }
            Err(e) => {
                warn!("Leaving unreadable model summary for {} alone: {}", model, e);
                Ok(false)
            }
        }
    }

    fn lock_for(&self, key: &StatKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Drops the per-key lock entry once nobody else holds it
    fn release_lock(&self, key: &StatKey, key_lock: Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(key_lock);
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }
}

/// JSON files below a data directory
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    root: PathBuf,
}

impl JsonFileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn model_path(&self, model: &str) -> PathBuf {
        let model = path_component(model);
        self.root.join(&model).join(format!("{}.json", model))
    }

    pub fn player_path(&self, key: &StatKey) -> PathBuf {
        let guid = key.guid.to_string();
        self.root
            .join(path_component(&key.model))
            .join(&guid)
            .join(format!("{}.json", guid))
    }

    fn read_record<T: serde::de::DeserializeOwned>(
        path: &Path,
    ) -> Result<Option<T>, StatStoreError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Writes to a temp file next to the target, then renames it into place
    fn write_record<T: serde::Serialize>(path: &Path, record: &T) -> Result<(), StatStoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(record)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

impl StatBackend for JsonFileBackend {
    fn load_player(&self, key: &StatKey) -> Result<Option<PlayerStat>, StatStoreError> {
        Self::read_record(&self.player_path(key))
    }

    fn store_player(&self, key: &StatKey, stat: &PlayerStat) -> Result<(), StatStoreError> {
        Self::write_record(&self.player_path(key), stat)
    }

    fn load_model(&self, model: &str) -> Result<Option<ModelStat>, StatStoreError> {
        Self::read_record(&self.model_path(model))
    }

    fn store_model(&self, model: &str, stat: &ModelStat) -> Result<(), StatStoreError> {
        Self::write_record(&self.model_path(model), stat)
    }
}

/// Keeps a model name from escaping its directory
fn path_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// In-memory backend holding serialized records
#[derive(Debug, Default)]
pub struct MemoryBackend {
    players: Mutex<HashMap<StatKey, String>>,
    models: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw text as a player record, bypassing serialization
    pub fn insert_raw(&self, key: StatKey, raw: impl Into<String>) {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, raw.into());
    }

    pub fn player_count(&self) -> usize {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn model_count(&self) -> usize {
        self.models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl StatBackend for MemoryBackend {
    fn load_player(&self, key: &StatKey) -> Result<Option<PlayerStat>, StatStoreError> {
        let players = self.players.lock().unwrap_or_else(PoisonError::into_inner);
        match players.get(key) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn store_player(&self, key: &StatKey, stat: &PlayerStat) -> Result<(), StatStoreError> {
        let raw = serde_json::to_string(stat)?;
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), raw);
        Ok(())
    }

    fn load_model(&self, model: &str) -> Result<Option<ModelStat>, StatStoreError> {
        let models = self.models.lock().unwrap_or_else(PoisonError::into_inner);
        match models.get(model) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn store_model(&self, model: &str, stat: &ModelStat) -> Result<(), StatStoreError> {
        let raw = serde_json::to_string(stat)?;
        self.models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model.to_string(), raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::NO_NAME;
    use std::thread;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    const MODEL: &str = "ks_porsche_911_gt3_r_2016";

    fn stat(name: &str, km: f64, time: f64, top: i32) -> PlayerStat {
        PlayerStat {
            username: name.to_string(),
            km_driven: km,
            time_spent: time,
            top_speed: top,
        }
    }

    /// Backend whose writes always fail
    struct ReadOnlyBackend;

    impl StatBackend for ReadOnlyBackend {
        fn load_player(&self, _key: &StatKey) -> Result<Option<PlayerStat>, StatStoreError> {
            Ok(None)
        }

        fn store_player(&self, _key: &StatKey, _stat: &PlayerStat) -> Result<(), StatStoreError> {
            Err(std::io::Error::new(ErrorKind::PermissionDenied, "read-only").into())
        }

        fn load_model(&self, _model: &str) -> Result<Option<ModelStat>, StatStoreError> {
            Ok(None)
        }

        fn store_model(&self, _model: &str, _stat: &ModelStat) -> Result<(), StatStoreError> {
            Err(std::io::Error::new(ErrorKind::PermissionDenied, "read-only").into())
        }
    }

    #[test]
    fn test_merge_without_prior() {
        let session = stat("B", 5.0, 500.0, 120);
        assert_eq!(merge_stats(None, &session), session);
    }

    #[test]
    fn test_merge_additivity() {
        let prior = stat("A", 10.0, 1000.0, 150);
        let session = stat("B", 5.0, 500.0, 120);

        let merged = merge_stats(Some(&prior), &session);
        assert_eq!(merged, stat("B", 15.0, 1500.0, 150));
    }

    #[test]
    fn test_merge_zero_session_keeps_prior() {
        let prior = stat("A", 42.5, 98765.0, 201);
        let session = stat("Renamed", 0.0, 0.0, 0);

        let merged = merge_stats(Some(&prior), &session);
        assert_eq!(merged, stat("Renamed", 42.5, 98765.0, 201));
    }

    #[test]
    fn test_merge_and_persist_first_session() {
        let store = StatStore::new(MemoryBackend::new());

        let merged = assert_ok!(store.merge_and_persist(MODEL, 1, "Driver", 12.5, 60_000.0, 180));
        assert_eq!(merged, stat("Driver", 12.5, 60_000.0, 180));

        let stored = store.backend().load_player(&StatKey::new(MODEL, 1)).unwrap();
        assert_eq!(stored, Some(merged));
    }

    #[test]
    fn test_merge_and_persist_accumulates() {
        let store = StatStore::new(MemoryBackend::new());

        store.merge_and_persist(MODEL, 1, "A", 10.0, 1000.0, 150).unwrap();
        let merged = store.merge_and_persist(MODEL, 1, "B", 5.0, 500.0, 120).unwrap();

        assert_eq!(merged, stat("B", 15.0, 1500.0, 150));
    }

    #[test]
    fn test_records_are_keyed_by_model_and_player() {
        let store = StatStore::new(MemoryBackend::new());

        store.merge_and_persist(MODEL, 1, "A", 10.0, 1000.0, 150).unwrap();
        store.merge_and_persist("other_car", 1, "A", 3.0, 300.0, 90).unwrap();
        store.merge_and_persist(MODEL, 2, "C", 7.0, 700.0, 110).unwrap();

        assert_eq!(store.backend().player_count(), 3);
        let first = store.backend().load_player(&StatKey::new(MODEL, 1)).unwrap();
        assert_eq!(first, Some(stat("A", 10.0, 1000.0, 150)));
    }

    #[test]
    fn test_corrupt_prior_is_treated_as_missing() {
        let store = StatStore::new(MemoryBackend::new());
        store.backend().insert_raw(StatKey::new(MODEL, 1), "{ not json");

        let merged = store.merge_and_persist(MODEL, 1, "B", 5.0, 500.0, 120).unwrap();
        assert_eq!(merged, stat("B", 5.0, 500.0, 120));
    }

    #[test]
    fn test_partial_prior_uses_defaults() {
        let store = StatStore::new(MemoryBackend::new());
        store.backend().insert_raw(StatKey::new(MODEL, 1), r#"{"KmDriven": 2.0}"#);

        let merged = store.merge_and_persist(MODEL, 1, "B", 1.0, 10.0, 50).unwrap();
        assert_eq!(merged, stat("B", 3.0, 10.0, 50));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let store = StatStore::new(ReadOnlyBackend);
        let result = store.merge_and_persist(MODEL, 1, "A", 1.0, 1.0, 1);
        assert!(matches!(assert_err!(result), StatStoreError::Io(_)));
    }

    #[test]
    fn test_concurrent_merges_do_not_lose_updates() {
        let store = Arc::new(StatStore::new(MemoryBackend::new()));
        let threads = 8;
        let merges_per_thread = 25;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..merges_per_thread {
                        store
                            .merge_and_persist(MODEL, 1, "Racer", 1.0, 10.0, t * 100 + i)
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let total = (threads * merges_per_thread) as f64;
        let stored = store
            .backend()
            .load_player(&StatKey::new(MODEL, 1))
            .unwrap()
            .unwrap();
        assert_approx_eq!(stored.km_driven, total);
        assert_approx_eq!(stored.time_spent, total * 10.0);
        assert_eq!(stored.top_speed, (threads - 1) * 100 + merges_per_thread - 1);
        assert!(store.key_locks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_ensure_model_record_is_write_once() {
        let store = StatStore::new(MemoryBackend::new());

        assert!(store.ensure_model_record(MODEL, Some("First")).unwrap());
        assert!(!store.ensure_model_record(MODEL, Some("Second")).unwrap());

        let summary = store.backend().load_model(MODEL).unwrap().unwrap();
        assert_eq!(summary.most_common_driver, "First");
        assert_eq!(store.backend().model_count(), 1);
    }

    #[test]
    fn test_ensure_model_record_without_driver() {
        let store = StatStore::new(MemoryBackend::new());
        store.ensure_model_record(MODEL, None).unwrap();

        let summary = store.backend().load_model(MODEL).unwrap().unwrap();
        assert_eq!(summary.most_common_driver, NO_NAME);
    }

    #[test]
    fn test_json_backend_layout() {
        let temp_dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(temp_dir.path());

        assert_eq!(
            backend.player_path(&StatKey::new(MODEL, 765)),
            temp_dir.path().join(MODEL).join("765").join("765.json")
        );
        assert_eq!(
            backend.model_path(MODEL),
            temp_dir.path().join(MODEL).join(format!("{}.json", MODEL))
        );
    }

    #[test]
    fn test_json_backend_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = StatStore::new(JsonFileBackend::new(temp_dir.path()));

        store.merge_and_persist(MODEL, 9, "A", 10.0, 1000.0, 150).unwrap();
        store.merge_and_persist(MODEL, 9, "B", 5.0, 500.0, 120).unwrap();

        let path = store.backend().player_path(&StatKey::new(MODEL, 9));
        let raw = fs::read_to_string(&path).unwrap();
        let on_disk: PlayerStat = serde_json::from_str(&raw).unwrap();
        assert_eq!(on_disk, stat("B", 15.0, 1500.0, 150));
        assert!(raw.contains("\"KmDriven\""));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_backend_missing_record() {
        let temp_dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(temp_dir.path());

        assert!(backend.load_player(&StatKey::new(MODEL, 1)).unwrap().is_none());
        assert!(backend.load_model(MODEL).unwrap().is_none());
    }

    #[test]
    fn test_json_backend_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = StatStore::new(JsonFileBackend::new(temp_dir.path()));
        let key = StatKey::new(MODEL, 3);
        let path = store.backend().player_path(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "garbage").unwrap();

        assert!(matches!(
            store.backend().load_player(&key),
            Err(StatStoreError::Json(_))
        ));

        let merged = store.merge_and_persist(MODEL, 3, "A", 1.0, 2.0, 3).unwrap();
        assert_eq!(merged, stat("A", 1.0, 2.0, 3));
    }

    #[test]
    fn test_json_backend_leaves_corrupt_model_alone() {
        let temp_dir = TempDir::new().unwrap();
        let store = StatStore::new(JsonFileBackend::new(temp_dir.path()));
        let path = store.backend().model_path(MODEL);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "garbage").unwrap();

        assert!(!store.ensure_model_record(MODEL, Some("Driver")).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "garbage");
    }

    #[test]
    fn test_path_component_escapes_separators() {
        assert_eq!(path_component("../evil/car"), ".._evil_car");
        assert_eq!(path_component(".."), "_");
        assert_eq!(path_component(""), "_");
        assert_eq!(path_component("ks_audi_r8"), "ks_audi_r8");
    }
}
