//! Crash-safe persistent store for missions and checkpoints.
//!
//! The in-memory maps are authoritative and every read is served from them.
//! Mutations mark the store dirty and re-arm a debounce timer; when the timer
//! fires without being superseded, the current state is written with the
//! atomic protocol in [`snapshot`]. Forced flushes and shutdown bypass the
//! timer.

mod metrics;
pub mod snapshot;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub use metrics::StoreMetrics;
pub use snapshot::{LoadSource, Snapshot, SnapshotFiles};

use crate::error::MissionError;
use crate::models::{Checkpoint, Mission, MissionState};

pub const DEFAULT_FLUSH_DEBOUNCE: Duration = Duration::from_millis(1000);

/// How the store persists and how long finished missions are kept.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `None` keeps the store purely in memory.
    pub state_dir: Option<PathBuf>,
    pub flush_debounce: Duration,
    /// Age after which COMPLETED missions are swept. `None` keeps them.
    pub completed_retention: Option<chrono::Duration>,
    /// Age after which FAILED missions are swept. `None` keeps them.
    pub failed_retention: Option<chrono::Duration>,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            state_dir: None,
            flush_debounce: DEFAULT_FLUSH_DEBOUNCE,
            completed_retention: None,
            failed_retention: None,
        }
    }

    pub fn persistent(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: Some(state_dir.into()),
            ..Self::in_memory()
        }
    }

    pub fn with_debounce(mut self, flush_debounce: Duration) -> Self {
        self.flush_debounce = flush_debounce;
        self
    }

    /// Retention windows in days; `0` disables sweeping for that state.
    pub fn with_retention_days(mut self, completed: u32, failed: u32) -> Self {
        let window = |days: u32| (days > 0).then(|| chrono::Duration::days(i64::from(days)));
        self.completed_retention = window(completed);
        self.failed_retention = window(failed);
        self
    }
}

#[derive(Default)]
struct StoreState {
    missions: BTreeMap<String, Mission>,
    checkpoints: BTreeMap<String, Checkpoint>,
    dirty: bool,
    /// Bumped by every mutation; a flush only clears `dirty` if no mutation
    /// happened while it was writing.
    generation: u64,
}

impl StoreState {
    fn touch(&mut self) -> u64 {
        self.dirty = true;
        self.generation += 1;
        self.generation
    }
}

struct Inner {
    state: Mutex<StoreState>,
    files: Option<SnapshotFiles>,
    config: StoreConfig,
    flush_lock: tokio::sync::Mutex<()>,
    metrics: Mutex<StoreMetrics>,
    shutting_down: AtomicBool,
}

/// Shared handle to the mission store. Clones share the same state.
#[derive(Clone)]
pub struct PersistentStore {
    inner: Arc<Inner>,
}

impl PersistentStore {
    /// Open the store described by `config`, loading any persisted state.
    ///
    /// Unreadable snapshots never prevent startup: the backup is tried, and
    /// if that fails too the store starts empty.
    pub fn open(config: StoreConfig) -> Result<Self, MissionError> {
        let files = config.state_dir.clone().map(SnapshotFiles::new);
        let mut metrics = StoreMetrics::default();

        let (missions, checkpoints) = match &files {
            Some(files) => {
                files.prepare()?;
                let started = Instant::now();
                match files.load() {
                    Ok(loaded) => {
                        info!(
                            source = ?loaded.source,
                            missions = loaded.snapshot.missions.len(),
                            path = %files.canonical().display(),
                            "Loaded mission state"
                        );
                        metrics.record_load(
                            started.elapsed(),
                            loaded.deserialize_time,
                            loaded.bytes,
                            loaded.source,
                        );
                        loaded.snapshot.into_maps()
                    }
                    Err(e) => {
                        error!(error = %e, "Persisted state unreadable, starting empty");
                        metrics.record_load(
                            started.elapsed(),
                            Duration::ZERO,
                            0,
                            LoadSource::Discarded,
                        );
                        Default::default()
                    }
                }
            }
            None => {
                debug!("Persistence disabled, store is in-memory only");
                metrics.record_load(Duration::ZERO, Duration::ZERO, 0, LoadSource::Memory);
                Default::default()
            }
        };

        Ok(Self::from_parts(config, files, missions, checkpoints, metrics))
    }

    /// A store with persistence disabled.
    pub fn in_memory() -> Self {
        let mut metrics = StoreMetrics::default();
        metrics.record_load(Duration::ZERO, Duration::ZERO, 0, LoadSource::Memory);
        Self::from_parts(
            StoreConfig::in_memory(),
            None,
            BTreeMap::new(),
            BTreeMap::new(),
            metrics,
        )
    }

    fn from_parts(
        config: StoreConfig,
        files: Option<SnapshotFiles>,
        missions: BTreeMap<String, Mission>,
        checkpoints: BTreeMap<String, Checkpoint>,
        metrics: StoreMetrics,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(StoreState {
                    missions,
                    checkpoints,
                    dirty: false,
                    generation: 0,
                }),
                files,
                config,
                flush_lock: tokio::sync::Mutex::new(()),
                metrics: Mutex::new(metrics),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().expect("store lock poisoned")
    }

    fn metrics_mut(&self) -> MutexGuard<'_, StoreMetrics> {
        self.inner.metrics.lock().expect("metrics lock poisoned")
    }

    pub fn is_persistent(&self) -> bool {
        self.inner.files.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.state().dirty
    }

    pub fn metrics(&self) -> StoreMetrics {
        self.inner.metrics.lock().expect("metrics lock poisoned").clone()
    }

    // ============================================================
    // Missions
    // ============================================================

    pub fn get_mission(&self, id: &str) -> Option<Mission> {
        self.state().missions.get(id).cloned()
    }

    pub fn contains_mission(&self, id: &str) -> bool {
        self.state().missions.contains_key(id)
    }

    pub fn list_missions(&self) -> Vec<Mission> {
        self.state().missions.values().cloned().collect()
    }

    pub fn insert_mission(&self, mission: Mission) -> Result<(), MissionError> {
        let generation = {
            let mut state = self.state();
            if state.missions.contains_key(&mission.id) {
                return Err(MissionError::AlreadyExists(mission.id));
            }
            state.missions.insert(mission.id.clone(), mission);
            state.touch()
        };
        self.schedule_flush(generation);
        Ok(())
    }

    /// Run `f` against a mission under the store lock.
    ///
    /// The store is marked dirty only when `f` returns `Ok`, so `f` must not
    /// change the mission on paths that return an error.
    pub fn update_mission<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Mission) -> Result<T, MissionError>,
    ) -> Result<T, MissionError> {
        let (value, generation) = {
            let mut state = self.state();
            let mission = state
                .missions
                .get_mut(id)
                .ok_or_else(|| MissionError::NotFound(id.to_string()))?;
            let value = f(mission)?;
            (value, state.touch())
        };
        self.schedule_flush(generation);
        Ok(value)
    }

    /// Remove a mission and its checkpoints. Returns false if it did not exist.
    pub fn delete_mission(&self, id: &str) -> bool {
        let generation = {
            let mut state = self.state();
            if state.missions.remove(id).is_none() {
                return false;
            }
            state.checkpoints.retain(|_, c| c.mission_id != id);
            state.touch()
        };
        self.schedule_flush(generation);
        true
    }

    // ============================================================
    // Checkpoints
    // ============================================================

    /// Store a checkpoint stamped with the mission's current attempt count.
    pub fn create_checkpoint(&self, mission_id: &str, data: Value) -> Result<Checkpoint, MissionError> {
        let (checkpoint, generation) = {
            let mut state = self.state();
            let attempt_number = state
                .missions
                .get(mission_id)
                .map(|m| m.current_attempt)
                .ok_or_else(|| MissionError::NotFound(mission_id.to_string()))?;
            let checkpoint = Checkpoint {
                id: Uuid::new_v4().to_string(),
                mission_id: mission_id.to_string(),
                attempt_number,
                created_at: Utc::now(),
                data,
            };
            state
                .checkpoints
                .insert(checkpoint.id.clone(), checkpoint.clone());
            (checkpoint, state.touch())
        };
        self.schedule_flush(generation);
        Ok(checkpoint)
    }

    /// Checkpoints of one mission, oldest first.
    pub fn checkpoints_for(&self, mission_id: &str) -> Vec<Checkpoint> {
        let mut checkpoints: Vec<Checkpoint> = self
            .state()
            .checkpoints
            .values()
            .filter(|c| c.mission_id == mission_id)
            .cloned()
            .collect();
        checkpoints.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        checkpoints
    }

    // ============================================================
    // Retention
    // ============================================================

    pub fn sweep_expired(&self) -> Vec<String> {
        self.sweep_expired_at(Utc::now())
    }

    /// Delete COMPLETED and FAILED missions whose `completed_at` is older than
    /// their retention window. Other missions are never swept.
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let completed_window = self.inner.config.completed_retention;
        let failed_window = self.inner.config.failed_retention;
        if completed_window.is_none() && failed_window.is_none() {
            return Vec::new();
        }

        let (expired, generation) = {
            let mut state = self.state();
            let expired: Vec<String> = state
                .missions
                .values()
                .filter(|mission| {
                    let Some(completed_at) = mission.completed_at else {
                        return false;
                    };
                    let window = match mission.state {
                        MissionState::Completed => completed_window,
                        MissionState::Failed => failed_window,
                        _ => None,
                    };
                    window.is_some_and(|window| now - completed_at > window)
                })
                .map(|mission| mission.id.clone())
                .collect();

            if expired.is_empty() {
                return expired;
            }

            for id in &expired {
                state.missions.remove(id);
            }
            state
                .checkpoints
                .retain(|_, c| !expired.contains(&c.mission_id));
            let generation = state.touch();
            (expired, generation)
        };

        info!(count = expired.len(), "Swept expired missions");
        self.schedule_flush(generation);
        expired
    }

    // ============================================================
    // Persistence
    // ============================================================

    fn generation(&self) -> u64 {
        self.state().generation
    }

    fn schedule_flush(&self, generation: u64) {
        if self.inner.files.is_none() || self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, flush deferred to the next explicit flush");
            return;
        };

        let store = self.clone();
        let delay = self.inner.config.flush_debounce;
        handle.spawn(async move {
            tokio::time::sleep(delay).await;

            // A later mutation re-armed the timer; its task will flush.
            if store.generation() != generation || store.inner.shutting_down.load(Ordering::SeqCst) {
                return;
            }

            if let Err(e) = store.flush_if_dirty().await {
                warn!(error = %e, "Background flush failed, state stays dirty");
            }
        });
    }

    /// Write the current state now, whether or not it is dirty.
    pub async fn flush(&self) -> Result<(), MissionError> {
        match self.inner.files.clone() {
            Some(files) => self.write_snapshot(&files).await,
            None => {
                self.state().dirty = false;
                Ok(())
            }
        }
    }

    /// Write the current state if anything changed since the last flush.
    /// Returns whether a write happened.
    pub async fn flush_if_dirty(&self) -> Result<bool, MissionError> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.flush().await?;
        Ok(true)
    }

    /// Final flush before the process exits. Later calls are no-ops.
    pub async fn shutdown(&self) -> Result<(), MissionError> {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("Store shutdown already in progress");
            return Ok(());
        }

        info!("Store shutting down");
        let wrote = self.flush_if_dirty().await?;
        if wrote {
            info!("Final snapshot written");
        }
        Ok(())
    }

    async fn write_snapshot(&self, files: &SnapshotFiles) -> Result<(), MissionError> {
        let _guard = self.inner.flush_lock.lock().await;
        let started = Instant::now();

        let (snapshot, generation) = {
            let state = self.state();
            (
                Snapshot::capture(&state.missions, &state.checkpoints),
                state.generation,
            )
        };

        let serialize_started = Instant::now();
        let bytes = match snapshot.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.metrics_mut().record_save_failure(&e);
                return Err(e);
            }
        };
        let serialize_time = serialize_started.elapsed();
        let size = bytes.len();

        let writer = files.clone();
        let result = tokio::task::spawn_blocking(move || writer.write_atomic(&bytes))
            .await
            .map_err(|e| MissionError::Persistence(std::io::Error::other(e)))
            .and_then(|written| written.map_err(MissionError::from));

        match result {
            Ok(()) => {
                {
                    let mut state = self.state();
                    if state.generation == generation {
                        state.dirty = false;
                    }
                }
                self.metrics_mut()
                    .record_save(started.elapsed(), serialize_time, size);
                debug!(
                    missions = snapshot.missions.len(),
                    bytes = size,
                    "Mission state flushed"
                );
                Ok(())
            }
            Err(e) => {
                error!(error = %e, path = %files.canonical().display(), "Failed to write snapshot");
                self.metrics_mut().record_save_failure(&e);
                Err(e)
            }
        }
    }
}
