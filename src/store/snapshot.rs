//! On-disk snapshot format and the atomic write protocol.
//!
//! A flush writes `missions.json.tmp`, copies the current `missions.json` to
//! `missions.json.bak`, then renames the temp file over `missions.json`. The
//! canonical file is therefore only ever replaced by a rename, and the backup
//! always holds the state of the previous successful flush.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::MissionError;
use crate::models::{Checkpoint, Mission};

pub const SNAPSHOT_VERSION: &str = "1";

pub const SNAPSHOT_FILE: &str = "missions.json";
pub const BACKUP_FILE: &str = "missions.json.bak";
pub const TEMP_FILE: &str = "missions.json.tmp";
pub const CORRUPT_FILE: &str = "missions.json.corrupt";

/// The complete persisted store state.
///
/// Maps are flattened to ordered `(id, record)` pairs here and nowhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub missions: Vec<(String, Mission)>,
    pub checkpoints: Vec<(String, Checkpoint)>,
}

/// Lenient on-disk shape: records are decoded one by one after the envelope
/// parses, so a single bad record does not discard the file. `version` and
/// `missions` are required; without them the file is not a snapshot.
#[derive(Deserialize)]
struct RawSnapshot {
    version: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    missions: Vec<(String, Value)>,
    #[serde(default)]
    checkpoints: Vec<(String, Value)>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            timestamp: Utc::now(),
            missions: Vec::new(),
            checkpoints: Vec::new(),
        }
    }

    pub fn capture(
        missions: &BTreeMap<String, Mission>,
        checkpoints: &BTreeMap<String, Checkpoint>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            timestamp: Utc::now(),
            missions: missions
                .iter()
                .map(|(id, mission)| (id.clone(), mission.clone()))
                .collect(),
            checkpoints: checkpoints
                .iter()
                .map(|(id, checkpoint)| (id.clone(), checkpoint.clone()))
                .collect(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MissionError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decode a snapshot, tolerating version mismatches and skipping records
    /// that no longer decode. Fails when the envelope is unreadable or when
    /// not a single mission record survives decoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MissionError> {
        let raw: RawSnapshot = serde_json::from_slice(bytes)
            .map_err(|e| MissionError::CorruptedState(e.to_string()))?;

        let version = raw.version;
        if version != SNAPSHOT_VERSION {
            warn!(
                found = %version,
                expected = SNAPSHOT_VERSION,
                "Snapshot version mismatch, loading best-effort"
            );
        }

        let stored = raw.missions.len();
        let mut missions = Vec::with_capacity(stored);
        for (id, record) in raw.missions {
            match serde_json::from_value::<Mission>(record) {
                Ok(mut mission) => {
                    if mission.id != id {
                        warn!(key = %id, record_id = %mission.id, "Mission id differs from its key, using key");
                        mission.id = id.clone();
                    }
                    let recorded = mission.attempts.len() as u32;
                    if mission.current_attempt != recorded {
                        warn!(
                            mission_id = %id,
                            current_attempt = mission.current_attempt,
                            recorded,
                            "Attempt count out of sync with history, using history"
                        );
                        mission.current_attempt = recorded;
                    }
                    missions.push((id, mission));
                }
                Err(e) => warn!(mission_id = %id, error = %e, "Skipping undecodable mission record"),
            }
        }

        if stored > 0 && missions.is_empty() {
            return Err(MissionError::CorruptedState(format!(
                "none of {} mission records could be decoded",
                stored
            )));
        }

        let mut checkpoints = Vec::with_capacity(raw.checkpoints.len());
        for (id, record) in raw.checkpoints {
            match serde_json::from_value::<Checkpoint>(record) {
                Ok(checkpoint) => checkpoints.push((id, checkpoint)),
                Err(e) => {
                    warn!(checkpoint_id = %id, error = %e, "Skipping undecodable checkpoint record")
                }
            }
        }

        Ok(Self {
            version,
            timestamp: raw.timestamp.unwrap_or_else(Utc::now),
            missions,
            checkpoints,
        })
    }

    pub fn into_maps(self) -> (BTreeMap<String, Mission>, BTreeMap<String, Checkpoint>) {
        (
            self.missions.into_iter().collect(),
            self.checkpoints.into_iter().collect(),
        )
    }
}

/// Where a loaded state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    /// No snapshot on disk yet.
    Fresh,
    Canonical,
    /// The canonical file was missing or unreadable.
    Backup,
    /// Both files were unreadable and the store started empty.
    Discarded,
    /// Persistence is disabled.
    Memory,
}

/// A snapshot read back from disk, with timing for metrics.
#[derive(Debug)]
pub struct LoadedSnapshot {
    pub snapshot: Snapshot,
    pub source: LoadSource,
    pub bytes: usize,
    pub deserialize_time: Duration,
}

/// Paths of the snapshot, backup and temp files in one state directory.
#[derive(Debug, Clone)]
pub struct SnapshotFiles {
    dir: PathBuf,
    canonical: PathBuf,
    backup: PathBuf,
    temp: PathBuf,
    corrupt: PathBuf,
}

impl SnapshotFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            canonical: dir.join(SNAPSHOT_FILE),
            backup: dir.join(BACKUP_FILE),
            temp: dir.join(TEMP_FILE),
            corrupt: dir.join(CORRUPT_FILE),
            dir,
        }
    }

    pub fn canonical(&self) -> &Path {
        &self.canonical
    }

    /// Create the state directory, owner-only on Unix.
    pub fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }

    /// Replace the canonical snapshot with `bytes`.
    pub fn write_atomic(&self, bytes: &[u8]) -> io::Result<()> {
        // 1. Write and sync the temp file
        if let Err(e) = write_synced(&self.temp, bytes) {
            let _ = fs::remove_file(&self.temp);
            return Err(e);
        }

        // 2. Preserve the previous flush
        if self.canonical.exists() {
            fs::copy(&self.canonical, &self.backup)?;
        }

        // 3. Atomic rename (same directory, same filesystem)
        fs::rename(&self.temp, &self.canonical)?;

        #[cfg(unix)]
        {
            if let Err(e) = fs::File::open(&self.dir).and_then(|dir| dir.sync_all()) {
                debug!(error = %e, "Failed to sync state directory");
            }
        }

        debug!(path = %self.canonical.display(), bytes = bytes.len(), "Snapshot written");
        Ok(())
    }

    fn quarantine_canonical(&self) {
        match fs::rename(&self.canonical, &self.corrupt) {
            Ok(()) => warn!(
                path = %self.corrupt.display(),
                "Moved unreadable snapshot aside"
            ),
            Err(e) => warn!(error = %e, "Failed to move unreadable snapshot aside"),
        }
    }

    /// Load the canonical snapshot, falling back to the backup.
    ///
    /// When the backup is used, an undecodable canonical file is moved to
    /// `missions.json.corrupt` so the next flush cannot rotate it over the
    /// backup. Returns `CorruptedState` only when a snapshot exists but
    /// neither file can be decoded.
    pub fn load(&self) -> Result<LoadedSnapshot, MissionError> {
        let mut seen_any = false;
        let mut canonical_unreadable = false;

        for (path, source) in [
            (&self.canonical, LoadSource::Canonical),
            (&self.backup, LoadSource::Backup),
        ] {
            let bytes = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    seen_any = true;
                    canonical_unreadable |= source == LoadSource::Canonical;
                    warn!(path = %path.display(), error = %e, "Failed to read snapshot");
                    continue;
                }
            };
            seen_any = true;

            let started = Instant::now();
            match Snapshot::from_bytes(&bytes) {
                Ok(snapshot) => {
                    if source == LoadSource::Backup && canonical_unreadable {
                        self.quarantine_canonical();
                    }
                    return Ok(LoadedSnapshot {
                        snapshot,
                        source,
                        bytes: bytes.len(),
                        deserialize_time: started.elapsed(),
                    });
                }
                Err(e) => {
                    canonical_unreadable |= source == LoadSource::Canonical;
                    warn!(path = %path.display(), error = %e, "Unreadable snapshot");
                }
            }
        }

        if seen_any {
            return Err(MissionError::CorruptedState(format!(
                "neither {} nor {} could be decoded",
                self.canonical.display(),
                self.backup.display()
            )));
        }

        Ok(LoadedSnapshot {
            snapshot: Snapshot::empty(),
            source: LoadSource::Fresh,
            bytes: 0,
            deserialize_time: Duration::ZERO,
        })
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
