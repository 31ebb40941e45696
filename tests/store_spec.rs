//! Persistence tests: atomic writes, recovery, debouncing and retention.

use std::fs;
use std::path::Path;
use std::time::Duration;

use mission_control::missions::MissionService;
use mission_control::models::*;
use mission_control::store::{LoadSource, PersistentStore, Snapshot, StoreConfig};
use serde_json::{json, Value};
use tempfile::TempDir;

const DEBOUNCE: Duration = Duration::from_millis(50);

fn config(dir: &Path) -> StoreConfig {
    StoreConfig::persistent(dir).with_debounce(DEBOUNCE)
}

fn open(dir: &Path) -> MissionService {
    MissionService::new(PersistentStore::open(config(dir)).expect("Failed to open store"))
}

fn define(service: &MissionService, id: &str) -> Mission {
    service
        .define_mission(DefineMissionInput {
            id: Some(id.to_string()),
            goal: format!("Mission {}", id),
            criteria: json!({ "type": "NUMERIC", "operator": "GREATER_THAN_OR_EQUAL", "threshold": 90 }),
            max_attempts: Some(5),
            context: Some("cargo tarpaulin".to_string()),
            start: None,
        })
        .expect("Failed to define mission")
}

fn submit(service: &MissionService, id: &str, value: f64) -> SubmitOutcome {
    service
        .submit_attempt(
            id,
            SubmitAttemptInput {
                output: format!("coverage {}", value),
                value: Some(AttemptValue::Number(value)),
                duration_ms: Some(1200),
            },
        )
        .expect("Failed to submit attempt")
}

fn read_snapshot(path: &Path) -> Snapshot {
    let bytes = fs::read(path).expect("Failed to read snapshot");
    Snapshot::from_bytes(&bytes).expect("Failed to decode snapshot")
}

// ============================================================
// Round trip
// ============================================================

mod round_trip {
    use super::*;

    #[tokio::test]
    async fn reopened_store_has_identical_missions() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());

        define(&service, "alpha");
        submit(&service, "alpha", 72.5);
        submit(&service, "alpha", 95.0);
        define(&service, "beta");
        submit(&service, "beta", 10.0);
        service
            .save_checkpoint("beta", json!({ "step": 1 }))
            .expect("Failed to save checkpoint");

        let before_alpha = service.get_mission("alpha").unwrap();
        let before_beta = service.get_mission("beta").unwrap();
        service.store().flush().await.expect("Flush failed");
        drop(service);

        let reopened = open(dir.path());
        assert_eq!(reopened.get_mission("alpha").unwrap(), before_alpha);
        assert_eq!(reopened.get_mission("beta").unwrap(), before_beta);
        assert_eq!(reopened.list_checkpoints("beta").unwrap().len(), 1);
        assert_eq!(
            reopened.store().metrics().last_load_source,
            Some(LoadSource::Canonical)
        );
    }

    #[tokio::test]
    async fn restored_mission_continues_counting() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());
        define(&service, "resume");
        submit(&service, "resume", 1.0);
        submit(&service, "resume", 2.0);
        service.store().shutdown().await.expect("Shutdown failed");

        let reopened = open(dir.path());
        let outcome = submit(&reopened, "resume", 3.0);
        assert_eq!(outcome.attempt_number, 3);
        assert_eq!(outcome.remaining_attempts, 2);
    }

    #[tokio::test]
    async fn snapshot_stores_ordered_pairs() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());
        define(&service, "b");
        define(&service, "a");
        service.store().flush().await.expect("Flush failed");

        let raw: Value =
            serde_json::from_slice(&fs::read(dir.path().join("missions.json")).unwrap()).unwrap();
        assert_eq!(raw["version"], "1");
        assert_eq!(raw["missions"][0][0], "a");
        assert_eq!(raw["missions"][1][0], "b");
        assert_eq!(raw["missions"][0][1]["state"], "IN_PROGRESS");
    }
}

// ============================================================
// Atomic writes
// ============================================================

mod atomic_write {
    use super::*;

    #[tokio::test]
    async fn backup_holds_the_previous_flush() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());

        define(&service, "first");
        service.store().flush().await.expect("Flush failed");
        assert!(!dir.path().join("missions.json.bak").exists());

        define(&service, "second");
        service.store().flush().await.expect("Flush failed");

        let canonical = read_snapshot(&dir.path().join("missions.json"));
        let backup = read_snapshot(&dir.path().join("missions.json.bak"));
        assert_eq!(canonical.missions.len(), 2);
        assert_eq!(backup.missions.len(), 1);
        assert_eq!(backup.missions[0].0, "first");
    }

    #[tokio::test]
    async fn failed_write_leaves_canonical_untouched() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());
        define(&service, "kept");
        service.store().flush().await.expect("Flush failed");
        let before = fs::read(dir.path().join("missions.json")).unwrap();

        // A directory where the temp file should go makes the first step fail.
        fs::create_dir(dir.path().join("missions.json.tmp")).unwrap();
        define(&service, "lost-on-disk");
        let result = service.store().flush().await;

        assert!(result.is_err());
        assert_eq!(fs::read(dir.path().join("missions.json")).unwrap(), before);

        // In-memory state is not rolled back.
        assert!(service.get_mission("lost-on-disk").is_ok());
        assert!(service.store().is_dirty());

        let metrics = service.store().metrics();
        assert!(metrics.failed_save_count >= 1);
        assert!(metrics.last_save_error.is_some());
    }

    #[tokio::test]
    async fn stale_temp_file_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());
        fs::write(dir.path().join("missions.json.tmp"), b"{ half a snapsh").unwrap();

        define(&service, "fresh");
        service.store().flush().await.expect("Flush failed");

        let canonical = read_snapshot(&dir.path().join("missions.json"));
        assert_eq!(canonical.missions.len(), 1);
        assert!(!dir.path().join("missions.json.tmp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn state_directory_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let state_dir = dir.path().join("nested").join("state");
        let _service = open(&state_dir);

        let mode = fs::metadata(&state_dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}

// ============================================================
// Recovery
// ============================================================

mod recovery {
    use super::*;

    #[tokio::test]
    async fn starts_fresh_without_snapshot() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());

        assert!(service.list_missions(None).is_empty());
        assert_eq!(
            service.store().metrics().last_load_source,
            Some(LoadSource::Fresh)
        );
    }

    #[tokio::test]
    async fn falls_back_to_backup_when_canonical_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());
        define(&service, "one");
        service.store().flush().await.expect("Flush failed");
        define(&service, "two");
        service.store().flush().await.expect("Flush failed");
        drop(service);

        fs::write(dir.path().join("missions.json"), b"not json at all").unwrap();

        let reopened = open(dir.path());
        assert!(reopened.get_mission("one").is_ok());
        assert!(reopened.get_mission("two").is_err());
        assert_eq!(
            reopened.store().metrics().last_load_source,
            Some(LoadSource::Backup)
        );
    }

    /// Flush "one", then "two", so the backup holds only "one".
    async fn two_generations(dir: &Path) {
        let service = open(dir);
        define(&service, "one");
        service.store().flush().await.expect("Flush failed");
        define(&service, "two");
        service.store().flush().await.expect("Flush failed");
    }

    #[tokio::test]
    async fn falls_back_to_backup_when_canonical_is_not_a_snapshot() {
        let junk_files: [&[u8]; 4] = [b"{}", b"[]", br#"{"missions": []}"#, br#"{"version": "1"}"#];
        for junk in junk_files {
            let dir = TempDir::new().unwrap();
            two_generations(dir.path()).await;
            fs::write(dir.path().join("missions.json"), junk).unwrap();

            let reopened = open(dir.path());
            assert!(
                reopened.get_mission("one").is_ok(),
                "backup not used for {}",
                String::from_utf8_lossy(junk)
            );
            assert_eq!(
                reopened.store().metrics().last_load_source,
                Some(LoadSource::Backup)
            );
        }
    }

    #[tokio::test]
    async fn falls_back_to_backup_when_no_mission_record_decodes() {
        let dir = TempDir::new().unwrap();
        two_generations(dir.path()).await;
        fs::write(
            dir.path().join("missions.json"),
            br#"{"version":"1","missions":[["x",{"bad":1}]]}"#,
        )
        .unwrap();

        let reopened = open(dir.path());
        assert!(reopened.get_mission("one").is_ok());
        assert!(reopened.get_mission("x").is_err());
        assert_eq!(
            reopened.store().metrics().last_load_source,
            Some(LoadSource::Backup)
        );

        // The unreadable file is kept aside and never rotated into the backup.
        assert!(dir.path().join("missions.json.corrupt").exists());
        define(&reopened, "three");
        reopened.store().flush().await.expect("Flush failed");
        drop(reopened);

        let backup = read_snapshot(&dir.path().join("missions.json.bak"));
        assert_eq!(backup.missions.len(), 1);
        assert_eq!(backup.missions[0].0, "one");
        let canonical = read_snapshot(&dir.path().join("missions.json"));
        let ids: Vec<&str> = canonical.missions.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["one", "three"]);
    }

    #[tokio::test]
    async fn empty_snapshot_loads_from_canonical() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());
        define(&service, "temporary");
        service.store().flush().await.expect("Flush failed");
        service.delete_mission("temporary").unwrap();
        service.store().flush().await.expect("Flush failed");
        drop(service);

        let reopened = open(dir.path());
        assert!(reopened.list_missions(None).is_empty());
        assert_eq!(
            reopened.store().metrics().last_load_source,
            Some(LoadSource::Canonical)
        );
    }

    #[tokio::test]
    async fn starts_empty_when_both_files_are_corrupt() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("missions.json"), b"{{{").unwrap();
        fs::write(dir.path().join("missions.json.bak"), b"]]]").unwrap();

        let service = open(dir.path());
        assert!(service.list_missions(None).is_empty());
        assert_eq!(
            service.store().metrics().last_load_source,
            Some(LoadSource::Discarded)
        );
    }

    #[tokio::test]
    async fn tolerates_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());
        define(&service, "old");
        service.store().flush().await.expect("Flush failed");
        drop(service);

        let path = dir.path().join("missions.json");
        let mut raw: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        raw["version"] = json!("0");
        fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

        let reopened = open(dir.path());
        assert!(reopened.get_mission("old").is_ok());
    }

    #[tokio::test]
    async fn skips_records_that_no_longer_decode() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());
        define(&service, "good");
        service.store().flush().await.expect("Flush failed");
        drop(service);

        let path = dir.path().join("missions.json");
        let mut raw: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        raw["missions"]
            .as_array_mut()
            .unwrap()
            .push(json!(["broken", { "id": "broken", "state": "SIDEWAYS" }]));
        fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

        let reopened = open(dir.path());
        assert!(reopened.get_mission("good").is_ok());
        assert!(reopened.get_mission("broken").is_err());
        assert_eq!(
            reopened.store().metrics().last_load_source,
            Some(LoadSource::Canonical)
        );
    }
}

// ============================================================
// Debounced flush and shutdown
// ============================================================

mod flushing {
    use super::*;

    #[tokio::test]
    async fn burst_of_mutations_writes_once() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());

        define(&service, "burst");
        for value in [1.0, 2.0, 3.0, 4.0] {
            submit(&service, "burst", value);
        }
        assert_eq!(service.store().metrics().save_count, 0);

        tokio::time::sleep(DEBOUNCE * 6).await;

        let metrics = service.store().metrics();
        assert_eq!(metrics.save_count, 1);
        assert!(!service.store().is_dirty());

        let canonical = read_snapshot(&dir.path().join("missions.json"));
        assert_eq!(canonical.missions[0].1.attempts.len(), 4);
    }

    #[tokio::test]
    async fn failed_background_flush_keeps_state_dirty_and_retries() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());
        let blocker = dir.path().join("missions.json.tmp");
        fs::create_dir(&blocker).unwrap();

        define(&service, "pending");
        tokio::time::sleep(DEBOUNCE * 6).await;

        assert!(service.store().is_dirty());
        let metrics = service.store().metrics();
        assert_eq!(metrics.failed_save_count, 1);
        assert_eq!(metrics.save_count, 0);
        assert!(metrics.last_save_error.is_some());
        assert!(service.get_mission("pending").is_ok());
        assert!(!dir.path().join("missions.json").exists());

        fs::remove_dir(&blocker).unwrap();
        define(&service, "retried");
        tokio::time::sleep(DEBOUNCE * 6).await;

        assert!(!service.store().is_dirty());
        assert_eq!(service.store().metrics().save_count, 1);
        let canonical = read_snapshot(&dir.path().join("missions.json"));
        let ids: Vec<&str> = canonical.missions.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["pending", "retried"]);
    }

    #[tokio::test]
    async fn reads_never_schedule_a_write() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());
        define(&service, "quiet");
        service.store().flush().await.expect("Flush failed");
        let saves = service.store().metrics().save_count;

        service.get_status("quiet").unwrap();
        service.list_missions(None);
        tokio::time::sleep(DEBOUNCE * 4).await;

        assert_eq!(service.store().metrics().save_count, saves);
    }

    #[tokio::test]
    async fn shutdown_flushes_once() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());
        define(&service, "final");

        service.store().shutdown().await.expect("Shutdown failed");
        service.store().shutdown().await.expect("Second shutdown failed");

        assert_eq!(service.store().metrics().save_count, 1);
        assert!(dir.path().join("missions.json").exists());
    }

    #[tokio::test]
    async fn shutdown_skips_write_when_clean() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());

        service.store().shutdown().await.expect("Shutdown failed");

        assert_eq!(service.store().metrics().save_count, 0);
        assert!(!dir.path().join("missions.json").exists());
    }

    #[tokio::test]
    async fn in_memory_store_never_touches_disk() {
        let service = MissionService::new(PersistentStore::in_memory());
        define(&service, "ephemeral");

        service.store().flush().await.expect("Flush failed");
        assert!(!service.store().is_persistent());
        assert_eq!(service.store().metrics().save_count, 0);
        assert_eq!(
            service.store().metrics().last_load_source,
            Some(LoadSource::Memory)
        );
    }

    #[tokio::test]
    async fn records_save_metrics() {
        let dir = TempDir::new().unwrap();
        let service = open(dir.path());
        define(&service, "measured");
        service.store().flush().await.expect("Flush failed");
        service.store().flush().await.expect("Flush failed");

        let metrics = service.store().metrics();
        assert_eq!(metrics.save_count, 2);
        assert!(metrics.last_save_ms.is_some());
        assert!(metrics.average_save_ms.is_some());
        assert!(metrics.last_serialize_ms.is_some());
        assert!(metrics.last_snapshot_bytes.unwrap_or(0) > 0);
        assert!(metrics.last_save_at.is_some());
    }
}

// ============================================================
// Retention
// ============================================================

mod retention {
    use super::*;

    fn open_with_retention(dir: &Path, completed: u32, failed: u32) -> MissionService {
        let store = PersistentStore::open(config(dir).with_retention_days(completed, failed))
            .expect("Failed to open store");
        MissionService::new(store)
    }

    fn finish_three(service: &MissionService) {
        define(service, "done");
        submit(service, "done", 99.0);

        define(service, "exhausted");
        for _ in 0..5 {
            submit(service, "exhausted", 1.0);
        }
        assert!(service
            .submit_attempt("exhausted", SubmitAttemptInput::default())
            .is_err());

        define(service, "running");
        submit(service, "running", 1.0);
    }

    #[tokio::test]
    async fn sweeps_only_expired_terminal_missions() {
        let dir = TempDir::new().unwrap();
        let service = open_with_retention(dir.path(), 30, 7);
        finish_three(&service);
        service.save_checkpoint("done", json!("cp")).unwrap();

        let in_ten_days = chrono::Utc::now() + chrono::Duration::days(10);
        let removed = service.store().sweep_expired_at(in_ten_days);
        assert_eq!(removed, vec!["exhausted".to_string()]);

        let in_forty_days = chrono::Utc::now() + chrono::Duration::days(40);
        let removed = service.store().sweep_expired_at(in_forty_days);
        assert_eq!(removed, vec!["done".to_string()]);
        assert!(service.store().checkpoints_for("done").is_empty());

        assert!(service.get_mission("running").is_ok());
    }

    #[tokio::test]
    async fn zero_days_keeps_missions_forever() {
        let dir = TempDir::new().unwrap();
        let service = open_with_retention(dir.path(), 0, 0);
        finish_three(&service);

        let far_future = chrono::Utc::now() + chrono::Duration::days(3650);
        assert!(service.store().sweep_expired_at(far_future).is_empty());
        assert_eq!(service.list_missions(None).len(), 3);
    }

    #[tokio::test]
    async fn aborted_missions_are_never_swept() {
        let dir = TempDir::new().unwrap();
        let service = open_with_retention(dir.path(), 1, 1);
        define(&service, "abandoned");
        service.abort_mission("abandoned", None).unwrap();

        let later = chrono::Utc::now() + chrono::Duration::days(30);
        assert!(service.store().sweep_expired_at(later).is_empty());
    }
}
