use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::LoadSource;

/// Persistence counters. Reading them has no side effects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreMetrics {
    pub save_count: u64,
    pub failed_save_count: u64,
    pub last_save_ms: Option<f64>,
    pub average_save_ms: Option<f64>,
    pub last_save_at: Option<DateTime<Utc>>,
    pub last_save_error: Option<String>,
    pub load_count: u64,
    pub last_load_ms: Option<f64>,
    pub average_load_ms: Option<f64>,
    pub last_load_source: Option<LoadSource>,
    pub last_serialize_ms: Option<f64>,
    pub last_deserialize_ms: Option<f64>,
    pub last_snapshot_bytes: Option<u64>,
    #[serde(skip)]
    total_save_ms: f64,
    #[serde(skip)]
    total_load_ms: f64,
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

impl StoreMetrics {
    pub(crate) fn record_save(&mut self, total: Duration, serialize: Duration, bytes: usize) {
        let ms = millis(total);
        self.save_count += 1;
        self.total_save_ms += ms;
        self.last_save_ms = Some(ms);
        self.average_save_ms = Some(self.total_save_ms / self.save_count as f64);
        self.last_save_at = Some(Utc::now());
        self.last_save_error = None;
        self.last_serialize_ms = Some(millis(serialize));
        self.last_snapshot_bytes = Some(bytes as u64);
    }

    pub(crate) fn record_save_failure(&mut self, error: &impl std::fmt::Display) {
        self.failed_save_count += 1;
        self.last_save_error = Some(error.to_string());
    }

    pub(crate) fn record_load(
        &mut self,
        total: Duration,
        deserialize: Duration,
        bytes: usize,
        source: LoadSource,
    ) {
        let ms = millis(total);
        self.load_count += 1;
        self.total_load_ms += ms;
        self.last_load_ms = Some(ms);
        self.average_load_ms = Some(self.total_load_ms / self.load_count as f64);
        self.last_load_source = Some(source);
        self.last_deserialize_ms = Some(millis(deserialize));
        if bytes > 0 {
            self.last_snapshot_bytes = Some(bytes as u64);
        }
    }
}
