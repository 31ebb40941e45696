use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A mid-mission snapshot supplied by the caller.
///
/// Checkpoints are persisted alongside missions and removed with them, but
/// nothing in mission orchestration reads them back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub mission_id: String,
    /// The mission's attempt count when the checkpoint was taken.
    pub attempt_number: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

/// Input for storing a checkpoint against a mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckpointInput {
    #[serde(default)]
    pub data: Value,
}
