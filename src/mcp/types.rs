//! Request and response types for MCP tools.

use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::MissionSummary;

// ============================================================
// Request Types
// ============================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DefineMissionRequest {
    #[schemars(description = "What the mission should achieve, in one or two sentences")]
    pub goal: String,
    #[schemars(
        description = "Success criteria. One of: {\"type\": \"NUMERIC\", \"operator\": \"GREATER_THAN_OR_EQUAL\", \"threshold\": 90, \"metric_name\": \"coverage\"}, {\"type\": \"EXIT_CODE\", \"expected_code\": 0}, {\"type\": \"KEYWORD\", \"keyword\": \"PASSED\", \"must_contain\": true}"
    )]
    pub criteria: Value,
    #[schemars(description = "How many attempts are allowed. Defaults to 10.")]
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[schemars(description = "Optional mission id. A UUID is generated when omitted.")]
    #[serde(default)]
    pub mission_id: Option<String>,
    #[schemars(description = "Free-form context, e.g. the command being iterated on")]
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubmitAttemptRequest {
    #[schemars(description = "The id of the mission this attempt belongs to")]
    pub mission_id: String,
    #[schemars(description = "Raw output of the attempt (command output, test report, ...)")]
    #[serde(default)]
    pub output: String,
    #[schemars(
        description = "Explicit result value. A number for NUMERIC and EXIT_CODE criteria; takes precedence over anything parsed from output."
    )]
    #[serde(default)]
    pub value: Option<Value>,
    #[schemars(description = "How long the attempt took, in milliseconds")]
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetMissionStatusRequest {
    #[schemars(description = "The id of the mission to inspect")]
    pub mission_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AbortMissionRequest {
    #[schemars(description = "The id of the mission to abort")]
    pub mission_id: String,
    #[schemars(description = "Why the mission is being abandoned")]
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListMissionsRequest {
    #[schemars(
        description = "Only list missions in this state: PENDING, IN_PROGRESS, COMPLETED, FAILED or ABORTED"
    )]
    #[serde(default)]
    pub state: Option<String>,
}

// ============================================================
// Response Types
// ============================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MissionInfo {
    pub mission_id: String,
    pub goal: String,
    pub criteria_type: String,
    pub state: String,
    pub current_attempt: u32,
    pub max_attempts: u32,
}

impl From<MissionSummary> for MissionInfo {
    fn from(mission: MissionSummary) -> Self {
        Self {
            mission_id: mission.id,
            goal: mission.goal,
            criteria_type: mission.criteria_type,
            state: mission.state.as_str().to_string(),
            current_attempt: mission.current_attempt,
            max_attempts: mission.max_attempts,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MissionListResponse {
    pub missions: Vec<MissionInfo>,
}

/// Body of the error result returned when a mission has run out of attempts.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExhaustedResponse {
    pub mission_id: String,
    pub error: String,
    pub state: String,
    #[serde(rename = "final")]
    pub is_final: bool,
}
