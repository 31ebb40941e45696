use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::attempt::{Attempt, AttemptValue, ValidationResult};
use super::criteria::ValidationStrategy;
use crate::error::MissionError;

/// Attempt budget used when a definition does not name one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// A retryable task with a goal and a pass/fail rule.
///
/// `current_attempt` always equals `attempts.len()`; it is kept alongside the
/// list so status queries and counter restoration never walk the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub goal: String,
    /// Free-form context from the definer, e.g. the command being iterated on.
    #[serde(default)]
    pub context: Option<String>,
    pub criteria: ValidationStrategy,
    pub max_attempts: u32,
    pub state: MissionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: Vec<Attempt>,
    #[serde(default)]
    pub current_attempt: u32,
    pub success: Option<bool>,
    pub error_message: Option<String>,
}

impl Mission {
    /// A fresh `PENDING` mission.
    pub fn new(
        id: String,
        goal: String,
        criteria: ValidationStrategy,
        max_attempts: u32,
        context: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            goal,
            context,
            criteria,
            max_attempts,
            state: MissionState::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            attempts: Vec::new(),
            current_attempt: 0,
            success: None,
            error_message: None,
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.current_attempt)
    }

    pub fn last_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// Move to `to`, stamping `updated_at` and, for terminal states,
    /// `completed_at`. Rejects any move the state machine does not allow.
    pub fn transition(&mut self, to: MissionState) -> Result<(), MissionError> {
        if !self.state.can_transition_to(to) {
            return Err(MissionError::InvalidTransition {
                mission_id: self.id.clone(),
                from: self.state,
                to,
            });
        }

        let now = Utc::now();
        self.state = to;
        self.updated_at = now;
        if to.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    pub fn summary(&self) -> MissionSummary {
        MissionSummary {
            id: self.id.clone(),
            goal: self.goal.clone(),
            criteria_type: self.criteria.kind().to_string(),
            state: self.state,
            current_attempt: self.current_attempt,
            max_attempts: self.max_attempts,
            success: self.success,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        }
    }
}

/// Lifecycle state of a mission.
///
/// ```text
/// PENDING -> IN_PROGRESS -> COMPLETED | FAILED | ABORTED
/// ```
///
/// The three right-hand states are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Aborted,
}

impl MissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "ABORTED" => Some(Self::Aborted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    pub fn can_transition_to(&self, to: MissionState) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
                | (Self::InProgress, Self::Aborted)
        )
    }
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for defining a new mission.
///
/// `criteria` stays raw JSON until definition so malformed rules are reported
/// field by field as `InvalidCriteria`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefineMissionInput {
    /// Caller-chosen id. A UUID is generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub goal: String,
    pub criteria: Value,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub context: Option<String>,
    /// Accept the mission immediately (default). When false it stays PENDING
    /// until activated.
    #[serde(default)]
    pub start: Option<bool>,
}

/// Input for submitting one attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitAttemptInput {
    #[serde(default)]
    pub output: String,
    /// Takes precedence over anything extracted from `output`.
    #[serde(default)]
    pub value: Option<AttemptValue>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

/// Input for aborting a mission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AbortMissionInput {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Result of a submitted attempt that was accepted and validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub mission_id: String,
    pub attempt_number: u32,
    pub passed: bool,
    /// True when no further attempt will be accepted: the attempt passed or
    /// the budget is spent.
    #[serde(rename = "final")]
    pub is_final: bool,
    pub state: MissionState,
    pub feedback: String,
    pub progress_summary: String,
    pub remaining_attempts: u32,
    /// Near-limit warning from the attempt counter, absent once the mission
    /// has passed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub validation_result: ValidationResult,
}

/// Point-in-time view of a mission for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionStatus {
    pub id: String,
    pub goal: String,
    pub criteria: ValidationStrategy,
    pub state: MissionState,
    pub current_attempt: u32,
    pub max_attempts: u32,
    pub attempts_remaining: u32,
    pub progress_percentage: f64,
    pub last_result: Option<ValidationResult>,
    pub attempt_history_summary: Vec<AttemptSummary>,
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One line of attempt history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub attempt_number: u32,
    pub passed: bool,
    pub actual_value: Option<AttemptValue>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Attempt> for AttemptSummary {
    fn from(attempt: &Attempt) -> Self {
        Self {
            attempt_number: attempt.attempt_number,
            passed: attempt.validation_result.passed,
            actual_value: attempt.validation_result.actual_value.clone(),
            message: attempt.validation_result.message.clone(),
            timestamp: attempt.timestamp,
        }
    }
}

/// Compact listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionSummary {
    pub id: String,
    pub goal: String,
    pub criteria_type: String,
    pub state: MissionState,
    pub current_attempt: u32,
    pub max_attempts: u32,
    pub success: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Confirmation returned by a successful abort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortConfirmation {
    pub mission_id: String,
    pub state: MissionState,
    pub reason: String,
    pub attempts_used: u32,
    pub aborted_at: DateTime<Utc>,
}
