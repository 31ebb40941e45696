//! Mission orchestration: definition, attempt submission and the state
//! machine that ties the counter, validators and feedback together.

mod counter;

pub use counter::*;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{MissionError, Result};
use crate::feedback::{FeedbackEngine, STAGNATION_WINDOW};
use crate::models::*;
use crate::store::PersistentStore;
use crate::validation;

/// Error message recorded on missions that ran out of attempts.
pub const MAX_ATTEMPTS_MESSAGE: &str = "Maximum attempts exceeded";

const DEFAULT_ABORT_REASON: &str = "Aborted by caller";

/// Entry point for every mission operation exposed to callers.
#[derive(Clone)]
pub struct MissionService {
    store: PersistentStore,
    feedback: FeedbackEngine,
}

/// What a submission did to the mission, decided under the store lock.
enum Submission {
    Accepted(Box<SubmitOutcome>),
    Exhausted { max_attempts: u32 },
}

impl MissionService {
    pub fn new(store: PersistentStore) -> Self {
        Self {
            store,
            feedback: FeedbackEngine::new(),
        }
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    // ============================================================
    // Definition and lifecycle
    // ============================================================

    /// Create a mission and accept it for work.
    ///
    /// The criteria are validated before anything is stored; a malformed rule
    /// never produces a mission.
    pub fn define_mission(&self, input: DefineMissionInput) -> Result<Mission> {
        let criteria = ValidationStrategy::from_value(&input.criteria)?;

        let max_attempts = input.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(MissionError::InvalidInput(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if input.goal.trim().is_empty() {
            return Err(MissionError::InvalidInput(
                "goal must not be empty".to_string(),
            ));
        }

        let id = match input.id {
            Some(id) if id.trim().is_empty() => {
                return Err(MissionError::InvalidInput(
                    "id must not be blank".to_string(),
                ));
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let mut mission = Mission::new(id, input.goal, criteria, max_attempts, input.context);
        if input.start.unwrap_or(true) {
            mission.transition(MissionState::InProgress)?;
        }

        self.store.insert_mission(mission.clone())?;

        info!(
            mission_id = %mission.id,
            criteria = mission.criteria.kind(),
            max_attempts,
            state = %mission.state,
            "Mission defined"
        );
        Ok(mission)
    }

    /// Move a PENDING mission to IN_PROGRESS.
    pub fn activate_mission(&self, mission_id: &str) -> Result<Mission> {
        let mission = self.store.update_mission(mission_id, |mission| {
            mission.transition(MissionState::InProgress)?;
            Ok(mission.clone())
        })?;

        info!(mission_id, "Mission activated");
        Ok(mission)
    }

    pub fn abort_mission(&self, mission_id: &str, reason: Option<String>) -> Result<AbortConfirmation> {
        let confirmation = self.store.update_mission(mission_id, |mission| {
            if mission.state != MissionState::InProgress {
                return Err(MissionError::NotInProgress {
                    mission_id: mission.id.clone(),
                    state: mission.state,
                });
            }

            let reason = reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ABORT_REASON.to_string());

            mission.transition(MissionState::Aborted)?;
            mission.success = Some(false);
            mission.error_message = Some(reason.clone());

            Ok(AbortConfirmation {
                mission_id: mission.id.clone(),
                state: mission.state,
                reason,
                attempts_used: mission.current_attempt,
                aborted_at: mission.completed_at.unwrap_or(mission.updated_at),
            })
        })?;

        info!(mission_id, reason = %confirmation.reason, "Mission aborted");
        Ok(confirmation)
    }

    pub fn delete_mission(&self, mission_id: &str) -> Result<()> {
        if !self.store.delete_mission(mission_id) {
            return Err(MissionError::NotFound(mission_id.to_string()));
        }
        info!(mission_id, "Mission deleted");
        Ok(())
    }

    // ============================================================
    // Attempts
    // ============================================================

    /// Validate one attempt and advance the mission.
    ///
    /// A submission past the attempt budget moves the mission to FAILED and
    /// returns [`MissionError::MaxAttemptsExceeded`]; the transition is
    /// persisted before the error is returned.
    pub fn submit_attempt(&self, mission_id: &str, input: SubmitAttemptInput) -> Result<SubmitOutcome> {
        let submission = self
            .store
            .update_mission(mission_id, |mission| self.apply_attempt(mission, input))?;

        match submission {
            Submission::Accepted(outcome) => Ok(*outcome),
            Submission::Exhausted { max_attempts } => Err(MissionError::MaxAttemptsExceeded {
                mission_id: mission_id.to_string(),
                max_attempts,
            }),
        }
    }

    fn apply_attempt(&self, mission: &mut Mission, input: SubmitAttemptInput) -> Result<Submission> {
        if mission.state != MissionState::InProgress {
            return Err(MissionError::NotInProgress {
                mission_id: mission.id.clone(),
                state: mission.state,
            });
        }

        let mut counter = AttemptCounter::restore_at(mission.current_attempt, mission.max_attempts)?;
        let tick = match counter.increment() {
            Ok(tick) => tick,
            Err(_) => {
                mission.transition(MissionState::Failed)?;
                mission.success = Some(false);
                mission.error_message = Some(MAX_ATTEMPTS_MESSAGE.to_string());
                warn!(
                    mission_id = %mission.id,
                    max_attempts = mission.max_attempts,
                    "Mission failed: attempts exhausted"
                );
                return Ok(Submission::Exhausted {
                    max_attempts: mission.max_attempts,
                });
            }
        };

        // Validation sees the full output; only the stored copy is capped.
        let result = validation::validate(&mission.criteria, &input.output, input.value.as_ref());
        let now = Utc::now();

        mission.attempts.push(Attempt {
            attempt_number: tick.attempt,
            timestamp: now,
            output: truncate_output(&input.output).into_owned(),
            value: input.value,
            validation_result: result.clone(),
            duration_ms: input.duration_ms,
        });
        mission.current_attempt = tick.attempt;
        mission.updated_at = now;

        if result.passed {
            mission.transition(MissionState::Completed)?;
            mission.success = Some(true);
            info!(mission_id = %mission.id, attempt = tick.attempt, "Mission completed");
        }

        let recent: Vec<ValidationResult> = mission
            .attempts
            .iter()
            .rev()
            .take(STAGNATION_WINDOW)
            .rev()
            .map(|attempt| attempt.validation_result.clone())
            .collect();

        let remaining = mission.attempts_remaining();
        let outcome = SubmitOutcome {
            mission_id: mission.id.clone(),
            attempt_number: tick.attempt,
            passed: result.passed,
            is_final: result.passed || remaining == 0,
            state: mission.state,
            feedback: self.feedback.feedback(&mission.criteria, &result, tick.attempt),
            progress_summary: self.feedback.progress_summary(
                mission.current_attempt,
                mission.max_attempts,
                &recent,
            ),
            remaining_attempts: remaining,
            warning: if result.passed { None } else { tick.warning },
            validation_result: result,
        };

        Ok(Submission::Accepted(Box::new(outcome)))
    }

    // ============================================================
    // Queries
    // ============================================================

    pub fn get_mission(&self, mission_id: &str) -> Result<Mission> {
        self.store
            .get_mission(mission_id)
            .ok_or_else(|| MissionError::NotFound(mission_id.to_string()))
    }

    pub fn get_status(&self, mission_id: &str) -> Result<MissionStatus> {
        let mission = self.get_mission(mission_id)?;

        let progress_percentage = AttemptCounter::restore_at(mission.current_attempt, mission.max_attempts)
            .map(|counter| counter.progress_percentage())
            .unwrap_or(100.0);

        Ok(MissionStatus {
            attempts_remaining: mission.attempts_remaining(),
            progress_percentage,
            last_result: mission
                .last_attempt()
                .map(|attempt| attempt.validation_result.clone()),
            attempt_history_summary: mission.attempts.iter().map(AttemptSummary::from).collect(),
            id: mission.id,
            goal: mission.goal,
            criteria: mission.criteria,
            state: mission.state,
            current_attempt: mission.current_attempt,
            max_attempts: mission.max_attempts,
            success: mission.success,
            error_message: mission.error_message,
            created_at: mission.created_at,
            updated_at: mission.updated_at,
            completed_at: mission.completed_at,
        })
    }

    /// Summaries ordered by creation time, optionally restricted to one state.
    pub fn list_missions(&self, state: Option<MissionState>) -> Vec<MissionSummary> {
        let mut missions: Vec<Mission> = self
            .store
            .list_missions()
            .into_iter()
            .filter(|mission| state.map_or(true, |state| mission.state == state))
            .collect();
        missions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        missions.iter().map(Mission::summary).collect()
    }

    // ============================================================
    // Checkpoints and retention
    // ============================================================

    pub fn save_checkpoint(&self, mission_id: &str, data: Value) -> Result<Checkpoint> {
        let checkpoint = self.store.create_checkpoint(mission_id, data)?;
        info!(mission_id, checkpoint_id = %checkpoint.id, "Checkpoint saved");
        Ok(checkpoint)
    }

    pub fn list_checkpoints(&self, mission_id: &str) -> Result<Vec<Checkpoint>> {
        if !self.store.contains_mission(mission_id) {
            return Err(MissionError::NotFound(mission_id.to_string()));
        }
        Ok(self.store.checkpoints_for(mission_id))
    }

    pub fn sweep_expired(&self) -> Vec<String> {
        self.store.sweep_expired()
    }
}
