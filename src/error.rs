use thiserror::Error;

use crate::models::MissionState;

pub type Result<T, E = MissionError> = std::result::Result<T, E>;

/// Errors surfaced by mission operations and the persistent store.
#[derive(Debug, Error)]
pub enum MissionError {
    #[error("Mission not found: {0}")]
    NotFound(String),

    #[error("Mission already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Mission {mission_id} is not in progress (current state: {state})")]
    NotInProgress {
        mission_id: String,
        state: MissionState,
    },

    #[error("Mission {mission_id} cannot move from {from} to {to}")]
    InvalidTransition {
        mission_id: String,
        from: MissionState,
        to: MissionState,
    },

    /// The mission has been moved to `FAILED`. This is a terminal outcome,
    /// never something to retry.
    #[error("Maximum attempts exceeded ({max_attempts}) for mission {mission_id}")]
    MaxAttemptsExceeded {
        mission_id: String,
        max_attempts: u32,
    },

    #[error("Invalid attempt count: {current} (allowed range 0..={max})")]
    InvalidAttemptCount { current: u32, max: u32 },

    #[error("Persistence failure: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupted state: {0}")]
    CorruptedState(String),
}

impl MissionError {
    /// True for errors caused by the caller's request rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::AlreadyExists(_)
                | Self::InvalidCriteria(_)
                | Self::InvalidInput(_)
                | Self::NotInProgress { .. }
                | Self::InvalidTransition { .. }
                | Self::MaxAttemptsExceeded { .. }
                | Self::InvalidAttemptCount { .. }
        )
    }
}
