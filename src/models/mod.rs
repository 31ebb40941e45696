//! Domain models for mission control.
//!
//! # Core Concepts
//!
//! - [`Mission`]: A retryable task with a goal, a [`ValidationStrategy`] and an
//!   attempt budget. Missions move through [`MissionState`] and never leave a
//!   terminal state once they reach one.
//! - [`Attempt`]: One submitted result, with the [`ValidationResult`] it earned.
//!   Attempts are append-only and numbered 1..N.
//! - [`Checkpoint`]: Caller-supplied mid-mission payload, stored but not read by
//!   orchestration.

mod attempt;
mod checkpoint;
mod criteria;
mod mission;

pub use attempt::*;
pub use checkpoint::*;
pub use criteria::*;
pub use mission::*;
