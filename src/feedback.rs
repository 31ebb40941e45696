//! Human-readable guidance composed from validation results.

use crate::models::{ValidationResult, ValidationStrategy};
use crate::validation::validator_for;

/// Remaining-attempt count at or below which summaries carry a warning.
pub const NEAR_LIMIT_ATTEMPTS: u32 = 3;

/// Number of identical trailing results that count as stagnation.
pub const STAGNATION_WINDOW: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct FeedbackEngine;

impl FeedbackEngine {
    pub fn new() -> Self {
        Self
    }

    /// Validator guidance behind a pass/fail banner for `attempt_number`.
    pub fn feedback(
        &self,
        criteria: &ValidationStrategy,
        result: &ValidationResult,
        attempt_number: u32,
    ) -> String {
        let banner = if result.passed {
            format!("PASSED on attempt {}", attempt_number)
        } else {
            format!("FAILED on attempt {}", attempt_number)
        };

        format!("{}: {}", banner, validator_for(criteria).feedback(result))
    }

    /// Progress line with near-limit and stagnation warnings.
    ///
    /// Stagnation is a hint that the caller keeps repeating the same action,
    /// not a reason to stop accepting attempts.
    pub fn progress_summary(&self, current: u32, max: u32, recent: &[ValidationResult]) -> String {
        let percentage = if max == 0 {
            100.0
        } else {
            (f64::from(current) / f64::from(max) * 100.0).min(100.0)
        };

        let mut summary = format!(
            "Progress: {}/{} attempts used ({:.0}%)",
            current, max, percentage
        );

        let remaining = max.saturating_sub(current);
        if remaining == 0 {
            summary.push_str(". No attempts remaining");
        } else if remaining <= NEAR_LIMIT_ATTEMPTS {
            summary.push_str(&format!(
                ". Warning: only {} attempt{} remaining",
                remaining,
                if remaining == 1 { "" } else { "s" }
            ));
        }

        if is_stagnating(recent) {
            summary.push_str(&format!(
                ". Stagnation detected: the last {} attempts produced identical results, try a different approach",
                STAGNATION_WINDOW
            ));
        }

        summary
    }
}

/// True when the last [`STAGNATION_WINDOW`] results carry the same message.
pub fn is_stagnating(recent: &[ValidationResult]) -> bool {
    if recent.len() < STAGNATION_WINDOW {
        return false;
    }

    let tail = &recent[recent.len() - STAGNATION_WINDOW..];
    tail.windows(2).all(|pair| pair[0].message == pair[1].message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ComparisonOperator;

    fn failed(message: &str) -> ValidationResult {
        ValidationResult::new(false, None, None, message)
    }

    #[test]
    fn banner_names_the_attempt() {
        let criteria = ValidationStrategy::Numeric {
            operator: ComparisonOperator::GreaterThan,
            threshold: 10.0,
            metric_name: None,
        };
        let result = ValidationResult::new(true, Some(12.0_f64.into()), Some(10.0_f64.into()), "ok");
        let text = FeedbackEngine::new().feedback(&criteria, &result, 4);
        assert!(text.starts_with("PASSED on attempt 4"));
    }

    #[test]
    fn summary_warns_near_limit() {
        let engine = FeedbackEngine::new();
        assert!(!engine.progress_summary(2, 10, &[]).contains("Warning"));
        assert!(engine
            .progress_summary(8, 10, &[])
            .contains("only 2 attempts remaining"));
        assert!(engine.progress_summary(5, 5, &[]).contains("No attempts remaining"));
    }

    #[test]
    fn summary_reports_percentage() {
        assert!(FeedbackEngine::new()
            .progress_summary(1, 4, &[])
            .starts_with("Progress: 1/4 attempts used (25%)"));
    }

    #[test]
    fn stagnation_needs_three_identical_messages() {
        assert!(!is_stagnating(&[failed("a"), failed("a")]));
        assert!(!is_stagnating(&[failed("a"), failed("b"), failed("a")]));
        assert!(is_stagnating(&[failed("b"), failed("a"), failed("a"), failed("a")]));
    }
}
