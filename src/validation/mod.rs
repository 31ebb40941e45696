//! Validators for the three criteria kinds.
//!
//! Every validator is a pure function of `(output, value)`. An explicit
//! `value` always wins over anything parsed out of `output`.

mod exit_code;
mod keyword;
mod numeric;

pub use exit_code::ExitCodeValidator;
pub use keyword::KeywordValidator;
pub use numeric::NumericValidator;

use crate::models::{AttemptValue, ValidationResult, ValidationStrategy};

pub trait Validator {
    fn validate(&self, output: &str, value: Option<&AttemptValue>) -> ValidationResult;

    /// Guidance for the caller based on a result this validator produced.
    fn feedback(&self, result: &ValidationResult) -> String;
}

/// Build the validator matching `criteria`.
pub fn validator_for(criteria: &ValidationStrategy) -> Box<dyn Validator + '_> {
    match criteria {
        ValidationStrategy::Numeric {
            operator,
            threshold,
            metric_name,
        } => Box::new(NumericValidator::new(
            *operator,
            *threshold,
            metric_name.as_deref(),
        )),
        ValidationStrategy::ExitCode {
            expected_code,
            command,
        } => Box::new(ExitCodeValidator::new(*expected_code, command.as_deref())),
        ValidationStrategy::Keyword {
            keyword,
            must_contain,
            case_sensitive,
        } => Box::new(KeywordValidator::new(
            keyword,
            *must_contain,
            case_sensitive.unwrap_or(true),
        )),
    }
}

pub fn validate(
    criteria: &ValidationStrategy,
    output: &str,
    value: Option<&AttemptValue>,
) -> ValidationResult {
    validator_for(criteria).validate(output, value)
}
