use std::sync::LazyLock;

use regex::Regex;

use super::Validator;
use crate::models::{AttemptValue, ComparisonOperator, ValidationResult};

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d+(?:\.\d+)?").expect("number pattern is valid"));

/// Compares a metric against a threshold.
///
/// The metric is the explicit `value` when numeric, otherwise the leftmost
/// signed decimal number in the output.
#[derive(Debug, Clone, Copy)]
pub struct NumericValidator<'a> {
    operator: ComparisonOperator,
    threshold: f64,
    metric_name: &'a str,
}

impl<'a> NumericValidator<'a> {
    pub fn new(operator: ComparisonOperator, threshold: f64, metric_name: Option<&'a str>) -> Self {
        Self {
            operator,
            threshold,
            metric_name: metric_name.unwrap_or("value"),
        }
    }

    fn target(&self) -> String {
        format!(
            "{} {}",
            self.operator.symbol(),
            AttemptValue::Number(self.threshold)
        )
    }
}

/// First signed decimal number in `output`, if any.
pub fn extract_number(output: &str) -> Option<f64> {
    NUMBER
        .find(output)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

impl Validator for NumericValidator<'_> {
    fn validate(&self, output: &str, value: Option<&AttemptValue>) -> ValidationResult {
        let expected = Some(AttemptValue::Number(self.threshold));
        let actual = value
            .and_then(AttemptValue::as_number)
            .or_else(|| extract_number(output));

        let Some(actual) = actual else {
            return ValidationResult::new(
                false,
                None,
                expected,
                format!("Could not extract a numeric {} from the output", self.metric_name),
            );
        };

        let passed = self.operator.compare(actual, self.threshold);
        let actual = AttemptValue::Number(actual);
        let message = if passed {
            format!("{} {} meets target {}", self.metric_name, actual, self.target())
        } else {
            format!(
                "{} {} does not meet target {}",
                self.metric_name,
                actual,
                self.target()
            )
        };

        ValidationResult::new(passed, Some(actual), expected, message)
    }

    fn feedback(&self, result: &ValidationResult) -> String {
        let Some(actual) = result.actual_value.as_ref().and_then(AttemptValue::as_number) else {
            return format!(
                "{}. Include the {} in the output or pass it explicitly as `value`.",
                result.message, self.metric_name
            );
        };

        if result.passed {
            return format!(
                "Target reached: {} is {} (target {}).",
                self.metric_name,
                AttemptValue::Number(actual),
                self.target()
            );
        }

        let gap = (actual - self.threshold).abs();
        let direction = match self.operator {
            ComparisonOperator::GreaterThan | ComparisonOperator::GreaterThanOrEqual => {
                "Increase it"
            }
            ComparisonOperator::LessThan | ComparisonOperator::LessThanOrEqual => "Decrease it",
            ComparisonOperator::Equal => "Bring it to the threshold",
            ComparisonOperator::NotEqual => "Move it away from the threshold",
        };

        format!(
            "{} is {}, target {}. Gap: {:.2}. {}.",
            self.metric_name,
            AttemptValue::Number(actual),
            self.target(),
            gap,
            direction
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(operator: ComparisonOperator, threshold: f64) -> NumericValidator<'static> {
        NumericValidator::new(operator, threshold, None)
    }

    #[test]
    fn extracts_leftmost_signed_number() {
        assert_eq!(extract_number("took -12.5ms then 40ms"), Some(-12.5));
        assert_eq!(extract_number("coverage: 87%"), Some(87.0));
        assert_eq!(extract_number("no digits here"), None);
    }

    #[test]
    fn explicit_value_wins_over_output() {
        let result = validator(ComparisonOperator::GreaterThan, 100.0)
            .validate("score 10", Some(&AttemptValue::Number(150.0)));
        assert!(result.passed);
        assert_eq!(result.actual_value, Some(AttemptValue::Number(150.0)));
    }

    #[test]
    fn non_numeric_value_falls_back_to_output() {
        let result = validator(ComparisonOperator::LessThan, 5.0)
            .validate("errors: 3", Some(&AttemptValue::from("many")));
        assert!(result.passed);
    }

    #[test]
    fn missing_number_is_an_extraction_failure() {
        let result = validator(ComparisonOperator::GreaterThan, 1.0).validate("nothing", None);
        assert!(!result.passed);
        assert!(result.actual_value.is_none());
        assert!(result.message.contains("Could not extract"));
    }

    #[test]
    fn equality_uses_epsilon() {
        let v = validator(ComparisonOperator::Equal, 100.0);
        assert!(v.validate("", Some(&AttemptValue::Number(100.00001))).passed);
        assert!(!v.validate("", Some(&AttemptValue::Number(101.0))).passed);

        let v = validator(ComparisonOperator::NotEqual, 100.0);
        assert!(!v.validate("", Some(&AttemptValue::Number(100.00001))).passed);
        assert!(v.validate("", Some(&AttemptValue::Number(101.0))).passed);
    }

    #[test]
    fn feedback_reports_gap_with_two_decimals() {
        let v = validator(ComparisonOperator::GreaterThanOrEqual, 90.0);
        let result = v.validate("coverage 72.3", None);
        let feedback = v.feedback(&result);
        assert!(feedback.contains("Gap: 17.70"), "{feedback}");
    }
}
