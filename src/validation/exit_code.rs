use std::sync::LazyLock;

use regex::Regex;

use super::Validator;
use crate::models::{AttemptValue, ValidationResult};

static EXIT_CODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)exit\s*code:?\s*(-?\d+)",
        r"(?i)returned:?\s*(-?\d+)",
        r"(?i)status:?\s*(-?\d+)",
        r"(?m)^\s*(-?\d+)\s*$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("exit code pattern is valid"))
    .collect()
});

/// Requires an exact process exit code.
#[derive(Debug, Clone, Copy)]
pub struct ExitCodeValidator<'a> {
    expected_code: i64,
    command: Option<&'a str>,
}

impl<'a> ExitCodeValidator<'a> {
    pub fn new(expected_code: i64, command: Option<&'a str>) -> Self {
        Self {
            expected_code,
            command,
        }
    }
}

/// Exit code reported in `output`, tried against each known phrasing in turn.
pub fn extract_exit_code(output: &str) -> Option<i64> {
    EXIT_CODE_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(output)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok())
    })
}

impl Validator for ExitCodeValidator<'_> {
    fn validate(&self, output: &str, value: Option<&AttemptValue>) -> ValidationResult {
        let expected = Some(AttemptValue::from(self.expected_code));

        let actual = match value.and_then(AttemptValue::as_number) {
            Some(n) if n.fract() == 0.0 => Some(n as i64),
            Some(n) => {
                return ValidationResult::new(
                    false,
                    Some(AttemptValue::Number(n)),
                    expected,
                    format!("Value {} is not an integer exit code", n),
                );
            }
            None => extract_exit_code(output),
        };

        let Some(actual) = actual else {
            return ValidationResult::new(
                false,
                None,
                expected,
                "Could not determine an exit code from the output",
            );
        };

        let passed = actual == self.expected_code;
        let message = if passed {
            format!("Exit code {} matches expected {}", actual, self.expected_code)
        } else {
            format!(
                "Exit code {} does not match expected {}",
                actual, self.expected_code
            )
        };

        ValidationResult::new(passed, Some(AttemptValue::from(actual)), expected, message)
    }

    fn feedback(&self, result: &ValidationResult) -> String {
        let subject = match self.command {
            Some(command) => format!("`{}`", command),
            None => "The command".to_string(),
        };

        match (&result.actual_value, result.passed) {
            (_, true) => format!("{} exited with {} as expected.", subject, self.expected_code),
            (None, false) => format!(
                "{}. Report it as `exit code: N` in the output or pass it as `value`.",
                result.message
            ),
            (Some(actual), false) => format!(
                "{} exited with {} but {} is required. Inspect the error output before retrying.",
                subject, actual, self.expected_code
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_phrasings() {
        assert_eq!(extract_exit_code("Process Exit Code: 2"), Some(2));
        assert_eq!(extract_exit_code("command returned: 127"), Some(127));
        assert_eq!(extract_exit_code("STATUS: -1"), Some(-1));
        assert_eq!(extract_exit_code("build log\n0\n"), Some(0));
        assert_eq!(extract_exit_code("all good"), None);
    }

    #[test]
    fn negative_codes_compare_literally() {
        let v = ExitCodeValidator::new(-1, None);
        assert!(v.validate("", Some(&AttemptValue::Number(-1.0))).passed);
        assert!(!v.validate("", Some(&AttemptValue::Number(255.0))).passed);
    }

    #[test]
    fn fractional_value_is_rejected() {
        let result = ExitCodeValidator::new(0, None).validate("exit code: 0", Some(&AttemptValue::Number(0.5)));
        assert!(!result.passed);
    }

    #[test]
    fn unparseable_output_fails_extraction() {
        let result = ExitCodeValidator::new(0, Some("cargo test")).validate("done", None);
        assert!(!result.passed);
        assert!(result.actual_value.is_none());
    }
}
