use super::Validator;
use crate::models::{AttemptValue, ValidationResult};

/// Tests the output for a keyword. The empty keyword is always contained.
#[derive(Debug, Clone, Copy)]
pub struct KeywordValidator<'a> {
    keyword: &'a str,
    must_contain: bool,
    case_sensitive: bool,
}

impl<'a> KeywordValidator<'a> {
    pub fn new(keyword: &'a str, must_contain: bool, case_sensitive: bool) -> Self {
        Self {
            keyword,
            must_contain,
            case_sensitive,
        }
    }

    fn contains(&self, output: &str) -> bool {
        if self.case_sensitive {
            output.contains(self.keyword)
        } else {
            output
                .to_lowercase()
                .contains(&self.keyword.to_lowercase())
        }
    }
}

fn presence(found: bool) -> AttemptValue {
    AttemptValue::from(if found { "present" } else { "absent" })
}

impl Validator for KeywordValidator<'_> {
    // `value` is ignored when it is not text.
    fn validate(&self, output: &str, value: Option<&AttemptValue>) -> ValidationResult {
        let (haystack, source) = match value {
            Some(AttemptValue::Text(text)) => (text.as_str(), "value"),
            _ => (output, "output"),
        };

        let found = self.contains(haystack);
        let passed = found == self.must_contain;
        let message = if found {
            format!("Keyword '{}' found in {}", self.keyword, source)
        } else {
            format!("Keyword '{}' not found in {}", self.keyword, source)
        };

        ValidationResult::new(
            passed,
            Some(presence(found)),
            Some(presence(self.must_contain)),
            message,
        )
    }

    fn feedback(&self, result: &ValidationResult) -> String {
        let mode = if self.case_sensitive {
            "case-sensitive"
        } else {
            "case-insensitive"
        };

        match (result.passed, self.must_contain) {
            (true, true) => format!("Output contains '{}' as required.", self.keyword),
            (true, false) => format!("Output is free of '{}' as required.", self.keyword),
            (false, true) => format!(
                "Output must contain '{}' ({}) but it was not found.",
                self.keyword, mode
            ),
            (false, false) => format!(
                "Output must not contain '{}' ({}) but it was found.",
                self.keyword, mode
            ),
        }
    }
}
