use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stored attempt output is capped at 1 MiB.
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// One submitted result, evaluated against the mission's criteria.
///
/// Attempts are append-only: numbers start at 1 and increase by exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub attempt_number: u32,
    pub timestamp: DateTime<Utc>,
    /// Output as submitted, truncated to [`MAX_OUTPUT_BYTES`] with a marker.
    pub output: String,
    pub value: Option<AttemptValue>,
    pub validation_result: ValidationResult,
    /// Wall-clock duration of the attempt as reported by the caller.
    pub duration_ms: Option<u64>,
}

/// The outcome of running a validator against one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub actual_value: Option<AttemptValue>,
    pub expected_value: Option<AttemptValue>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ValidationResult {
    pub fn new(
        passed: bool,
        actual_value: Option<AttemptValue>,
        expected_value: Option<AttemptValue>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            passed,
            actual_value,
            expected_value,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A numeric-or-string value attached to an attempt or a validation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttemptValue {
    Number(f64),
    Text(String),
}

impl AttemptValue {
    /// The numeric reading of this value. Text counts as numeric only when the
    /// whole (trimmed) string parses as a finite number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n).filter(|n| n.is_finite()),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    /// Convert an arbitrary JSON value received from a caller.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            other => Some(Self::Text(other.to_string())),
        }
    }
}

impl fmt::Display for AttemptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for AttemptValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for AttemptValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for AttemptValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AttemptValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Cap `output` at [`MAX_OUTPUT_BYTES`], cutting on a char boundary and
/// appending a marker that records the original size.
pub fn truncate_output(output: &str) -> Cow<'_, str> {
    if output.len() <= MAX_OUTPUT_BYTES {
        return Cow::Borrowed(output);
    }

    let mut end = MAX_OUTPUT_BYTES;
    while !output.is_char_boundary(end) {
        end -= 1;
    }

    Cow::Owned(format!(
        "{}\n...[output truncated: {} of {} bytes kept]",
        &output[..end],
        end,
        output.len()
    ))
}
