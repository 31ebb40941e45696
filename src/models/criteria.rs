use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MissionError;

/// Tolerance used by `EQUAL` and `NOT_EQUAL` to absorb floating-point noise.
pub const NUMERIC_EPSILON: f64 = 1e-4;

/// The pass/fail rule a mission is validated against.
///
/// Serialized with a `type` tag: `NUMERIC`, `EXIT_CODE` or `KEYWORD`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStrategy {
    /// Compare a number from the attempt against a threshold.
    Numeric {
        operator: ComparisonOperator,
        threshold: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metric_name: Option<String>,
    },
    /// Require a specific process exit code.
    ExitCode {
        expected_code: i64,
        /// The command being iterated on, shown in feedback.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },
    /// Require a keyword to be present in (or absent from) the output.
    Keyword {
        keyword: String,
        must_contain: bool,
        /// Defaults to case-sensitive matching when unset.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        case_sensitive: Option<bool>,
    },
}

impl ValidationStrategy {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Numeric { .. } => "NUMERIC",
            Self::ExitCode { .. } => "EXIT_CODE",
            Self::Keyword { .. } => "KEYWORD",
        }
    }

    /// Parse criteria supplied by a caller, reporting exactly which field is
    /// missing or mistyped.
    ///
    /// Both `snake_case` and `camelCase` field names are accepted, and the tag
    /// may be given as `type` or `strategy`.
    pub fn from_value(value: &Value) -> Result<Self, MissionError> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid("criteria must be a JSON object"))?;

        let kind = field(obj, &["type", "strategy"])
            .ok_or_else(|| invalid("missing strategy type (expected NUMERIC, EXIT_CODE or KEYWORD)"))?
            .as_str()
            .ok_or_else(|| invalid("strategy type must be a string"))?;

        match kind.to_ascii_uppercase().as_str() {
            "NUMERIC" => {
                let operator = match field(obj, &["operator"]) {
                    Some(Value::String(s)) => ComparisonOperator::parse(s).ok_or_else(|| {
                        invalid(format!("unknown operator '{}' for NUMERIC criteria", s))
                    })?,
                    Some(_) => return Err(invalid("NUMERIC operator must be a string")),
                    None => return Err(invalid("NUMERIC criteria require an operator")),
                };
                let threshold = match field(obj, &["threshold"]) {
                    Some(v) => v
                        .as_f64()
                        .filter(|n| n.is_finite())
                        .ok_or_else(|| invalid("NUMERIC threshold must be a finite number"))?,
                    None => return Err(invalid("NUMERIC criteria require a threshold")),
                };
                let metric_name = optional_string(obj, &["metric_name", "metricName"])?;
                Ok(Self::Numeric {
                    operator,
                    threshold,
                    metric_name,
                })
            }
            "EXIT_CODE" => {
                let expected_code = match field(obj, &["expected_code", "expectedCode"]) {
                    Some(v) => v
                        .as_i64()
                        .ok_or_else(|| invalid("EXIT_CODE expected_code must be an integer"))?,
                    None => return Err(invalid("EXIT_CODE criteria require an expected_code")),
                };
                let command = optional_string(obj, &["command"])?;
                Ok(Self::ExitCode {
                    expected_code,
                    command,
                })
            }
            "KEYWORD" => {
                let keyword = match field(obj, &["keyword"]) {
                    Some(Value::String(s)) => s.clone(),
                    Some(_) => return Err(invalid("KEYWORD keyword must be a string")),
                    None => return Err(invalid("KEYWORD criteria require a keyword")),
                };
                let must_contain = match field(obj, &["must_contain", "mustContain"]) {
                    Some(Value::Bool(b)) => *b,
                    Some(_) => return Err(invalid("KEYWORD must_contain must be a boolean")),
                    None => return Err(invalid("KEYWORD criteria require must_contain")),
                };
                let case_sensitive = match field(obj, &["case_sensitive", "caseSensitive"]) {
                    Some(Value::Bool(b)) => Some(*b),
                    Some(Value::Null) | None => None,
                    Some(_) => return Err(invalid("KEYWORD case_sensitive must be a boolean")),
                };
                Ok(Self::Keyword {
                    keyword,
                    must_contain,
                    case_sensitive,
                })
            }
            other => Err(invalid(format!(
                "unknown strategy type '{}' (expected NUMERIC, EXIT_CODE or KEYWORD)",
                other
            ))),
        }
    }
}

fn invalid(msg: impl Into<String>) -> MissionError {
    MissionError::InvalidCriteria(msg.into())
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| obj.get(*name))
}

fn optional_string(obj: &Map<String, Value>, names: &[&str]) -> Result<Option<String>, MissionError> {
    match field(obj, names) {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(invalid(format!("{} must be a string", names[0]))),
    }
}

/// Comparison used by numeric criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = "GREATER_THAN", alias = ">")]
    GreaterThan,
    #[serde(rename = "LESS_THAN", alias = "<")]
    LessThan,
    #[serde(rename = "GREATER_THAN_OR_EQUAL", alias = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "LESS_THAN_OR_EQUAL", alias = "<=")]
    LessThanOrEqual,
    #[serde(rename = "EQUAL", alias = "==")]
    Equal,
    #[serde(rename = "NOT_EQUAL", alias = "!=")]
    NotEqual,
}

impl ComparisonOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GreaterThan => "GREATER_THAN",
            Self::LessThan => "LESS_THAN",
            Self::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            Self::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            Self::Equal => "EQUAL",
            Self::NotEqual => "NOT_EQUAL",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThanOrEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        }
    }

    /// Accepts either the canonical name (case-insensitive) or the symbol.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GREATER_THAN" | ">" => Some(Self::GreaterThan),
            "LESS_THAN" | "<" => Some(Self::LessThan),
            "GREATER_THAN_OR_EQUAL" | ">=" => Some(Self::GreaterThanOrEqual),
            "LESS_THAN_OR_EQUAL" | "<=" => Some(Self::LessThanOrEqual),
            "EQUAL" | "==" => Some(Self::Equal),
            "NOT_EQUAL" | "!=" => Some(Self::NotEqual),
            _ => None,
        }
    }

    pub fn compare(&self, actual: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => actual > threshold,
            Self::LessThan => actual < threshold,
            Self::GreaterThanOrEqual => actual >= threshold,
            Self::LessThanOrEqual => actual <= threshold,
            Self::Equal => (actual - threshold).abs() < NUMERIC_EPSILON,
            Self::NotEqual => (actual - threshold).abs() >= NUMERIC_EPSILON,
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
