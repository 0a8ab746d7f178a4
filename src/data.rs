use std::{fmt, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A decoded cell. Bucket labels and geography areas deserialize into the same
/// variants, so catalog values and decoded values share one representation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    /// Divides numeric values by `divisor`; text is returned unchanged.
    pub fn scaled_down(&self, divisor: f64) -> Value {
        match self {
            Value::Integer(i) => Value::Float(*i as f64 / divisor),
            Value::Float(f) => Value::Float(f / divisor),
            Value::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Text(String::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

fn integer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]+$").expect("valid integer pattern"))
}

fn float_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]+\.[0-9]+$").expect("valid float pattern"))
}

/// Converts codebook text into a typed value: all-digit strings become
/// integers, `digits.digits` becomes a float, anything else stays text.
pub fn coerce(text: &str) -> Value {
    if integer_pattern().is_match(text) {
        if let Ok(parsed) = text.parse::<i64>() {
            return Value::Integer(parsed);
        }
        // Too wide for i64; the float parse keeps the magnitude.
        if let Ok(parsed) = text.parse::<f64>() {
            return Value::Float(parsed);
        }
    } else if float_pattern().is_match(text) {
        if let Ok(parsed) = text.parse::<f64>() {
            return Value::Float(parsed);
        }
    }
    Value::Text(text.to_string())
}

/// Parses the leading base-10 integer of `text`, skipping leading whitespace
/// and honouring an optional sign. Trailing characters are ignored.
pub fn parse_leading_int(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    let magnitude: i64 = rest[..digits_len].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
