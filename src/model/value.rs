// 🔢 Attribute Values - one cell of a component table
// Numeric, categorical, boolean or missing

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// VALUE
// ============================================================================

/// A single attribute value.
///
/// Reference attributes are stored as `Text` holding the target identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Text(String),
    #[default]
    Missing,
}

impl Value {
    /// Parse a raw CSV cell (empty → Missing, numbers → Number, true/false → Bool)
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return Value::Missing;
        }
        if let Ok(number) = trimmed.parse::<f64>() {
            return Value::Number(number);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Text(trimmed.to_string()),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Value::Missing => true,
            Value::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// Numeric view; NaN counts as missing
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Key form used for grouping and identifiers. Missing has no key.
    pub fn to_key(&self) -> Option<String> {
        if self.is_missing() {
            return None;
        }
        Some(self.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // 345.0 prints as "345" so voltage classes make clean identifiers
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Value::Number(n) if n.is_nan() => Ok(()),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Text(s) => write!(f, "{}", s),
            Value::Missing => Ok(()),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cells() {
        assert_eq!(Value::parse("12.5"), Value::Number(12.5));
        assert_eq!(Value::parse(""), Value::Missing);
        assert_eq!(Value::parse("  "), Value::Missing);
        assert_eq!(Value::parse("TRUE"), Value::Bool(true));
        assert_eq!(Value::parse("coal"), Value::text("coal"));
        assert!(Value::parse("NaN").is_missing());
    }

    #[test]
    fn test_key_formatting() {
        assert_eq!(Value::Number(345.0).to_key(), Some("345".to_string()));
        assert_eq!(Value::Number(0.5).to_key(), Some("0.5".to_string()));
        assert_eq!(Value::text("Seoul").to_key(), Some("Seoul".to_string()));
        assert_eq!(Value::Missing.to_key(), None);
        assert_eq!(Value::Number(f64::NAN).to_key(), None);
    }

    #[test]
    fn test_numeric_view() {
        assert_eq!(Value::Number(3.0).as_f64(), Some(3.0));
        assert_eq!(Value::text("3").as_f64(), None);
        assert_eq!(Value::Bool(true).as_f64(), None);
    }
}
