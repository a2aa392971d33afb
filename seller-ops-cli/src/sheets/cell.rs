//! Cell values as they cross the spreadsheet boundary

use serde_json::{Value, json};
use std::fmt;

/// Leading character that marks a cell's content as a formula
pub const FORMULA_MARKER: char = '=';

/// A single cell, either a literal or a formula
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    /// Full formula text including the leading `=`
    Formula(String),
}

impl CellValue {
    /// Classify raw text the way the spreadsheet does on `USER_ENTERED` input
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.is_empty() {
            CellValue::Empty
        } else if raw.starts_with(FORMULA_MARKER) {
            CellValue::Formula(raw)
        } else {
            CellValue::Text(raw)
        }
    }

    /// Convert a JSON value returned by the values API
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Empty,
            Value::String(s) => CellValue::parse(s.clone()),
            Value::Number(n) => n
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or_else(|| CellValue::Text(n.to_string())),
            Value::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
            other => CellValue::Text(other.to_string()),
        }
    }

    /// JSON form for the values API (`USER_ENTERED` semantics)
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Empty => json!(""),
            CellValue::Text(s) | CellValue::Formula(s) => json!(s),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    json!(*n as i64)
                } else {
                    json!(*n)
                }
            }
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Formula(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) | CellValue::Formula(s) => write!(f, "{}", s),
            CellValue::Number(n) => {
                if n.fract() == 0.0 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::parse(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::parse(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_detected_by_marker() {
        assert!(CellValue::parse("=A5+1").is_formula());
        assert!(!CellValue::parse("A5+1").is_formula());
        assert_eq!(CellValue::parse(""), CellValue::Empty);
    }

    #[test]
    fn test_from_json() {
        assert_eq!(CellValue::from_json(&json!(500)), CellValue::Number(500.0));
        assert_eq!(
            CellValue::from_json(&json!("=SUM(B2:C2)")),
            CellValue::Formula("=SUM(B2:C2)".into())
        );
        assert_eq!(CellValue::from_json(&Value::Null), CellValue::Empty);
        assert_eq!(CellValue::from_json(&json!(true)), CellValue::Text("TRUE".into()));
    }

    #[test]
    fn test_whole_numbers_serialize_as_integers() {
        assert_eq!(CellValue::Number(100.0).to_json(), json!(100));
        assert_eq!(CellValue::Number(12.5).to_json(), json!(12.5));
        assert_eq!(CellValue::Number(100.0).to_string(), "100");
    }

    #[test]
    fn test_blank_text_is_empty() {
        assert!(CellValue::Text("  ".into()).is_empty());
        assert!(!CellValue::Text("wild1".into()).is_empty());
        assert!(!CellValue::Formula("=1".into()).is_empty());
    }
}
