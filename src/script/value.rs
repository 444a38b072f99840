//! Runtime values for script handlers.

use std::cmp::Ordering;
use std::fmt;

use super::error::{ScriptError, ScriptResult};

/// A value produced or consumed by a command handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value. Handlers that return nothing yield `Nil`.
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Bind a raw argument token to a value.
    ///
    /// Integers win over floats; anything that is not a finite number stays text.
    pub fn from_token(token: &str) -> Self {
        if let Ok(n) = token.parse::<i64>() {
            return Self::Int(n);
        }
        match token.parse::<f64>() {
            Ok(f) if f.is_finite() => Self::Float(f),
            _ => Self::Str(token.to_string()),
        }
    }

    /// Name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Truthiness for `if`, `while`, `&&`, `||` and `!`.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Structural equality with numeric promotion (`1 == 1.0`).
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            _ => self == other,
        }
    }

    /// Ordering for comparison operators. Only numbers and strings are ordered.
    pub fn compare(&self, other: &Self, op: &str) -> ScriptResult<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Ok(a.cmp(b)),
            (Self::Str(a), Self::Str(b)) => Ok(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| ScriptError::Type {
                    message: format!("cannot order NaN with `{op}`"),
                }),
                _ => Err(ScriptError::Type {
                    message: format!(
                        "cannot compare {} and {} with `{op}`",
                        self.type_name(),
                        other.type_name()
                    ),
                }),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_bind_to_narrowest_type() {
        assert_eq!(Value::from_token("42"), Value::Int(42));
        assert_eq!(Value::from_token("-3"), Value::Int(-3));
        assert_eq!(Value::from_token("2.5"), Value::Float(2.5));
        assert_eq!(Value::from_token("inf"), Value::Str("inf".into()));
        assert_eq!(Value::from_token("bob"), Value::Str("bob".into()));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(Value::Str("x".into()).truthy());
        assert!(Value::Float(0.5).truthy());
    }

    #[test]
    fn mixed_numeric_comparison() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert_eq!(
            Value::Int(2).compare(&Value::Float(2.5), "<").unwrap(),
            Ordering::Less
        );
        assert!(Value::Int(1).compare(&Value::Str("a".into()), "<").is_err());
    }
}
