//! Values produced by template expressions

use crate::error::EvalErrorKind;
use std::collections::BTreeMap;
use std::fmt;

/// Names bound in an evaluation context
pub type Bindings = BTreeMap<String, Value>;

/// Words accepted as "true" by truthiness checks and `isTrue`
pub const TRUE_WORDS: &[&str] = &["true", "yes", "on", "1"];

/// Words accepted as "false" by truthiness checks and `isFalse`
pub const FALSE_WORDS: &[&str] = &["false", "no", "off", "0"];

/// A template value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Declared but not set
    #[default]
    Unset,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Name of the value type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unset => "unset",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Truthiness used by conditionals, `!`, `&&`, `||` and `?:`
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Unset => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => {
                let s = s.trim();
                !s.is_empty() && !FALSE_WORDS.iter().any(|w| s.eq_ignore_ascii_case(w))
            }
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    /// Whether the value is explicitly one of the true words
    pub fn is_true_word(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n == 1,
            Value::Str(s) => TRUE_WORDS.iter().any(|w| s.trim().eq_ignore_ascii_case(w)),
            _ => false,
        }
    }

    /// Whether the value is explicitly one of the false words
    pub fn is_false_word(&self) -> bool {
        match self {
            Value::Bool(b) => !*b,
            Value::Int(n) => *n == 0,
            Value::Str(s) => FALSE_WORDS.iter().any(|w| s.trim().eq_ignore_ascii_case(w)),
            _ => false,
        }
    }

    /// Whether the value carries no content
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Unset => true,
            Value::Str(s) => s.trim().is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
            Value::Bool(_) | Value::Int(_) => false,
        }
    }

    /// Render the value as it appears in a command line
    ///
    /// Lists are joined with single spaces; maps cannot be rendered.
    pub fn render(&self) -> Result<String, EvalErrorKind> {
        match self {
            Value::Unset => Ok(String::new()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Int(n) => Ok(n.to_string()),
            Value::Str(s) => Ok(s.clone()),
            Value::List(items) => {
                let parts = items
                    .iter()
                    .map(Value::render)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(parts
                    .into_iter()
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
                    .join(" "))
            }
            Value::Map(_) => Err(EvalErrorKind::TypeMismatch(
                "a map cannot be rendered as text".to_string(),
            )),
        }
    }

    /// Integer view of the value, if it has one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Equality used by `==` and `!=`
    ///
    /// Integers compare numerically with strings that parse as integers.
    /// Booleans equal the matching true or false words, so `true == 'yes'`.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Str(_)) => other.as_int() == Some(*a),
            (Value::Str(_), Value::Int(b)) => self.as_int() == Some(*b),
            (Value::Bool(true), Value::Str(_)) => other.is_true_word(),
            (Value::Bool(false), Value::Str(_)) => other.is_false_word(),
            (Value::Str(_), Value::Bool(true)) => self.is_true_word(),
            (Value::Str(_), Value::Bool(false)) => self.is_false_word(),
            (Value::Unset, Value::Str(s)) | (Value::Str(s), Value::Unset) => s.is_empty(),
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "<{}>", self.type_name()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
