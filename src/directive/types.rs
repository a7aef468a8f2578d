//! Directive data types
//!
//! A directive is the structured annotation found in a source file. It names a
//! rule, may carry a parameter mapping and may carry a conditional.

use std::fmt;

/// An insertion-ordered parameter mapping
pub type ParamMap = Vec<(String, ParamValue)>;

/// A value found in a directive body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Scalar value (strings, numbers and booleans are all kept as text)
    Text(String),

    /// Sequence value
    List(Vec<ParamValue>),

    /// Nested mapping
    Map(ParamMap),
}

impl ParamValue {
    /// Short name of the value shape, used in diagnostics
    pub fn shape(&self) -> &'static str {
        match self {
            ParamValue::Text(_) => "text",
            ParamValue::List(_) => "list",
            ParamValue::Map(_) => "map",
        }
    }

    /// Get the text if this is a scalar
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Conditional kinds a directive can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionalKind {
    #[default]
    None,
    If,
    Unless,
    While,
    Until,
}

impl ConditionalKind {
    /// Parse a conditional keyword, case-insensitively
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "if" => Some(ConditionalKind::If),
            "unless" => Some(ConditionalKind::Unless),
            "while" => Some(ConditionalKind::While),
            "until" => Some(ConditionalKind::Until),
            _ => None,
        }
    }
}

impl fmt::Display for ConditionalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionalKind::None => "none",
            ConditionalKind::If => "if",
            ConditionalKind::Unless => "unless",
            ConditionalKind::While => "while",
            ConditionalKind::Until => "until",
        };
        f.write_str(s)
    }
}

/// A conditional clause attached to a directive
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conditional {
    pub kind: ConditionalKind,
    pub expression: String,
}

impl Conditional {
    /// Create a conditional; an empty expression always yields the `None` kind
    pub fn new(kind: ConditionalKind, expression: impl Into<String>) -> Self {
        let expression = expression.into().trim().to_string();
        if expression.is_empty() {
            return Conditional::none();
        }
        Conditional { kind, expression }
    }

    /// The absent conditional
    pub fn none() -> Self {
        Conditional::default()
    }

    /// Whether there is nothing to evaluate
    pub fn is_none(&self) -> bool {
        self.kind == ConditionalKind::None
    }
}

impl fmt::Display for Conditional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else {
            write!(f, "{} {}", self.kind, self.expression)
        }
    }
}

/// A directive as written in the source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Rule identifier the directive refers to
    pub name: String,

    /// Body mapping for the full form, `None` for the bare form
    pub parameters: Option<ParamMap>,

    /// 1-based line of the first physical line of the directive
    pub line: usize,

    /// Conditional clause
    pub conditional: Conditional,
}

impl Directive {
    /// A bare directive without conditional
    pub fn bare(name: impl Into<String>, line: usize) -> Self {
        Directive {
            name: name.into(),
            parameters: None,
            line,
            conditional: Conditional::none(),
        }
    }
}
