//! Template evaluation
//!
//! Templates are plain text with `{{ expression }}` blocks. Expressions are
//! parsed by a small recursive-descent parser and evaluated against a set of
//! [`Bindings`] and a [`FunctionTable`].

pub mod functions;
pub mod lexer;
pub mod parser;
pub mod value;

// Re-export main types
pub use functions::*;
pub use parser::{parse_expression, BinaryOp, Expr, UnaryOp};
pub use value::*;

use crate::error::{EvalErrorKind, EvalResult};
use std::cmp::Ordering;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A piece of a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal text
    Text(&'a str),

    /// Expression source and its offset in the template
    Expr { source: &'a str, offset: usize },
}

/// Split a template into literal and expression segments
pub fn segments(template: &str) -> Result<Vec<Segment<'_>>, EvalErrorKind> {
    let mut result = Vec::new();
    let mut rest = 0;

    while let Some(found) = template[rest..].find(OPEN) {
        let open = rest + found;
        if open > rest {
            result.push(Segment::Text(&template[rest..open]));
        }
        let start = open + OPEN.len();
        let end = find_close(&template[start..])
            .map(|n| start + n)
            .ok_or_else(|| EvalErrorKind::SyntaxError {
                position: open,
                detail: "'{{' is never closed".to_string(),
            })?;
        result.push(Segment::Expr {
            source: &template[start..end],
            offset: start,
        });
        rest = end + CLOSE.len();
    }

    if rest < template.len() {
        result.push(Segment::Text(&template[rest..]));
    }
    Ok(result)
}

/// Offset of the closing `}}`, skipping quoted strings
fn find_close(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut chars = text.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '}' if matches!(chars.peek(), Some((_, '}'))) => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// Evaluates templates and expressions against bindings
pub struct Evaluator<'a> {
    functions: &'a FunctionTable,
    host: Host<'a>,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator over a function table and its host capabilities
    pub fn new(functions: &'a FunctionTable, host: Host<'a>) -> Self {
        Evaluator { functions, host }
    }

    /// Render a template to a single string
    pub fn render(&mut self, template: &str, bindings: &Bindings) -> EvalResult<String> {
        self.render_inner(template, bindings)
            .map_err(|kind| kind.in_template(template))
    }

    /// Render a template that may expand to several lines
    ///
    /// A template consisting of one `{{ }}` block whose value is a list yields
    /// one string per element; anything else yields a single string.
    pub fn render_many(&mut self, template: &str, bindings: &Bindings) -> EvalResult<Vec<String>> {
        self.render_many_inner(template, bindings)
            .map_err(|kind| kind.in_template(template))
    }

    /// Evaluate a bare expression
    pub fn evaluate(&mut self, expression: &str, bindings: &Bindings) -> EvalResult<Value> {
        parse_expression(expression, 0)
            .and_then(|expr| self.eval(&expr, bindings))
            .map_err(|kind| kind.in_template(expression))
    }

    /// Evaluate a bare expression for its truthiness
    pub fn test(&mut self, expression: &str, bindings: &Bindings) -> EvalResult<bool> {
        self.evaluate(expression, bindings).map(|v| v.is_truthy())
    }

    fn render_inner(&mut self, template: &str, bindings: &Bindings) -> Result<String, EvalErrorKind> {
        let mut output = String::new();
        for segment in segments(template)? {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Expr { source, offset } => {
                    let expr = parse_expression(source, offset)?;
                    output.push_str(&self.eval(&expr, bindings)?.render()?);
                }
            }
        }
        Ok(output)
    }

    fn render_many_inner(
        &mut self,
        template: &str,
        bindings: &Bindings,
    ) -> Result<Vec<String>, EvalErrorKind> {
        let parts = segments(template)?;
        let mut exprs = parts.iter().filter_map(|s| match s {
            Segment::Expr { source, offset } => Some((*source, *offset)),
            Segment::Text(_) => None,
        });
        let only_blank_text = parts.iter().all(|s| match s {
            Segment::Text(text) => text.trim().is_empty(),
            Segment::Expr { .. } => true,
        });

        if let (Some((source, offset)), None, true) = (exprs.next(), exprs.next(), only_blank_text) {
            let expr = parse_expression(source, offset)?;
            return match self.eval(&expr, bindings)? {
                Value::List(items) => items.iter().map(Value::render).collect(),
                other => Ok(vec![other.render()?]),
            };
        }

        Ok(vec![self.render_inner(template, bindings)?])
    }

    fn eval(&mut self, expr: &Expr, bindings: &Bindings) -> Result<Value, EvalErrorKind> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => bindings
                .get(name)
                .cloned()
                .ok_or_else(|| EvalErrorKind::UnknownIdentifier(name.clone())),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item, bindings))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, bindings)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => value
                        .as_int()
                        .and_then(i64::checked_neg)
                        .map(Value::Int)
                        .ok_or_else(|| {
                            EvalErrorKind::TypeMismatch(format!(
                                "cannot negate {}",
                                value.type_name()
                            ))
                        }),
                }
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                if !self.eval(left, bindings)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(right, bindings)?.is_truthy()))
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                if self.eval(left, bindings)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(right, bindings)?.is_truthy()))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, bindings)?;
                let right = self.eval(right, bindings)?;
                binary(*op, left, right)
            }
            Expr::Ternary(condition, then, otherwise) => {
                if self.eval(condition, bindings)?.is_truthy() {
                    self.eval(then, bindings)
                } else {
                    self.eval(otherwise, bindings)
                }
            }
            Expr::Call(name, args) => {
                let function = self
                    .functions
                    .get(name)
                    .ok_or_else(|| EvalErrorKind::UnknownFunction(name.clone()))?;
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg, bindings))
                    .collect::<Result<Vec<_>, _>>()?;
                function(&mut self.host, &values)
            }
            Expr::Member(target, name) => match self.eval(target, bindings)? {
                Value::Map(map) => Ok(map.get(name).cloned().unwrap_or_default()),
                Value::Unset => Ok(Value::Unset),
                other => Err(EvalErrorKind::TypeMismatch(format!(
                    "cannot read '{}' of {}",
                    name,
                    other.type_name()
                ))),
            },
            Expr::Index(target, index) => {
                let target = self.eval(target, bindings)?;
                let index = self.eval(index, bindings)?;
                match (&target, &index) {
                    (Value::List(items), _) => {
                        let position = index.as_int().ok_or_else(|| {
                            EvalErrorKind::TypeMismatch("list index must be an integer".to_string())
                        })?;
                        Ok(usize::try_from(position)
                            .ok()
                            .and_then(|i| items.get(i))
                            .cloned()
                            .unwrap_or_default())
                    }
                    (Value::Map(map), key) => Ok(map.get(&key.render()?).cloned().unwrap_or_default()),
                    (Value::Unset, _) => Ok(Value::Unset),
                    (other, _) => Err(EvalErrorKind::TypeMismatch(format!(
                        "cannot index into {}",
                        other.type_name()
                    ))),
                }
            }
        }
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalErrorKind> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(left.loosely_equals(&right))),
        BinaryOp::NotEq => Ok(Value::Bool(!left.loosely_equals(&right))),
        BinaryOp::Add => add(left, right),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
    }
}

fn add(left: Value, right: Value) -> Result<Value, EvalErrorKind> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(b)
            .map(Value::Int)
            .ok_or_else(|| EvalErrorKind::TypeMismatch("integer overflow".to_string())),
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (left @ (Value::Str(_) | Value::Unset | Value::Int(_) | Value::Bool(_)), right)
        | (left, right @ (Value::Str(_) | Value::Unset)) => {
            Ok(Value::Str(left.render()? + &right.render()?))
        }
        (left, right) => Err(EvalErrorKind::TypeMismatch(format!(
            "cannot add {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, EvalErrorKind> {
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return Ok(a.cmp(&b));
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => Err(EvalErrorKind::TypeMismatch(format!(
            "cannot compare {} with {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}
