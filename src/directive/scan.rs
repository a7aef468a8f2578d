//! Low level directive text scanning
//!
//! The head of a directive (`name` or `name:`) is classified with a regular
//! expression. The body is delimited with a brace-depth scanner because values
//! may contain braces of their own, and parsed as a YAML flow mapping.

use crate::directive::types::{Conditional, ConditionalKind, ParamMap, ParamValue};
use crate::error::{ExtractionError, ExtractionResult};
use regex::Regex;
use serde_yaml::Value as Yaml;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static HEAD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9_][A-Za-z0-9_-]*)(?:\s*(:))?").expect("constant regex pattern is valid")
});

/// Classified head of a directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head<'a> {
    /// Directive name
    pub name: &'a str,

    /// Whether a colon follows the name (full form)
    pub full: bool,

    /// Text after the name (and colon)
    pub rest: &'a str,
}

/// Classify the text that follows a marker
pub fn classify_head(text: &str, line: usize) -> ExtractionResult<Head<'_>> {
    let caps = HEAD_PATTERN.captures(text).ok_or_else(|| {
        let detail = if text.trim().is_empty() {
            "expected a directive name after the marker".to_string()
        } else {
            format!("'{}' does not start with a valid directive name", text.trim())
        };
        ExtractionError::MalformedDirectiveSyntax { line, detail }
    })?;

    let whole = caps.get(0).map_or(0, |m| m.end());
    let name = caps.get(1).map_or("", |m| m.as_str());
    let full = caps.get(2).is_some();

    Ok(Head {
        name,
        full,
        rest: &text[whole..],
    })
}

/// Outcome of scanning a directive body for its closing brace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyScan {
    /// Body is closed; the value is the byte offset just past the closing brace
    Closed(usize),

    /// Braces are still open at the end of the text
    Open,
}

/// Find the brace that closes the body starting at `text[0]`
///
/// Quotes only open at the start of a scalar, so apostrophes inside plain
/// words (`don't`) do not start a string.
pub fn scan_body(text: &str) -> BodyScan {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut last_significant: Option<char> = None;

    for (i, ch) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if q == '"' && ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
                last_significant = Some(ch);
            }
            continue;
        }

        match ch {
            '"' | '\'' if starts_scalar(last_significant) => quote = Some(ch),
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return BodyScan::Closed(i + ch.len_utf8());
                }
            }
            _ => {}
        }

        if !ch.is_whitespace() {
            last_significant = Some(ch);
        }
    }

    BodyScan::Open
}

fn starts_scalar(previous: Option<char>) -> bool {
    matches!(previous, None | Some('{') | Some('[') | Some(',') | Some(':'))
}

/// Parse the optional conditional clause that trails a directive
pub fn parse_conditional(rest: &str, line: usize) -> ExtractionResult<Conditional> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(Conditional::none());
    }

    let (keyword, expression) = match rest.find(char::is_whitespace) {
        Some(pos) => (&rest[..pos], rest[pos..].trim()),
        None => (rest, ""),
    };

    let kind = ConditionalKind::from_keyword(keyword).ok_or_else(|| {
        ExtractionError::MalformedDirectiveSyntax {
            line,
            detail: format!("unexpected text '{}' after directive", rest),
        }
    })?;

    if expression.is_empty() {
        return Err(ExtractionError::MalformedDirectiveSyntax {
            line,
            detail: format!("'{}' requires an expression", keyword.to_ascii_lowercase()),
        });
    }

    Ok(Conditional::new(kind, expression))
}

/// Parse a directive body (`{ ... }`) into an ordered parameter map
pub fn parse_body(body: &str, line: usize) -> ExtractionResult<ParamMap> {
    let malformed = |detail: String| ExtractionError::MalformedDirectiveSyntax { line, detail };

    let value: Yaml =
        serde_yaml::from_str(body).map_err(|e| malformed(format!("invalid body: {}", e)))?;

    match value {
        Yaml::Mapping(mapping) => mapping
            .into_iter()
            .map(|(key, value)| {
                let key = scalar_text(&key)
                    .ok_or_else(|| malformed("parameter names must be scalars".to_string()))?;
                Ok((key, convert(value).map_err(&malformed)?))
            })
            .collect(),
        other => Err(malformed(format!(
            "body must be a mapping, found {}",
            yaml_shape(&other)
        ))),
    }
}

fn convert(value: Yaml) -> Result<ParamValue, String> {
    match value {
        Yaml::Sequence(items) => items
            .into_iter()
            .map(convert)
            .collect::<Result<Vec<_>, _>>()
            .map(ParamValue::List),
        Yaml::Mapping(mapping) => {
            let mut map = ParamMap::new();
            for (key, value) in mapping {
                let key = scalar_text(&key)
                    .ok_or_else(|| "parameter names must be scalars".to_string())?;
                map.push((key, convert(value)?));
            }
            Ok(ParamValue::Map(map))
        }
        Yaml::Tagged(tagged) => convert(tagged.value),
        scalar => scalar_text(&scalar)
            .map(ParamValue::Text)
            .ok_or_else(|| "unsupported value".to_string()),
    }
}

fn scalar_text(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        Yaml::Null => Some(String::new()),
        _ => None,
    }
}

fn yaml_shape(value: &Yaml) -> &'static str {
    match value {
        Yaml::Null => "nothing",
        Yaml::Bool(_) | Yaml::Number(_) | Yaml::String(_) => "a scalar",
        Yaml::Sequence(_) => "a list",
        Yaml::Mapping(_) => "a mapping",
        Yaml::Tagged(_) => "a tagged value",
    }
}
