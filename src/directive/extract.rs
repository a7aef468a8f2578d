//! Directive extraction from source lines

use crate::directive::scan::{classify_head, parse_body, parse_conditional, scan_body, BodyScan};
use crate::directive::types::Directive;
use crate::error::{ExtractionError, ExtractionResult};
use regex::Regex;

/// Default directive keyword
pub const DEFAULT_KEYWORD: &str = "quill";

/// Leading arrow allowed on continuation lines
const CONTINUATION_ARROW: &str = "-->";

/// How directive lines are recognized in a given file type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    /// Regular expression matching the comment prefix of the file type
    pub comment: String,

    /// Directive keyword, matched case-insensitively and followed by `:`
    pub keyword: String,
}

impl Marker {
    /// Marker with the default keyword
    pub fn new(comment: impl Into<String>) -> Self {
        Marker {
            comment: comment.into(),
            keyword: DEFAULT_KEYWORD.to_string(),
        }
    }

    /// Use a different keyword
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = keyword.into();
        self
    }
}

/// Scans source lines for directives
#[derive(Debug, Clone)]
pub struct Extractor {
    marker: Regex,
    comment: Regex,
    header_only: bool,
}

impl Extractor {
    /// Compile the marker into an extractor
    pub fn new(marker: &Marker) -> ExtractionResult<Self> {
        let pattern = format!(r"{}(?i:{})\s*:", marker.comment, regex::escape(&marker.keyword));
        let compiled =
            Regex::new(&pattern).map_err(|e| ExtractionError::InvalidMarker(e.to_string()))?;
        let comment = Regex::new(&marker.comment)
            .map_err(|e| ExtractionError::InvalidMarker(e.to_string()))?;

        Ok(Extractor {
            marker: compiled,
            comment,
            header_only: false,
        })
    }

    /// Stop scanning at the first line that is not a comment
    pub fn with_header_only(mut self, header_only: bool) -> Self {
        self.header_only = header_only;
        self
    }

    /// Extract directives from a whole text
    pub fn extract_str(&self, text: &str) -> ExtractionResult<Vec<Directive>> {
        let lines: Vec<&str> = text.lines().collect();
        self.extract(&lines)
    }

    /// Extract directives from source lines, in file order
    pub fn extract<S: AsRef<str>>(&self, lines: &[S]) -> ExtractionResult<Vec<Directive>> {
        let mut directives = Vec::new();
        let mut index = 0;

        while index < lines.len() {
            let line = lines[index].as_ref();

            if self.header_only && !line.trim().is_empty() && !self.comment.is_match(line) {
                log::trace!("header ends at line {}", index + 1);
                break;
            }

            match self.directive_text(line) {
                Some(text) => {
                    let (directive, consumed) = self.parse_directive(text, lines, index)?;
                    log::debug!(
                        "line {}: directive '{}' ({})",
                        directive.line,
                        directive.name,
                        directive.conditional
                    );
                    directives.push(directive);
                    index += consumed;
                }
                None => index += 1,
            }
        }

        Ok(directives)
    }

    /// Text following the marker, if the line carries one
    fn directive_text<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.marker.find(line).map(|m| &line[m.end()..])
    }

    /// Parse one directive starting at `lines[start]`
    ///
    /// Returns the directive and the number of physical lines it spans.
    fn parse_directive<S: AsRef<str>>(
        &self,
        text: &str,
        lines: &[S],
        start: usize,
    ) -> ExtractionResult<(Directive, usize)> {
        let line_number = start + 1;
        let head = classify_head(text, line_number)?;

        if !head.full {
            let conditional = parse_conditional(head.rest, line_number)?;
            return Ok((
                Directive {
                    name: head.name.to_string(),
                    parameters: None,
                    line: line_number,
                    conditional,
                },
                1,
            ));
        }

        let mut joined = head.rest.trim_start().to_string();
        if !joined.starts_with('{') {
            return Err(ExtractionError::MalformedDirectiveSyntax {
                line: line_number,
                detail: format!("expected '{{' after '{}:'", head.name),
            });
        }

        let mut consumed = 1;
        let body_end = loop {
            if let BodyScan::Closed(end) = scan_body(&joined) {
                break end;
            }

            let next = lines
                .get(start + consumed)
                .and_then(|line| self.directive_text(line.as_ref()))
                .ok_or(ExtractionError::UnterminatedBody(line_number))?;

            let continuation = next.trim_start();
            let continuation = continuation
                .strip_prefix(CONTINUATION_ARROW)
                .unwrap_or(continuation)
                .trim();

            joined.push(' ');
            joined.push_str(continuation);
            consumed += 1;
        };

        let parameters = parse_body(&joined[..body_end], line_number)?;
        let conditional = parse_conditional(&joined[body_end..], line_number)?;

        Ok((
            Directive {
                name: head.name.to_string(),
                parameters: Some(parameters),
                line: line_number,
                conditional,
            },
            consumed,
        ))
    }
}
