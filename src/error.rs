//! Error types for Quill

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Quill operations
pub type Result<T> = std::result::Result<T, QuillError>;

/// Main error type for Quill
///
/// Every variant is fatal for the run: the pipeline stops and the error is
/// handed to the caller together with the phase it came from.
#[derive(Error, Debug)]
pub enum QuillError {
    /// Settings and command line errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Directive extraction errors
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Rule lookup and validation errors
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// A directive whose rule could not be resolved
    #[error("Rule error: directive '{directive}' (line {line}): {source}")]
    Resolution {
        directive: String,
        line: usize,
        #[source]
        source: RuleError,
    },

    /// Directive to task binding errors
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// Command template expansion errors
    #[error("Materialization error: {0}")]
    Materialization(#[from] MaterializationError),

    /// Fatal command execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl QuillError {
    /// Name of the pipeline phase that produced this error
    pub fn phase(&self) -> &'static str {
        match self {
            QuillError::Config(_) => "configuration",
            QuillError::Extraction(_) => "extraction",
            QuillError::Rule(_) | QuillError::Resolution { .. } => "resolution",
            QuillError::Task(_) => "task building",
            QuillError::Materialization(_) => "materialization",
            QuillError::Execution(_) => "execution",
            QuillError::Io(_) | QuillError::Yaml(_) => "input",
        }
    }
}

/// Settings and command line errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("File type '{0}' is not supported")]
    UnsupportedFileType(String),

    #[error("Preamble '{0}' is not defined")]
    PreambleNotFound(String),

    #[error("Failed to read settings file '{path}': {error}")]
    Settings { path: PathBuf, error: String },
}

/// Directive extraction errors
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("line {line}: malformed directive: {detail}")]
    MalformedDirectiveSyntax { line: usize, detail: String },

    #[error("line {0}: directive body is not terminated (missing closing brace)")]
    UnterminatedBody(usize),

    #[error("invalid directive marker pattern: {0}")]
    InvalidMarker(String),
}

/// Rule lookup and validation errors
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule '{0}' could not be found in any rule path")]
    RuleNotFound(String),

    #[error("rule '{identifier}' is malformed: {reason}")]
    MalformedRule { identifier: String, reason: String },
}

/// Directive to task binding errors
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("directive '{directive}' (line {line}): 'files' requires a list of file names")]
    FilesRequiresList { directive: String, line: usize },

    #[error("directive '{directive}' (line {line}): only 'files' accepts a list, found one in '{key}'")]
    OnlyFilesAcceptsList {
        directive: String,
        line: usize,
        key: String,
    },

    #[error("directive '{directive}' (line {line}): argument '{key}' has an unsupported value")]
    MalformedArgument {
        directive: String,
        line: usize,
        key: String,
    },

    #[error("directive '{directive}' (line {line}): 'files' is an empty list")]
    EmptyFilesList { directive: String, line: usize },
}

/// Command template expansion errors
#[derive(Error, Debug)]
pub enum MaterializationError {
    #[error("rule '{rule}', command #{index}: {source}")]
    TemplateEvaluationFailed {
        rule: String,
        index: usize,
        #[source]
        source: EvalError,
    },

    #[error("rule '{rule}', argument '{argument}': {source}")]
    ArgumentEvaluationFailed {
        rule: String,
        argument: String,
        #[source]
        source: EvalError,
    },

    #[error("rule '{rule}' does not accept an argument named '{key}'")]
    UnknownArgument { rule: String, key: String },

    #[error("rule '{rule}' requires the argument '{argument}'")]
    MissingArgument { rule: String, argument: String },
}

/// Fatal command execution errors
///
/// A command that runs and fails is not an error; it is reported through
/// [`crate::runner::ExecutionResult`]. These variants abort the whole run.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("({name}) command could not be started: '{command_line}': {error}")]
    CommandNotFound {
        name: String,
        command_line: String,
        error: io::Error,
    },

    #[error("({name}) command line could not be split: '{command_line}'")]
    Unparsable { name: String, command_line: String },

    #[error("({name}) failed to supervise command '{command_line}': {error}")]
    Supervision {
        name: String,
        command_line: String,
        error: io::Error,
    },

    #[error("({name}) conditional '{expression}' could not be evaluated: {source}")]
    Condition {
        name: String,
        expression: String,
        #[source]
        source: EvalError,
    },
}

/// Template evaluation error, tagged with the template that failed
#[derive(Error, Debug, Clone, PartialEq)]
#[error("in '{template}': {kind}")]
pub struct EvalError {
    pub template: String,
    pub kind: EvalErrorKind,
}

/// What went wrong while evaluating a template
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalErrorKind {
    #[error("'{0}' is not defined")]
    UnknownIdentifier(String),

    #[error("function '{0}' is not defined")]
    UnknownFunction(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("syntax error at offset {position}: {detail}")]
    SyntaxError { position: usize, detail: String },

    #[error("{0}")]
    Raised(String),

    #[error("function '{name}' failed: {detail}")]
    FunctionFailed { name: String, detail: String },
}

impl EvalErrorKind {
    /// Attach the failing template text
    pub fn in_template(self, template: &str) -> EvalError {
        EvalError {
            template: template.to_string(),
            kind: self,
        }
    }
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for extraction operations
pub type ExtractionResult<T> = std::result::Result<T, ExtractionError>;

/// Specialized result type for rule operations
pub type RuleResult<T> = std::result::Result<T, RuleError>;

/// Specialized result type for task building
pub type TaskResult<T> = std::result::Result<T, TaskError>;

/// Specialized result type for materialization
pub type MaterializationResult<T> = std::result::Result<T, MaterializationError>;

/// Specialized result type for template evaluation
pub type EvalResult<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names() {
        let err: QuillError = RuleError::RuleNotFound("pdflatex".to_string()).into();
        assert_eq!(err.phase(), "resolution");

        let err = QuillError::Resolution {
            directive: "bad".to_string(),
            line: 2,
            source: RuleError::MalformedRule {
                identifier: "bad".to_string(),
                reason: "argument 'file' uses a reserved name".to_string(),
            },
        };
        assert_eq!(err.phase(), "resolution");
        assert!(err.to_string().contains("line 2"));

        let err: QuillError = ExecutionError::Unparsable {
            name: "x".to_string(),
            command_line: "\"".to_string(),
        }
        .into();
        assert_eq!(err.phase(), "execution");
    }

    #[test]
    fn test_eval_error_names_template() {
        let err = EvalErrorKind::UnknownIdentifier("foo".to_string()).in_template("{{ foo }}");
        let message = err.to_string();
        assert!(message.contains("{{ foo }}"));
        assert!(message.contains("'foo'"));
    }

    #[test]
    fn test_task_error_mentions_line() {
        let err = TaskError::FilesRequiresList {
            directive: "pdflatex".to_string(),
            line: 3,
        };
        assert!(err.to_string().contains("line 3"));
    }
}
