//! Task building
//!
//! A task is one unit of work: a rule plus the parameters bound for a single
//! target file. Directives carrying a `files` list replicate into one task
//! per listed file.

use crate::config::EmptyFilesPolicy;
use crate::directive::{Conditional, Directive, ParamValue};
use crate::error::{TaskError, TaskResult};
use std::collections::BTreeMap;

/// Key holding the replication list
pub const FILES_KEY: &str = "files";

/// Key holding the target file of a task
pub const FILE_KEY: &str = "file";

/// Runtime task representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Rule identifier
    pub rule: String,

    /// Bound parameters, always including `file`
    pub parameters: BTreeMap<String, String>,

    /// Conditional copied from the directive
    pub conditional: Conditional,

    /// Line of the directive this task came from
    pub directive_line: usize,
}

impl Task {
    /// Target file of the task
    pub fn file(&self) -> &str {
        self.parameters
            .get(FILE_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Turns directives into tasks
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    source_name: String,
    empty_files: EmptyFilesPolicy,
}

impl TaskBuilder {
    /// Create a builder for directives found in `source_name`
    pub fn new(source_name: impl Into<String>) -> Self {
        TaskBuilder {
            source_name: source_name.into(),
            empty_files: EmptyFilesPolicy::default(),
        }
    }

    /// Set how an empty `files` list is handled
    pub fn with_empty_files(mut self, policy: EmptyFilesPolicy) -> Self {
        self.empty_files = policy;
        self
    }

    /// Build the tasks for all directives, in order
    pub fn build(&self, directives: &[Directive]) -> TaskResult<Vec<Task>> {
        let mut tasks = Vec::new();
        for directive in directives {
            tasks.extend(self.build_one(directive)?);
        }
        Ok(tasks)
    }

    /// Build the tasks for a single directive
    pub fn build_one(&self, directive: &Directive) -> TaskResult<Vec<Task>> {
        let mut shared = BTreeMap::new();
        let mut files: Option<Vec<String>> = None;

        for (key, value) in directive.parameters.iter().flatten() {
            match (key.as_str(), value) {
                (FILES_KEY, ParamValue::Text(_)) => {
                    return Err(TaskError::FilesRequiresList {
                        directive: directive.name.clone(),
                        line: directive.line,
                    })
                }
                (FILES_KEY, ParamValue::List(items)) => {
                    let names = items
                        .iter()
                        .map(|item| {
                            item.as_text().map(str::to_string).ok_or_else(|| {
                                TaskError::MalformedArgument {
                                    directive: directive.name.clone(),
                                    line: directive.line,
                                    key: key.clone(),
                                }
                            })
                        })
                        .collect::<TaskResult<Vec<_>>>()?;
                    files = Some(names);
                }
                (_, ParamValue::Text(text)) => {
                    shared.insert(key.clone(), text.clone());
                }
                (_, ParamValue::List(_)) => {
                    return Err(TaskError::OnlyFilesAcceptsList {
                        directive: directive.name.clone(),
                        line: directive.line,
                        key: key.clone(),
                    })
                }
                (_, ParamValue::Map(_)) => {
                    return Err(TaskError::MalformedArgument {
                        directive: directive.name.clone(),
                        line: directive.line,
                        key: key.clone(),
                    })
                }
            }
        }

        let targets = match files {
            None => vec![self.source_name.clone()],
            Some(list) if list.is_empty() => match self.empty_files {
                EmptyFilesPolicy::Skip => {
                    log::warn!(
                        "directive '{}' (line {}) has an empty 'files' list and was skipped",
                        directive.name,
                        directive.line
                    );
                    Vec::new()
                }
                EmptyFilesPolicy::Reject => {
                    return Err(TaskError::EmptyFilesList {
                        directive: directive.name.clone(),
                        line: directive.line,
                    })
                }
            },
            Some(list) => list,
        };

        Ok(targets
            .into_iter()
            .map(|file| {
                let mut parameters = shared.clone();
                parameters.insert(FILE_KEY.to_string(), file);
                Task {
                    rule: directive.name.clone(),
                    parameters,
                    conditional: directive.conditional.clone(),
                    directive_line: directive.line,
                }
            })
            .collect())
    }
}
