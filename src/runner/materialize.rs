//! Command materialization
//!
//! Expands a task against its rule: arguments are bound to their flags or
//! defaults, then every command template is rendered into concrete command
//! lines.

use crate::config::Rule;
use crate::directive::Conditional;
use crate::error::{MaterializationError, MaterializationResult};
use crate::runner::task::FILE_KEY;
use crate::runner::{Context, Task};
use crate::template::{Bindings, Evaluator, Value};
use std::collections::BTreeMap;
use std::path::{self, PathBuf};

/// Binding holding the raw task parameters as a map
pub const PARAMETERS_KEY: &str = "parameters";

/// Binding holding the absolute path of the target file
pub const REFERENCE_KEY: &str = "reference";

/// A concrete command ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Display name
    pub name: String,

    /// Full command line
    pub line: String,

    /// Conditional inherited from the directive
    pub conditional: Conditional,

    /// Working directory, if the rule names one
    pub dir: Option<PathBuf>,
}

/// Expands tasks into commands
#[derive(Debug)]
pub struct Materializer<'a> {
    ctx: &'a Context,
}

impl<'a> Materializer<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Materializer { ctx }
    }

    /// Expand a task into its commands
    pub fn materialize(
        &self,
        task: &Task,
        rule: &Rule,
        evaluator: &mut Evaluator<'_>,
    ) -> MaterializationResult<Vec<Command>> {
        let bindings = self.bindings(task, rule, evaluator)?;
        self.materialize_with(task, rule, &bindings, evaluator)
    }

    /// Build the evaluation context of a task
    ///
    /// Arguments are bound in declaration order, so a flag or default may
    /// refer to arguments declared before it.
    pub fn bindings(
        &self,
        task: &Task,
        rule: &Rule,
        evaluator: &mut Evaluator<'_>,
    ) -> MaterializationResult<Bindings> {
        if let Some(key) = task
            .parameters
            .keys()
            .find(|key| key.as_str() != FILE_KEY && rule.argument(key).is_none())
        {
            return Err(MaterializationError::UnknownArgument {
                rule: rule.identifier.clone(),
                key: key.clone(),
            });
        }

        let mut bindings: Bindings = task
            .parameters
            .iter()
            .map(|(key, value)| (key.clone(), Value::from(value.as_str())))
            .collect();
        let parameters: BTreeMap<String, Value> = bindings.clone();
        bindings.insert(PARAMETERS_KEY.to_string(), Value::Map(parameters));
        bindings.insert(
            REFERENCE_KEY.to_string(),
            Value::Str(self.reference(task.file())),
        );

        for argument in &rule.arguments {
            let bound = task.parameters.contains_key(&argument.identifier);
            let template = match (bound, &argument.flag, &argument.default) {
                (true, Some(flag), _) => Some(flag),
                (true, None, _) => continue,
                (false, _, Some(default)) => Some(default),
                (false, _, None) if argument.required => {
                    return Err(MaterializationError::MissingArgument {
                        rule: rule.identifier.clone(),
                        argument: argument.identifier.clone(),
                    })
                }
                (false, _, None) => None,
            };

            let value = match template {
                Some(template) => Value::Str(evaluator.render(template, &bindings).map_err(
                    |source| MaterializationError::ArgumentEvaluationFailed {
                        rule: rule.identifier.clone(),
                        argument: argument.identifier.clone(),
                        source,
                    },
                )?),
                None => Value::Unset,
            };
            bindings.insert(argument.identifier.clone(), value);
        }

        Ok(bindings)
    }

    /// Render the rule's command templates against prepared bindings
    pub fn materialize_with(
        &self,
        task: &Task,
        rule: &Rule,
        bindings: &Bindings,
        evaluator: &mut Evaluator<'_>,
    ) -> MaterializationResult<Vec<Command>> {
        let mut commands = Vec::new();

        for (index, template) in rule.commands.iter().enumerate() {
            let failed = |source| MaterializationError::TemplateEvaluationFailed {
                rule: rule.identifier.clone(),
                index: index + 1,
                source,
            };

            let lines = evaluator
                .render_many(&template.template, bindings)
                .map_err(failed)?;
            let dir = match &template.dir {
                Some(dir) => Some(self.ctx.resolve(evaluator.render(dir, bindings).map_err(failed)?)),
                None => None,
            };
            let name = template.name.clone().unwrap_or_else(|| rule.name.clone());

            for line in lines {
                let line = line.trim();
                if line.is_empty() {
                    log::debug!("({}) command #{} expanded to nothing", name, index + 1);
                    continue;
                }
                commands.push(Command {
                    name: name.clone(),
                    line: line.to_string(),
                    conditional: task.conditional.clone(),
                    dir: dir.clone(),
                });
            }
        }

        Ok(commands)
    }

    /// Absolute path of a task's target file
    fn reference(&self, file: &str) -> String {
        let resolved = self.ctx.resolve(file);
        path::absolute(&resolved)
            .unwrap_or(resolved)
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuleArgument, RuleCommand};
    use crate::directive::ConditionalKind;
    use crate::error::EvalErrorKind;
    use crate::runner::{ChangeDatabase, Session};
    use crate::template::{FunctionTable, Host};
    use std::path::Path;

    fn rule(commands: &[&str], arguments: Vec<RuleArgument>) -> Rule {
        Rule {
            identifier: "pdflatex".to_string(),
            name: "PDFLaTeX".to_string(),
            arguments,
            commands: commands
                .iter()
                .map(|c| RuleCommand {
                    name: None,
                    template: c.to_string(),
                    dir: None,
                })
                .collect(),
        }
    }

    fn argument(id: &str, flag: Option<&str>, default: Option<&str>, required: bool) -> RuleArgument {
        RuleArgument {
            identifier: id.to_string(),
            flag: flag.map(str::to_string),
            default: default.map(str::to_string),
            required,
        }
    }

    fn task(parameters: &[(&str, &str)]) -> Task {
        let mut map: BTreeMap<String, String> = parameters
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        map.entry("file".to_string())
            .or_insert_with(|| "doc.tex".to_string());
        Task {
            rule: "pdflatex".to_string(),
            parameters: map,
            conditional: Conditional::new(ConditionalKind::Until, "true"),
            directive_line: 1,
        }
    }

    fn run(task: &Task, rule: &Rule) -> MaterializationResult<Vec<Command>> {
        let ctx = Context::new("/work/doc.tex");
        let functions = FunctionTable::standard();
        let mut session = Session::new();
        let mut changes = ChangeDatabase::in_directory(Path::new("/work"));
        let mut evaluator = Evaluator::new(
            &functions,
            Host {
                session: &mut session,
                changes: &mut changes,
                base_dir: Path::new("/work"),
                original_file: "doc.tex",
            },
        );
        Materializer::new(&ctx).materialize(task, rule, &mut evaluator)
    }

    #[test]
    fn test_simple_command() {
        let commands = run(&task(&[]), &rule(&["pdflatex {{file}}"], vec![])).unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].line, "pdflatex doc.tex");
        assert_eq!(commands[0].name, "PDFLaTeX");
        assert_eq!(commands[0].conditional.kind, ConditionalKind::Until);
        assert!(commands[0].dir.is_none());
    }

    #[test]
    fn test_flag_default_and_unset() {
        let rule = rule(
            &["tool {{ shell }} {{ mode }} {{ extra }} {{ name }}"],
            vec![
                argument("shell", Some("--shell-escape"), None, false),
                argument("mode", Some("-m {{ parameters.mode }}"), Some("-m nonstop"), false),
                argument("extra", Some("--extra"), None, false),
                argument("name", None, None, true),
            ],
        );
        let commands = run(&task(&[("shell", "yes"), ("name", "report")]), &rule).unwrap();
        assert_eq!(commands[0].line, "tool --shell-escape -m nonstop  report");
    }

    #[test]
    fn test_reference_is_absolute() {
        let commands = run(&task(&[]), &rule(&["echo {{ reference }}"], vec![])).unwrap();
        assert_eq!(commands[0].line, "echo /work/doc.tex");
    }

    #[test]
    fn test_missing_required_argument() {
        let rule = rule(&["x"], vec![argument("name", None, None, true)]);
        assert!(matches!(
            run(&task(&[]), &rule),
            Err(MaterializationError::MissingArgument { argument, .. }) if argument == "name"
        ));
    }

    #[test]
    fn test_unknown_argument() {
        assert!(matches!(
            run(&task(&[("shel", "yes")]), &rule(&["x"], vec![])),
            Err(MaterializationError::UnknownArgument { key, .. }) if key == "shel"
        ));
    }

    #[test]
    fn test_list_template_and_empty_lines() {
        let rule = rule(
            &["{{ ['makeindex ' + file, ''] }}", "{{ isTrue('no', 'never') }}", "bibtex doc"],
            vec![],
        );
        let commands = run(&task(&[]), &rule).unwrap();
        let lines: Vec<&str> = commands.iter().map(|c| c.line.as_str()).collect();
        assert_eq!(lines, vec!["makeindex doc.tex", "bibtex doc"]);
    }

    #[test]
    fn test_template_failure_names_rule_and_index() {
        let rule = rule(&["ok", "{{ nope }}"], vec![]);
        match run(&task(&[]), &rule) {
            Err(MaterializationError::TemplateEvaluationFailed { rule, index, source }) => {
                assert_eq!(rule, "pdflatex");
                assert_eq!(index, 2);
                assert_eq!(source.kind, EvalErrorKind::UnknownIdentifier("nope".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_command_dir_is_resolved() {
        let mut rule = rule(&["make"], vec![]);
        rule.commands[0].dir = Some("build/{{ getBasename(file) }}".to_string());
        let commands = run(&task(&[]), &rule).unwrap();
        assert_eq!(commands[0].dir, Some(PathBuf::from("/work/build/doc")));
    }
}
