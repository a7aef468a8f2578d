//! End-to-end run of one source file
//!
//! Extraction, task building and rule resolution all happen before the
//! first process starts. Commands then run in directive order until one
//! fails or a loop hits its ceiling.

use crate::config::{FileRuleRepository, RuleRepository, RuntimeConfig};
use crate::directive::{Directive, Extractor};
use crate::error::{QuillError, Result};
use crate::runner::{
    ChangeDatabase, Command, CommandRunner, ConditionalEngine, Context, ExecOptions, Materializer,
    Outcome, ProcessRunner, RuleResolver, Session, Status, Task, TaskBuilder,
};
use crate::template::{Evaluator, FunctionTable, Host};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

/// Outcome of one command within a run
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReport {
    pub name: String,
    pub line: String,
    pub outcome: Outcome,
}

/// Summary of a pipeline run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Report {
    /// Directives found, preambles included
    pub directives: usize,

    pub tasks: usize,

    /// Commands that were driven, in order
    pub commands: Vec<CommandReport>,

    /// True when every command completed or was skipped
    pub success: bool,

    pub elapsed: Duration,
}

impl Report {
    /// The command that stopped the run, if any
    pub fn first_failure(&self) -> Option<&CommandReport> {
        self.commands.iter().find(|c| !c.outcome.is_success())
    }
}

/// Runs source files through extraction, resolution and execution
pub struct Pipeline {
    config: RuntimeConfig,
    resolver: RuleResolver,
    functions: FunctionTable,
    runner: Box<dyn CommandRunner>,
}

impl Pipeline {
    /// Pipeline reading rules from the configured paths and running real processes
    pub fn new(config: RuntimeConfig) -> Self {
        let repository = FileRuleRepository::new(config.rule_paths.clone());
        Pipeline {
            config,
            resolver: RuleResolver::new(repository),
            functions: FunctionTable::standard(),
            runner: Box::new(ProcessRunner::new()),
        }
    }

    /// Serve rules from another repository
    pub fn with_repository(mut self, repository: impl RuleRepository + 'static) -> Self {
        self.resolver = RuleResolver::new(repository);
        self
    }

    /// Run commands through another runner
    pub fn with_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    /// Use another function table in templates
    pub fn with_functions(mut self, functions: FunctionTable) -> Self {
        self.functions = functions;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn resolver(&self) -> &RuleResolver {
        &self.resolver
    }

    /// Extract the directives of a source file, preambles first
    pub fn directives(&self, source: &Path) -> Result<Vec<Directive>> {
        let file_type = self.config.file_type_for(source)?;
        let extractor =
            Extractor::new(&file_type.marker())?.with_header_only(self.config.header_only);

        let mut directives = Vec::new();
        for text in self.config.preamble_texts()? {
            directives.extend(extractor.extract_str(text)?);
        }

        let contents = fs::read_to_string(source)?;
        directives.extend(extractor.extract_str(&contents)?);
        Ok(directives)
    }

    /// Resolve the rule of every directive
    ///
    /// An unknown or malformed rule stops the run before anything executes.
    pub fn resolve_rules(&self, directives: &[Directive]) -> Result<()> {
        for directive in directives {
            self.resolver
                .resolve(&directive.name)
                .map_err(|source| QuillError::Resolution {
                    directive: directive.name.clone(),
                    line: directive.line,
                    source,
                })?;
        }
        Ok(())
    }

    /// Build every task of a source file
    pub fn tasks(&self, ctx: &Context, directives: &[Directive]) -> Result<Vec<Task>> {
        let builder =
            TaskBuilder::new(ctx.source_name()).with_empty_files(self.config.empty_files);
        Ok(builder.build(directives)?)
    }

    /// Process a source file
    pub fn run(&self, source: &Path) -> Result<Report> {
        let started = Instant::now();
        let ctx = Context::new(source).with_verbosity(self.config.verbosity);

        let directives = self.directives(source)?;
        self.resolve_rules(&directives)?;
        let tasks = self.tasks(&ctx, &directives)?;
        log::debug!(
            "{} directive(s) expanded into {} task(s)",
            directives.len(),
            tasks.len()
        );

        let mut report = Report {
            directives: directives.len(),
            tasks: tasks.len(),
            ..Report::default()
        };

        if directives.is_empty() {
            ctx.print_warning(&format!("no directives found in '{}'", ctx.source_name()));
        } else {
            ctx.print_banner();
        }

        let mut session = Session::new();
        let mut changes = ChangeDatabase::in_directory(&ctx.working_dir);
        let original_file = ctx.source_name();
        let executed = {
            let mut evaluator = Evaluator::new(
                &self.functions,
                Host {
                    session: &mut session,
                    changes: &mut changes,
                    base_dir: &ctx.working_dir,
                    original_file: &original_file,
                },
            );
            self.execute(&ctx, &tasks, &mut evaluator, &mut report)
        };
        log::trace!("clearing {} session entries", session.len());
        session.clear();
        executed?;

        report.success = report.commands.iter().all(|c| c.outcome.is_success());
        report.elapsed = started.elapsed();
        Ok(report)
    }

    fn execute(
        &self,
        ctx: &Context,
        tasks: &[Task],
        evaluator: &mut Evaluator<'_>,
        report: &mut Report,
    ) -> Result<()> {
        let materializer = Materializer::new(ctx);
        let engine = ConditionalEngine::new(self.config.max_loops);

        for task in tasks {
            let rule = self.resolver.resolve(&task.rule)?;
            let bindings = materializer.bindings(task, &rule, evaluator)?;
            let commands = materializer.materialize_with(task, &rule, &bindings, evaluator)?;

            for command in commands {
                let outcome = if self.config.dry_run {
                    ctx.print_dry_run(&command.name, &command.line, &command.conditional.to_string());
                    Outcome::Completed { runs: 0 }
                } else {
                    let options = self.options(ctx, &command);
                    let outcome =
                        engine.drive(&command, &bindings, evaluator, self.runner.as_ref(), &options)?;
                    self.print_outcome(ctx, &command, &outcome);
                    outcome
                };

                let stop = !outcome.is_success();
                report.commands.push(CommandReport {
                    name: command.name,
                    line: command.line,
                    outcome,
                });
                if stop {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    fn options(&self, ctx: &Context, command: &Command) -> ExecOptions {
        ExecOptions::new(command.dir.clone().unwrap_or_else(|| ctx.working_dir.clone()))
            .with_timeout(self.config.timeout_ms)
            .with_echo(ctx.is_verbose())
    }

    fn print_outcome(&self, ctx: &Context, command: &Command, outcome: &Outcome) {
        match outcome {
            Outcome::Skipped => ctx.print_status(&command.name, &command.line, Status::Skipped),
            Outcome::Completed { .. } => {
                ctx.print_status(&command.name, &command.line, Status::Success)
            }
            Outcome::Failed { result, .. } => {
                ctx.print_status(&command.name, &command.line, Status::Failure);
                if result.timed_out {
                    ctx.print_error(&format!(
                        "'{}' timed out after {} ms",
                        command.line, self.config.timeout_ms
                    ));
                }
                if !ctx.is_verbose() && !result.output.trim().is_empty() {
                    ctx.print_info(result.output.trim_end());
                }
            }
            Outcome::HaltedLoopLimit { runs } => {
                ctx.print_status(&command.name, &command.line, Status::Halted);
                ctx.print_error(&format!(
                    "'{}' stopped after {} runs ({})",
                    command.line, runs, command.conditional
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_rule, RawRule};
    use crate::error::{ExecutionError, QuillError, RuleError};
    use crate::runner::ExecutionResult;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Runner that records command lines and fails the ones listed
    #[derive(Clone, Default)]
    struct Recorder {
        lines: Rc<RefCell<Vec<String>>>,
        failing: Vec<String>,
    }

    impl CommandRunner for Recorder {
        fn run(&self, command: &Command, _: &ExecOptions) -> std::result::Result<ExecutionResult, ExecutionError> {
            self.lines.borrow_mut().push(command.line.clone());
            let succeeded = !self.failing.contains(&command.line);
            Ok(ExecutionResult {
                exit_code: Some(if succeeded { 0 } else { 1 }),
                succeeded,
                ..ExecutionResult::default()
            })
        }
    }

    fn rules() -> HashMap<String, RawRule> {
        let mut rules = HashMap::new();
        for (id, yaml) in [
            ("pdflatex", "identifier: pdflatex\nname: PDFLaTeX\ncommand: pdflatex {{file}}\n"),
            ("bibtex", "identifier: bibtex\nname: BibTeX\ncommand: bibtex {{ getBasename(file) }}\n"),
        ] {
            rules.insert(id.to_string(), parse_rule(yaml, id).unwrap());
        }
        rules
    }

    fn pipeline(recorder: &Recorder) -> Pipeline {
        let config = RuntimeConfig::new().with_verbosity(crate::runner::Verbosity::Silent);
        Pipeline::new(config)
            .with_repository(rules())
            .with_runner(recorder.clone())
    }

    fn source(dir: &TempDir, text: &str) -> std::path::PathBuf {
        let path = dir.path().join("doc.tex");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_zero_directives_is_vacuous_success() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let report = pipeline(&recorder)
            .run(&source(&dir, "\\documentclass{article}\n"))
            .unwrap();
        assert!(report.success);
        assert_eq!(report.directives, 0);
        assert!(recorder.lines.borrow().is_empty());
    }

    #[test]
    fn test_commands_run_in_order() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let report = pipeline(&recorder)
            .run(&source(&dir, "% quill: pdflatex\n% quill: bibtex\n% quill: pdflatex\n"))
            .unwrap();
        assert!(report.success);
        assert_eq!(
            *recorder.lines.borrow(),
            vec!["pdflatex doc.tex", "bibtex doc", "pdflatex doc.tex"]
        );
    }

    #[test]
    fn test_stops_at_first_failure() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder {
            failing: vec!["bibtex doc".to_string()],
            ..Recorder::default()
        };
        let report = pipeline(&recorder)
            .run(&source(&dir, "% quill: bibtex\n% quill: pdflatex\n"))
            .unwrap();
        assert!(!report.success);
        assert_eq!(report.commands.len(), 1);
        assert_eq!(report.first_failure().map(|c| c.name.as_str()), Some("BibTeX"));
        assert_eq!(recorder.lines.borrow().len(), 1);
    }

    #[test]
    fn test_unknown_rule_fails_before_any_command() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let result = pipeline(&recorder).run(&source(&dir, "% quill: pdflatex\n% quill: xelatex\n"));
        match result {
            Err(err @ QuillError::Resolution { .. }) => {
                assert_eq!(err.phase(), "resolution");
                match err {
                    QuillError::Resolution {
                        directive,
                        line,
                        source: RuleError::RuleNotFound(name),
                    } => {
                        assert_eq!(directive, "xelatex");
                        assert_eq!(line, 2);
                        assert_eq!(name, "xelatex");
                    }
                    other => panic!("unexpected error: {other}"),
                }
            }
            Err(other) => panic!("expected a resolution error, got {other}"),
            Ok(_) => panic!("expected a resolution error"),
        }
        assert!(recorder.lines.borrow().is_empty());
    }

    #[test]
    fn test_dry_run_spawns_nothing() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let config = RuntimeConfig::new()
            .with_verbosity(crate::runner::Verbosity::Silent)
            .with_dry_run(true);
        let report = Pipeline::new(config)
            .with_repository(rules())
            .with_runner(recorder.clone())
            .run(&source(&dir, "% quill: pdflatex if missing('doc.pdf')\n"))
            .unwrap();
        assert!(report.success);
        assert_eq!(report.commands.len(), 1);
        assert!(recorder.lines.borrow().is_empty());
    }

    #[test]
    fn test_preambles_come_first() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let mut config = RuntimeConfig::new().with_verbosity(crate::runner::Verbosity::Silent);
        config
            .preambles
            .insert("bib".to_string(), "% quill: bibtex".to_string());
        config.selected_preambles.push("bib".to_string());

        let report = Pipeline::new(config)
            .with_repository(rules())
            .with_runner(recorder.clone())
            .run(&source(&dir, "% quill: pdflatex\n"))
            .unwrap();
        assert_eq!(report.directives, 2);
        assert_eq!(*recorder.lines.borrow(), vec!["bibtex doc", "pdflatex doc.tex"]);
    }

    #[test]
    fn test_unsupported_file_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "% quill: pdflatex\n").unwrap();
        let result = pipeline(&Recorder::default()).run(&path);
        assert!(matches!(result, Err(QuillError::Config(_))));
    }
}
