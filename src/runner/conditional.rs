//! Conditional evaluation
//!
//! Drives one command according to the conditional it inherited from its
//! directive: run once, run if, run unless, or loop with `while` / `until`
//! up to a fixed ceiling.

use crate::directive::ConditionalKind;
use crate::error::ExecutionError;
use crate::runner::{Command, CommandRunner, ExecOptions, ExecutionResult};
use crate::template::{Bindings, Evaluator};

/// How a command ended up after its conditional was applied
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The conditional said not to run
    Skipped,

    /// Every run succeeded and the conditional is satisfied
    Completed { runs: u32 },

    /// A run failed
    Failed { runs: u32, result: ExecutionResult },

    /// A loop was still going when the ceiling was reached
    HaltedLoopLimit { runs: u32 },
}

impl Outcome {
    /// Whether the run may continue after this outcome
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Skipped | Outcome::Completed { .. })
    }

    /// Number of times the command ran
    pub fn runs(&self) -> u32 {
        match self {
            Outcome::Skipped => 0,
            Outcome::Completed { runs }
            | Outcome::Failed { runs, .. }
            | Outcome::HaltedLoopLimit { runs } => *runs,
        }
    }
}

/// Applies conditionals to commands
#[derive(Debug, Clone, Copy)]
pub struct ConditionalEngine {
    max_loops: u32,
}

impl ConditionalEngine {
    /// Create an engine with a loop ceiling (at least 1)
    pub fn new(max_loops: u32) -> Self {
        ConditionalEngine {
            max_loops: max_loops.max(1),
        }
    }

    /// Run `command` as its conditional dictates
    pub fn drive(
        &self,
        command: &Command,
        bindings: &Bindings,
        evaluator: &mut Evaluator<'_>,
        runner: &dyn CommandRunner,
        options: &ExecOptions,
    ) -> Result<Outcome, ExecutionError> {
        let mut check = || -> Result<bool, ExecutionError> {
            let expression = &command.conditional.expression;
            let value = evaluator.test(expression, bindings).map_err(|source| {
                ExecutionError::Condition {
                    name: command.name.clone(),
                    expression: expression.clone(),
                    source,
                }
            })?;
            log::trace!("({}) '{}' evaluated to {}", command.name, expression, value);
            Ok(value)
        };

        match command.conditional.kind {
            ConditionalKind::None => self.run_once(command, runner, options),
            ConditionalKind::If => {
                if check()? {
                    self.run_once(command, runner, options)
                } else {
                    Ok(Outcome::Skipped)
                }
            }
            ConditionalKind::Unless => {
                if check()? {
                    Ok(Outcome::Skipped)
                } else {
                    self.run_once(command, runner, options)
                }
            }
            ConditionalKind::While => {
                let mut runs = 0;
                loop {
                    if !check()? {
                        return Ok(Outcome::Completed { runs });
                    }
                    if runs >= self.max_loops {
                        return Ok(self.halted(command, runs));
                    }
                    let result = runner.run(command, options)?;
                    runs += 1;
                    if !result.succeeded {
                        return Ok(Outcome::Failed { runs, result });
                    }
                }
            }
            ConditionalKind::Until => {
                let mut runs = 0;
                loop {
                    let result = runner.run(command, options)?;
                    runs += 1;
                    if !result.succeeded {
                        return Ok(Outcome::Failed { runs, result });
                    }
                    if check()? {
                        return Ok(Outcome::Completed { runs });
                    }
                    if runs >= self.max_loops {
                        return Ok(self.halted(command, runs));
                    }
                }
            }
        }
    }

    fn run_once(
        &self,
        command: &Command,
        runner: &dyn CommandRunner,
        options: &ExecOptions,
    ) -> Result<Outcome, ExecutionError> {
        let result = runner.run(command, options)?;
        if result.succeeded {
            Ok(Outcome::Completed { runs: 1 })
        } else {
            Ok(Outcome::Failed { runs: 1, result })
        }
    }

    fn halted(&self, command: &Command, runs: u32) -> Outcome {
        log::warn!(
            "({}) '{}' reached the loop ceiling of {} runs",
            command.name,
            command.conditional,
            self.max_loops
        );
        Outcome::HaltedLoopLimit { runs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::Conditional;
    use crate::runner::{ChangeDatabase, Session};
    use crate::template::{FunctionTable, Host, Value};
    use std::cell::{Cell, RefCell};
    use std::path::{Path, PathBuf};

    /// Runner that replays scripted exit statuses and counts invocations
    struct Scripted {
        statuses: RefCell<Vec<bool>>,
        calls: Cell<u32>,
    }

    impl Scripted {
        fn new(statuses: &[bool]) -> Self {
            Scripted {
                statuses: RefCell::new(statuses.iter().rev().copied().collect()),
                calls: Cell::new(0),
            }
        }
    }

    impl CommandRunner for Scripted {
        fn run(&self, _: &Command, _: &ExecOptions) -> Result<ExecutionResult, ExecutionError> {
            self.calls.set(self.calls.get() + 1);
            let succeeded = self.statuses.borrow_mut().pop().unwrap_or(true);
            Ok(ExecutionResult {
                exit_code: Some(if succeeded { 0 } else { 1 }),
                succeeded,
                output: String::new(),
                timed_out: false,
            })
        }
    }

    fn command(kind: ConditionalKind, expression: &str) -> Command {
        Command {
            name: "Test".to_string(),
            line: "true".to_string(),
            conditional: Conditional::new(kind, expression),
            dir: None,
        }
    }

    fn drive(command: &Command, runner: &Scripted, max_loops: u32) -> Result<Outcome, ExecutionError> {
        let functions = FunctionTable::standard();
        let mut session = Session::new();
        let mut changes = ChangeDatabase::in_directory(Path::new("."));
        let mut evaluator = Evaluator::new(
            &functions,
            Host {
                session: &mut session,
                changes: &mut changes,
                base_dir: Path::new("."),
                original_file: "doc.tex",
            },
        );
        let mut bindings = Bindings::new();
        bindings.insert("file".to_string(), Value::from("doc.tex"));
        let options = ExecOptions::new(PathBuf::from("."));
        ConditionalEngine::new(max_loops).drive(command, &bindings, &mut evaluator, runner, &options)
    }

    #[test]
    fn test_no_conditional_runs_once() {
        let runner = Scripted::new(&[true]);
        let outcome = drive(&command(ConditionalKind::None, ""), &runner, 10).unwrap();
        assert_eq!(outcome, Outcome::Completed { runs: 1 });
        assert_eq!(runner.calls.get(), 1);
    }

    #[test]
    fn test_if_false_skips() {
        let runner = Scripted::new(&[]);
        let outcome = drive(&command(ConditionalKind::If, "false"), &runner, 10).unwrap();
        assert_eq!(outcome, Outcome::Skipped);
        assert!(outcome.is_success());
        assert_eq!(runner.calls.get(), 0);
    }

    #[test]
    fn test_unless_true_skips() {
        let runner = Scripted::new(&[]);
        let outcome = drive(&command(ConditionalKind::Unless, "file == 'doc.tex'"), &runner, 10)
            .unwrap();
        assert_eq!(outcome, Outcome::Skipped);
    }

    #[test]
    fn test_while_false_runs_zero_times() {
        let runner = Scripted::new(&[]);
        let outcome = drive(&command(ConditionalKind::While, "false"), &runner, 10).unwrap();
        assert_eq!(outcome, Outcome::Completed { runs: 0 });
        assert_eq!(runner.calls.get(), 0);
    }

    #[test]
    fn test_while_true_halts_at_ceiling() {
        let runner = Scripted::new(&[]);
        let outcome = drive(&command(ConditionalKind::While, "true"), &runner, 3).unwrap();
        assert_eq!(outcome, Outcome::HaltedLoopLimit { runs: 3 });
        assert!(!outcome.is_success());
        assert_eq!(runner.calls.get(), 3);
    }

    #[test]
    fn test_until_false_halts_at_ceiling() {
        let runner = Scripted::new(&[]);
        let outcome = drive(&command(ConditionalKind::Until, "false"), &runner, 4).unwrap();
        assert_eq!(outcome, Outcome::HaltedLoopLimit { runs: 4 });
    }

    #[test]
    fn test_until_true_runs_once() {
        let runner = Scripted::new(&[]);
        let outcome = drive(&command(ConditionalKind::Until, "true"), &runner, 4).unwrap();
        assert_eq!(outcome, Outcome::Completed { runs: 1 });
    }

    #[test]
    fn test_until_flips_through_session() {
        let runner = Scripted::new(&[]);
        let expression = "sessionPut('n', sessionGet('n', '') + 'x') == null && sessionGet('n') == 'xx'";
        let outcome = drive(&command(ConditionalKind::Until, expression), &runner, 10).unwrap();
        assert_eq!(outcome, Outcome::Completed { runs: 2 });
    }

    #[test]
    fn test_failure_inside_loop() {
        let runner = Scripted::new(&[true, false]);
        let outcome = drive(&command(ConditionalKind::While, "true"), &runner, 10).unwrap();
        assert!(matches!(outcome, Outcome::Failed { runs: 2, .. }));
    }

    #[test]
    fn test_condition_error_is_fatal() {
        let runner = Scripted::new(&[]);
        let result = drive(&command(ConditionalKind::If, "nope"), &runner, 10);
        assert!(matches!(result, Err(ExecutionError::Condition { .. })));
        assert_eq!(runner.calls.get(), 0);
    }
}
