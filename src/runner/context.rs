//! Execution context for a pipeline run
//!
//! The context knows which source file is being processed and how chatty the
//! run should be. All user-facing status lines go through it.

use colored::Colorize;
use std::env;
use std::path::{Path, PathBuf};

/// Width of a status line before the outcome column
const STATUS_WIDTH: usize = 64;

/// Execution context shared by every phase of a run
#[derive(Debug, Clone)]
pub struct Context {
    /// Directory commands run in unless they name their own
    pub working_dir: PathBuf,

    /// Source file being processed
    pub source: PathBuf,

    /// Verbosity level
    pub verbosity: Verbosity,
}

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    Normal = 2,
    Verbose = 3,
}

impl Context {
    /// Create a context for a source file
    ///
    /// The working directory is the directory of the source file.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let working_dir = match source.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };

        Context {
            working_dir,
            source,
            verbosity: Verbosity::Normal,
        }
    }

    /// Set verbosity level
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// File name of the source, as bound to `file` for bare directives
    pub fn source_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.to_string_lossy().into_owned())
    }

    /// Resolve a path against the working directory
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.working_dir.join(path)
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity >= Verbosity::Verbose
    }

    /// Print info message
    pub fn print_info(&self, message: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{}", message);
        }
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{} {}", "error:".red().bold(), message);
        }
    }

    /// Print warning message
    pub fn print_warning(&self, message: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        }
    }

    /// Print the banner shown before the first directive runs
    pub fn print_banner(&self) {
        self.print_info(&format!(
            "Processing '{}', working directory '{}'",
            self.source_name().bold(),
            self.working_dir.display()
        ));
    }

    /// Print the outcome of one command
    pub fn print_status(&self, name: &str, detail: &str, status: Status) {
        if self.verbosity < Verbosity::Normal {
            return;
        }
        let label = format!("({}) {} ", name, detail);
        let padding = STATUS_WIDTH.saturating_sub(label.chars().count());
        let outcome = match status {
            Status::Success => "SUCCESS".green().bold(),
            Status::Failure => "FAILURE".red().bold(),
            Status::Skipped => "SKIPPED".yellow(),
            Status::Halted => "HALTED".red().bold(),
        };
        eprintln!("{}{} {}", label, ".".repeat(padding), outcome);
    }

    /// Print a command that a dry run would have started
    pub fn print_dry_run(&self, name: &str, line: &str, conditional: &str) {
        if self.verbosity < Verbosity::Normal {
            return;
        }
        eprintln!("[DR] ({}) {}", name.bold(), line);
        if conditional != "none" {
            eprintln!("     conditional: {}", conditional);
        }
    }

    /// Print the total run time
    pub fn print_total(&self, seconds: f64, success: bool) {
        if self.verbosity < Verbosity::Quiet {
            return;
        }
        let verdict = if success {
            "success".green()
        } else {
            "failure".red()
        };
        eprintln!("Total: {:.2} seconds ({})", seconds, verdict);
    }
}

/// Outcome label shown in a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
    Skipped,
    Halted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_new() {
        let ctx = Context::new("/work/doc.tex");
        assert_eq!(ctx.verbosity, Verbosity::Normal);
        assert_eq!(ctx.working_dir, PathBuf::from("/work"));
        assert_eq!(ctx.source_name(), "doc.tex");
    }

    #[test]
    fn test_context_relative_source() {
        let ctx = Context::new("doc.tex");
        assert!(!ctx.working_dir.as_os_str().is_empty());
        assert_eq!(ctx.source_name(), "doc.tex");
    }

    #[test]
    fn test_resolve() {
        let ctx = Context::new("/work/doc.tex");
        assert_eq!(ctx.resolve("out"), PathBuf::from("/work/out"));
        assert_eq!(ctx.resolve("/abs"), PathBuf::from("/abs"));
    }

    #[test]
    fn test_verbosity_levels() {
        assert!(Verbosity::Verbose > Verbosity::Normal);
        assert!(Verbosity::Normal > Verbosity::Quiet);
        assert!(Verbosity::Quiet > Verbosity::Silent);
    }

    #[test]
    fn test_with_verbosity() {
        let ctx = Context::new("doc.tex").with_verbosity(Verbosity::Verbose);
        assert!(ctx.is_verbose());
    }
}
