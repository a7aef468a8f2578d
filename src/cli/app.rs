//! Main CLI application

use crate::config::{discover_settings, parse_settings_file, RuntimeConfig};
use crate::error::QuillError;
use crate::runner::{Context, Pipeline, Report, Verbosity};
use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use colored::Colorize;
use log::LevelFilter;
use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Every command completed or was skipped
pub const EXIT_SUCCESS: i32 = 0;

/// A command failed or a loop hit its ceiling
pub const EXIT_FAILURE: i32 = 1;

/// The run could not be carried out
pub const EXIT_FATAL: i32 = 2;

/// CLI application
pub struct App {
    matches: ArgMatches,
}

impl App {
    /// Parse command line arguments
    pub fn from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = build_command().try_get_matches_from(args)?;
        Ok(App { matches })
    }

    /// Run the application and return the process exit code
    pub fn run(self) -> i32 {
        match self.execute() {
            Ok(code) => code,
            Err(e) => {
                match e.chain().find_map(|cause| cause.downcast_ref::<QuillError>()) {
                    Some(quill) => eprintln!(
                        "{} {:#} [{}]",
                        "Error:".red().bold(),
                        e,
                        quill.phase()
                    ),
                    None => eprintln!("{} {:#}", "Error:".red().bold(), e),
                }
                EXIT_FATAL
            }
        }
    }

    fn execute(&self) -> anyhow::Result<i32> {
        let matches = &self.matches;

        if let Some(shell) = matches.get_one::<Shell>("completions") {
            clap_complete::generate(*shell, &mut build_command(), "quill", &mut io::stdout());
            return Ok(EXIT_SUCCESS);
        }

        init_logging(
            matches.get_flag("verbose"),
            matches.get_one::<PathBuf>("log").map(PathBuf::as_path),
        )?;

        let source = matches.get_one::<PathBuf>("source");
        let config = runtime_config(matches, source.map(PathBuf::as_path))?;

        if matches.get_flag("check-rules") {
            return check_rules(config);
        }

        let source = source.context("no source file given")?;
        if !source.is_file() {
            anyhow::bail!("source file '{}' does not exist", source.display());
        }

        let verbosity = config.verbosity;
        let pipeline = Pipeline::new(config);
        let report = pipeline
            .run(source)
            .with_context(|| format!("failed to process '{}'", source.display()))?;

        print_report(&Context::new(source).with_verbosity(verbosity), &report);
        Ok(if report.success {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        })
    }
}

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("quill")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs the build directives embedded in a document")
        .arg(
            Arg::new("source")
                .value_name("FILE")
                .help("Source file to process")
                .value_parser(value_parser!(PathBuf))
                .required_unless_present_any(["completions", "check-rules"]),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print command output and debug information")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print errors and the final verdict")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue)
                .conflicts_with_all(["verbose", "quiet"]),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("MS")
                .help("Kill commands running longer than this many milliseconds")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("max-loops")
                .short('m')
                .long("max-loops")
                .value_name("N")
                .help("Maximum number of runs of a while/until directive")
                .value_parser(value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("rules")
                .short('r')
                .long("rules")
                .value_name("DIR")
                .help("Rule directory, searched before configured paths")
                .value_parser(value_parser!(PathBuf))
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("dry-run")
                .short('n')
                .long("dry-run")
                .help("Print the commands without running them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("header")
                .short('H')
                .long("header")
                .help("Only read directives from the leading comment block")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("preamble")
                .short('p')
                .long("preamble")
                .value_name("NAME")
                .help("Prepend a named preamble from the settings file")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("settings")
                .long("settings")
                .value_name("FILE")
                .help("Settings file to use instead of discovering one")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("log")
                .short('l')
                .long("log")
                .value_name("FILE")
                .help("Write log records to a file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("check-rules")
                .long("check-rules")
                .help("Validate every rule on the search paths and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("completions")
                .long("completions")
                .value_name("SHELL")
                .help("Print a shell completion script and exit")
                .value_parser(value_parser!(Shell)),
        )
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Option<Verbosity> {
    if matches.get_flag("silent") {
        Some(Verbosity::Silent)
    } else if matches.get_flag("quiet") {
        Some(Verbosity::Quiet)
    } else if matches.get_flag("verbose") {
        Some(Verbosity::Verbose)
    } else {
        None
    }
}

/// Layer defaults, the settings file and command line flags
fn runtime_config(matches: &ArgMatches, source: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    let mut config = RuntimeConfig::new();

    if let Some(dirs) = matches.get_many::<PathBuf>("rules") {
        config.rule_paths.extend(dirs.cloned());
    }

    let start_dir = source
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    // Parent traversal needs an absolute path.
    let start_dir = std::path::absolute(start_dir)
        .with_context(|| format!("failed to resolve '{}'", start_dir.display()))?;
    let settings_path = match matches.get_one::<PathBuf>("settings") {
        Some(path) => Some(path.clone()),
        None => discover_settings(&start_dir),
    };

    match settings_path {
        Some(path) => {
            log::debug!("using settings from {}", path.display());
            let settings = parse_settings_file(&path)?;
            let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
            config.apply_settings(&settings, base_dir)?;
        }
        None => config.rule_paths.push(start_dir.join("rules")),
    }

    if let Some(verbosity) = get_verbosity(matches) {
        config.verbosity = verbosity;
    }
    if let Some(timeout) = matches.get_one::<u64>("timeout") {
        config.timeout_ms = *timeout;
    }
    if let Some(loops) = matches.get_one::<u32>("max-loops") {
        config = config.with_max_loops(*loops)?;
    }
    if matches.get_flag("dry-run") {
        config.dry_run = true;
    }
    if matches.get_flag("header") {
        config.header_only = true;
    }
    if let Some(names) = matches.get_many::<String>("preamble") {
        config.selected_preambles.extend(names.cloned());
        config.preamble_texts()?;
    }

    Ok(config)
}

/// Initialise the logger once
///
/// Records default to warnings; `--verbose` raises this crate to debug and
/// `RUST_LOG` overrides both.
fn init_logging(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Warn);
    if verbose {
        builder.filter_module("quill", LevelFilter::Debug);
    }
    builder.parse_default_env();

    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("failed to create log file '{}'", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    // A logger installed earlier in the process wins.
    let _ = builder.try_init();
    Ok(())
}

/// Validate every rule and report the broken ones
fn check_rules(config: RuntimeConfig) -> anyhow::Result<i32> {
    let verbosity = config.verbosity;
    let pipeline = Pipeline::new(config);
    let results = pipeline.resolver().validate_all()?;

    let mut broken = 0;
    for (identifier, result) in &results {
        match result {
            Ok(rule) => {
                if verbosity >= Verbosity::Normal {
                    println!("{} {} ({})", "ok".green(), identifier, rule.name);
                }
            }
            Err(e) => {
                broken += 1;
                if verbosity >= Verbosity::Quiet {
                    println!("{} {}", "broken".red().bold(), e);
                }
            }
        }
    }

    if verbosity >= Verbosity::Quiet {
        println!("{} rule(s) checked, {} broken", results.len(), broken);
    }
    Ok(if broken == 0 { EXIT_SUCCESS } else { EXIT_FAILURE })
}

fn print_report(ctx: &Context, report: &Report) {
    if let Some(failed) = report.first_failure() {
        ctx.print_error(&format!("({}) '{}' did not complete", failed.name, failed.line));
    }
    ctx.print_total(report.elapsed.as_secs_f64(), report.success);
}

/// Run the CLI application with the process arguments
pub fn run() -> i32 {
    run_from(std::env::args_os())
}

/// Run the CLI application with explicit arguments
pub fn run_from<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match App::from_args(args) {
        Ok(app) => app.run(),
        Err(e) => {
            // Help and version requests are not errors.
            let _ = e.print();
            e.exit_code()
        }
    }
}
