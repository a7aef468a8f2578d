//! Command execution
//!
//! Commands are split with shell-like quoting rules and started directly,
//! without a shell. Output is captured, optionally echoed, and a watchdog
//! enforces the timeout.
//!
//! On Unix every command leads its own process group, so a timeout takes
//! down anything the command started as well.

use crate::error::ExecutionError;
use crate::runner::Command;
use std::io::{self, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command as StdCommand, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often a running child is polled
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long output readers may linger after a timeout kill
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Per-command execution settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    /// Directory the command runs in
    pub working_dir: PathBuf,

    /// Timeout in milliseconds, 0 disables it
    pub timeout_ms: u64,

    /// Echo output to the terminal while capturing it
    pub echo: bool,
}

impl ExecOptions {
    pub fn new(working_dir: PathBuf) -> Self {
        ExecOptions {
            working_dir,
            timeout_ms: 0,
            echo: false,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

/// What happened when a command ran
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionResult {
    /// Exit code, `None` if the process was killed by a signal or timed out
    pub exit_code: Option<i32>,

    pub succeeded: bool,

    /// Captured stdout followed by captured stderr
    pub output: String,

    pub timed_out: bool,
}

/// Something that can run a command
pub trait CommandRunner {
    /// Run a command to completion
    ///
    /// A command that runs and fails is an `Ok` result with `succeeded` unset;
    /// `Err` is reserved for commands that could not be started or supervised.
    fn run(&self, command: &Command, options: &ExecOptions) -> Result<ExecutionResult, ExecutionError>;
}

/// Runs commands as operating system processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        ProcessRunner
    }

    fn spawn(&self, command: &Command, options: &ExecOptions) -> Result<Child, ExecutionError> {
        let parts = shlex::split(&command.line).ok_or_else(|| ExecutionError::Unparsable {
            name: command.name.clone(),
            command_line: command.line.clone(),
        })?;
        let (program, args) = parts.split_first().ok_or_else(|| ExecutionError::Unparsable {
            name: command.name.clone(),
            command_line: command.line.clone(),
        })?;

        let mut process = StdCommand::new(program);
        process.args(args);
        configure(&mut process, options);

        match process.spawn() {
            Ok(child) => Ok(child),
            Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
                log::debug!("'{}' not found, retrying with cmd /C", program);
                let mut shell = StdCommand::new("cmd");
                shell.arg("/C").arg(&command.line);
                configure(&mut shell, options);
                shell.spawn().map_err(|error| not_found(command, error))
            }
            Err(error) => Err(not_found(command, error)),
        }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &Command, options: &ExecOptions) -> Result<ExecutionResult, ExecutionError> {
        log::debug!(
            "({}) running '{}' in {}",
            command.name,
            command.line,
            options.working_dir.display()
        );

        let mut child = self.spawn(command, options)?;
        let stdout = child
            .stdout
            .take()
            .map(|pipe| pump(pipe, options.echo, Stream::Stdout));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| pump(pipe, options.echo, Stream::Stderr));

        let watched = watch(&mut child, options.timeout_ms);

        // A descendant that escaped the kill can keep a pipe open.
        let grace = matches!(watched, Ok((_, true))).then_some(DRAIN_GRACE);
        let mut output = collect(stdout, grace);
        output.push_str(&collect(stderr, grace));

        let (status, timed_out) = watched.map_err(|error| ExecutionError::Supervision {
            name: command.name.clone(),
            command_line: command.line.clone(),
            error,
        })?;

        let exit_code = if timed_out { None } else { status };
        let result = ExecutionResult {
            exit_code,
            succeeded: !timed_out && exit_code == Some(0),
            output,
            timed_out,
        };
        log::debug!(
            "({}) finished: exit code {:?}, timed out {}",
            command.name,
            result.exit_code,
            result.timed_out
        );
        Ok(result)
    }
}

fn configure(process: &mut StdCommand, options: &ExecOptions) {
    process
        .current_dir(&options.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        process.process_group(0);
    }
}

fn not_found(command: &Command, error: io::Error) -> ExecutionError {
    ExecutionError::CommandNotFound {
        name: command.name.clone(),
        command_line: command.line.clone(),
        error,
    }
}

/// Wait for the child, killing it once the timeout passes
///
/// Returns the exit code and whether the timeout fired.
fn watch(child: &mut Child, timeout_ms: u64) -> io::Result<(Option<i32>, bool)> {
    let deadline = (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms));

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status.code(), false));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::debug!("killing child process {} after {} ms", child.id(), timeout_ms);
            terminate(child);
            child.wait()?;
            return Ok((None, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kill the child together with its process group
#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(child.id()) else {
        kill_direct(child);
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        log::debug!("failed to signal process group {}: {}", pgid, e);
        kill_direct(child);
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    kill_direct(child);
}

fn kill_direct(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("failed to kill child process {}: {}", child.id(), e);
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Read a pipe to its end on a separate thread
fn pump<R: Read + Send + 'static>(mut pipe: R, echo: bool, stream: Stream) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut captured = Vec::new();
        let mut buffer = [0u8; 4096];
        loop {
            match pipe.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    captured.extend_from_slice(&buffer[..n]);
                    if echo {
                        // Echo failures must not stop capture.
                        let _ = match stream {
                            Stream::Stdout => io::stdout().write_all(&buffer[..n]),
                            Stream::Stderr => io::stderr().write_all(&buffer[..n]),
                        };
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        captured
    })
}

/// Join a reader and decode what it captured
///
/// With a grace period, a reader still blocked once it passes is detached
/// and its output dropped.
fn collect(reader: Option<JoinHandle<Vec<u8>>>, grace: Option<Duration>) -> String {
    let Some(handle) = reader else {
        return String::new();
    };
    if let Some(grace) = grace {
        let deadline = Instant::now() + grace;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                log::debug!("output reader still blocked after the timeout, detaching it");
                return String::new();
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
    handle
        .join()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::directive::Conditional;

    fn command(line: &str) -> Command {
        Command {
            name: "Test".to_string(),
            line: line.to_string(),
            conditional: Conditional::none(),
            dir: None,
        }
    }

    fn options() -> ExecOptions {
        ExecOptions::new(std::env::temp_dir())
    }

    #[test]
    fn test_success_captures_output() {
        let result = ProcessRunner::new()
            .run(&command("echo 'hello world'"), &options())
            .unwrap();
        assert!(result.succeeded);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.output.trim(), "hello world");
    }

    #[test]
    fn test_failure_is_not_an_error() {
        let result = ProcessRunner::new().run(&command("false"), &options()).unwrap();
        assert!(!result.succeeded);
        assert_eq!(result.exit_code, Some(1));
        assert!(!result.timed_out);
    }

    #[test]
    fn test_stderr_is_captured() {
        let result = ProcessRunner::new()
            .run(&command("sh -c 'echo oops >&2; exit 3'"), &options())
            .unwrap();
        assert_eq!(result.exit_code, Some(3));
        assert!(result.output.contains("oops"));
    }

    #[test]
    fn test_no_shell_is_involved() {
        let result = ProcessRunner::new()
            .run(&command("echo $HOME && true"), &options())
            .unwrap();
        assert_eq!(result.output.trim(), "$HOME && true");
    }

    #[test]
    fn test_command_not_found() {
        let result = ProcessRunner::new().run(&command("quill-no-such-program --flag"), &options());
        assert!(matches!(
            result,
            Err(ExecutionError::CommandNotFound { ref name, .. }) if name == "Test"
        ));
    }

    #[test]
    fn test_unparsable_line() {
        let result = ProcessRunner::new().run(&command("echo \"unterminated"), &options());
        assert!(matches!(result, Err(ExecutionError::Unparsable { .. })));
    }

    #[test]
    fn test_timeout_kills_the_child() {
        let started = Instant::now();
        let result = ProcessRunner::new()
            .run(&command("sleep 5"), &options().with_timeout(200))
            .unwrap();
        assert!(result.timed_out);
        assert!(!result.succeeded);
        assert_eq!(result.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_kills_grandchildren() {
        let started = Instant::now();
        let result = ProcessRunner::new()
            .run(&command("sh -c 'sleep 4; true'"), &options().with_timeout(200))
            .unwrap();
        assert!(result.timed_out);
        assert!(!result.succeeded);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_timeout_keeps_output_written_before_the_kill() {
        let result = ProcessRunner::new()
            .run(
                &command("sh -c 'echo started; sleep 4'"),
                &options().with_timeout(300),
            )
            .unwrap();
        assert!(result.timed_out);
        assert!(result.output.contains("started"));
    }

    #[test]
    fn test_working_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = ProcessRunner::new()
            .run(&command("pwd"), &ExecOptions::new(dir.path().to_path_buf()))
            .unwrap();
        let reported = std::fs::canonicalize(result.output.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }
}
