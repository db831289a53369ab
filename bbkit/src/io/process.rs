//! Helpers for running the wrapped external command.
//!
//! The child runs to completion with no timeout. Its stdout and stderr are read
//! concurrently while it runs so that neither pipe can fill up and deadlock.

use std::io::{self, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use tracing::{debug, error, info, instrument};

use crate::error::BbError;
use crate::exit_codes;

/// Line printed around the relayed output of a command.
pub const SEPARATOR: &str = "------------------------------------------";

/// Captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == exit_codes::OK
    }
}

/// Abstraction over process spawning.
///
/// Tests substitute a recording runner so that command lines can be checked
/// without a container runtime installed.
pub trait CommandRunner {
    /// Run `command` (program followed by its arguments) with `env` added to
    /// the inherited environment and wait for it to finish.
    fn run(&self, command: &[String], env: &[(String, String)]) -> Result<ExecutionResult, BbError>;
}

/// Runner that spawns real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &[String], env: &[(String, String)]) -> Result<ExecutionResult, BbError> {
        run_command(command, env)
    }
}

/// Spawn `command`, block until it exits and capture both output streams.
#[instrument(skip_all, fields(program = command.first().map(String::as_str).unwrap_or("")))]
pub fn run_command(command: &[String], env: &[(String, String)]) -> Result<ExecutionResult, BbError> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| BbError::config("cannot run an empty command"))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(?command, "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            error!(err = %err, "failed to spawn command");
            return Err(BbError::io(format!("spawn `{program}`"), err));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| BbError::io("capture stdout", io::Error::other("stdout was not piped")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| BbError::io("capture stderr", io::Error::other("stderr was not piped")))?;

    let stdout_handle = thread::spawn(move || read_stream(stdout));
    let stderr_handle = thread::spawn(move || read_stream(stderr));

    let status = child
        .wait()
        .map_err(|err| BbError::io(format!("wait for `{program}`"), err))?;

    let stdout = join_output(stdout_handle).map_err(|err| BbError::io("read stdout", err))?;
    let stderr = join_output(stderr_handle).map_err(|err| BbError::io("read stderr", err))?;

    let exit_code = exit_code_of(status);
    debug!(exit_code, "command finished");
    Ok(ExecutionResult {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    })
}

/// Exit code of a finished child; a signal death maps to `128 + signal`.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return exit_codes::SIGNAL_BASE + signal;
        }
    }
    exit_codes::FAILURE
}

fn read_stream<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

fn join_output(handle: thread::JoinHandle<io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(io::Error::other("output reader thread panicked")),
    }
}

/// Print captured output framed by separator lines.
///
/// stdout is always printed; the stderr block only when it has content.
pub fn relay_output<O: Write, E: Write>(
    result: &ExecutionResult,
    out: &mut O,
    err: &mut E,
) -> io::Result<()> {
    writeln!(out, "{SEPARATOR}")?;
    writeln!(out, "----------------- STDOUT -----------------")?;
    writeln!(out, "{}", result.stdout)?;
    out.flush()?;
    if !result.stderr.is_empty() {
        writeln!(err, "----------------- STDERR -----------------")?;
        writeln!(err, "{}", result.stderr)?;
        err.flush()?;
    }
    writeln!(out, "{SEPARATOR}")?;
    out.flush()
}

/// Run a command, relay its output and turn a non-zero exit into an error.
///
/// The returned [`BbError::ExternalCommand`] carries the child's exit code so
/// the caller can terminate the whole process with it.
pub fn run_and_relay(
    runner: &dyn CommandRunner,
    command: &[String],
    env: &[(String, String)],
) -> Result<ExecutionResult, BbError> {
    info!(command = %command.join(" "), "launching command");
    let result = runner.run(command, env)?;

    let stdout = io::stdout();
    let stderr = io::stderr();
    relay_output(&result, &mut stdout.lock(), &mut stderr.lock())
        .map_err(|err| BbError::io("relay command output", err))?;

    if !result.success() {
        eprintln!("Exit code: {} != 0", result.exit_code);
        return Err(BbError::ExternalCommand {
            program: command.first().cloned().unwrap_or_default(),
            code: result.exit_code,
        });
    }
    Ok(result)
}
