//! External process execution.
//!
//! [`ProcessRunner::run`] feeds a byte buffer to a child's stdin while two
//! other threads drain stdout and stderr, so neither side can fill a pipe
//! buffer and stall the other. A [`CancelToken`] or a timeout kills the
//! child's whole process group.

use std::env;
use std::fs::Metadata;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::command::CommandLine;
use crate::error::{PdfError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared flag that asks a running process to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a finished child produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    /// `None` when the child was ended by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// How a render tool's result is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessPolicy {
    /// Any stdout counts as success, whatever the exit code or stderr.
    Lenient,
    /// Stdout must be non-empty, and either stderr is empty or the exit
    /// code is zero.
    #[default]
    Standard,
    /// Exit code zero and stdout starting with the PDF magic bytes.
    Strict,
}

impl SuccessPolicy {
    /// Classify a finished process, returning stdout on success.
    pub fn classify(
        self,
        tool: &str,
        command: &CommandLine,
        output: ProcessOutput,
    ) -> Result<Vec<u8>> {
        let failure = |reason: &str, output: ProcessOutput| PdfError::ExternalTool {
            tool: tool.to_string(),
            reason: reason.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr,
            command: Some(command.to_string()),
        };

        if output.stdout.is_empty() {
            if !output.stderr.trim().is_empty() || !output.success() {
                return Err(failure("system error", output));
            }
            return Err(PdfError::EmptyOutput {
                tool: tool.to_string(),
            });
        }

        match self {
            SuccessPolicy::Lenient => {}
            SuccessPolicy::Standard => {
                if !output.stderr.trim().is_empty() && !output.success() {
                    return Err(failure("exited with errors", output));
                }
            }
            SuccessPolicy::Strict => {
                if !output.success() {
                    return Err(failure("exited with a non-zero status", output));
                }
                if !output.stdout.starts_with(b"%PDF-") {
                    return Err(failure("output is not a PDF document", output));
                }
            }
        }

        if !output.stderr.trim().is_empty() {
            log::debug!("{tool} succeeded with warnings: {}", output.stderr.trim_end());
        }
        Ok(output.stdout)
    }
}

/// Runs one command to completion.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
    cancel: Option<CancelToken>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cwd(mut self, dir: Option<PathBuf>) -> Self {
        self.cwd = dir;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, token: Option<CancelToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Run `command` with `input` on stdin and collect its output.
    ///
    /// Blocks until the child exits, or until it is killed by the timeout or
    /// the cancel token.
    pub fn run(&self, command: &CommandLine, input: &[u8]) -> Result<ProcessOutput> {
        let tool = tool_name(command.program());
        log::debug!("running: {command}");

        let mut cmd = Command::new(command.program());
        cmd.args(command.argv())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| PdfError::ExternalTool {
            tool: tool.clone(),
            reason: format!("could not be started: {e}"),
            exit_code: None,
            stderr: String::new(),
            command: Some(command.to_string()),
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        thread::scope(|scope| {
            let writer = scope.spawn(move || write_input(stdin, input));
            let out_reader = scope.spawn(move || read_pipe(stdout));
            let err_reader = scope.spawn(move || read_pipe(stderr));

            let waited = self.wait(&mut child, &tool);

            let written = join(writer, &tool)?;
            let stdout = join(out_reader, &tool)?;
            let stderr = join(err_reader, &tool)?;
            let status = waited?;

            let io_failure = |e: io::Error| PdfError::ExternalTool {
                tool: tool.clone(),
                reason: format!("pipe error: {e}"),
                exit_code: status.code(),
                stderr: String::new(),
                command: Some(command.to_string()),
            };
            written.map_err(io_failure)?;
            let stdout = stdout.map_err(io_failure)?;
            let stderr = stderr.map_err(io_failure)?;

            log::debug!(
                "{tool} exited with {:?} ({} bytes stdout, {} bytes stderr)",
                status.code(),
                stdout.len(),
                stderr.len()
            );
            Ok(ProcessOutput {
                stdout,
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                exit_code: status.code(),
            })
        })
    }

    fn wait(&self, child: &mut Child, tool: &str) -> Result<ExitStatus> {
        if self.timeout.is_none() && self.cancel.is_none() {
            return Ok(child.wait()?);
        }

        let deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            let cancelled = self.cancel.as_ref().is_some_and(CancelToken::is_cancelled);
            let expired = deadline.is_some_and(|d| Instant::now() >= d);
            if cancelled || expired {
                if let Err(e) = terminate(child) {
                    // Still reap the direct child before giving up.
                    if let Err(kill) = child.kill() {
                        log::debug!("kill failed: {kill}");
                    }
                    let status = child.wait()?;
                    return Err(PdfError::ExternalTool {
                        tool: tool.to_string(),
                        reason: format!("could not stop process group: {e}"),
                        exit_code: status.code(),
                        stderr: String::new(),
                        command: None,
                    });
                }
                let status = child.wait()?;
                let reason = if cancelled {
                    "cancelled".to_string()
                } else {
                    format!(
                        "timed out after {} ms",
                        self.timeout.map_or(0, |t| t.as_millis())
                    )
                };
                log::warn!("{tool} {reason}, process group killed");
                return Err(PdfError::ExternalTool {
                    tool: tool.to_string(),
                    reason,
                    exit_code: status.code(),
                    stderr: String::new(),
                    command: None,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Locate an executable: a path is checked directly, a bare name is
/// searched on `PATH`.
pub fn resolve_binary(binary: &str) -> Result<PathBuf> {
    let path = Path::new(binary);
    let not_found = || {
        PdfError::tool(
            tool_name(binary),
            format!("binary is not found or not executable: {binary}"),
        )
    };

    if path.is_absolute() || path.components().count() > 1 {
        return if is_executable(path) {
            Ok(path.to_path_buf())
        } else {
            Err(not_found())
        };
    }

    env::var_os("PATH")
        .and_then(|paths| {
            env::split_paths(&paths)
                .map(|dir| dir.join(binary))
                .find(|candidate| is_executable(candidate))
        })
        .ok_or_else(not_found)
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    meta.is_file() && has_exec_bit(&meta)
}

#[cfg(unix)]
fn has_exec_bit(meta: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_exec_bit(_meta: &Metadata) -> bool {
    true
}

fn tool_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program)
        .to_string()
}

fn write_input(stdin: Option<impl Write>, input: &[u8]) -> io::Result<()> {
    let Some(mut pipe) = stdin else {
        return Ok(());
    };
    match pipe.write_all(input).and_then(|()| pipe.flush()) {
        // The child may exit without reading all of its input.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

fn read_pipe(pipe: Option<impl Read>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)?;
    }
    Ok(buf)
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, T>, tool: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| PdfError::tool(tool, "pipe thread panicked"))
}

/// Kill the process group created at spawn, grandchildren included.
#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<()> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: killpg only sends a signal and reads no memory.
    if unsafe { libc::killpg(pid, libc::SIGKILL) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    // ESRCH: the whole group has already exited.
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    match child.kill() {
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
        other => other,
    }
}
