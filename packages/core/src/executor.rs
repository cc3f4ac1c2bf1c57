//! Command execution abstraction with privilege escalation and cancellation.
//!
//! Every external tool this crate drives (`mount`, `umount`, `modprobe`,
//! `ceph-fuse`, probes) goes through an [`ExecutionContext`], which decides how
//! the command is wrapped and lets the caller abort it through a [`CancelToken`].

use std::fmt;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};

/// How often a running child is checked for exit or cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Privilege escalation method for executing commands that require root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeEscalation {
    /// Execute directly without privilege escalation.
    #[default]
    None,
    /// Use `pkexec` for GUI-based privilege escalation (polkit).
    Pkexec,
    /// Use `sudo` for TTY-based privilege escalation.
    Sudo,
}

impl PrivilegeEscalation {
    fn wrapper(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Pkexec => Some("pkexec"),
            Self::Sudo => Some("sudo"),
        }
    }
}

/// Shared flag used to abort in-flight commands.
///
/// Clones observe the same flag, so cancelling one cancels all of them.
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

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Backend that actually spawns processes.
pub trait CommandRunner: fmt::Debug + Send + Sync {
    fn run(&self, program: &str, args: &[String], cancel: &CancelToken) -> Result<CommandOutput>;
}

/// Runs commands on the host with piped stdout/stderr.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], cancel: &CancelToken) -> Result<CommandOutput> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .command_context(program)?;

        // Drained from separate threads so a chatty child cannot fill a pipe and stall.
        let stdout = child
            .stdout
            .take()
            .map(|pipe| drain(pipe, format!("{program}::stdout")));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| drain(pipe, format!("{program}::stderr")));

        let status = loop {
            if let Some(status) = child.try_wait().command_context(program)? {
                break status;
            }
            if cancel.is_cancelled() {
                if let Err(e) = child.kill() {
                    warn!("failed to kill cancelled {}: {}", program, e);
                }
                if let Err(e) = child.wait() {
                    warn!("failed to wait for cancelled {}: {}", program, e);
                }
                return Err(Error::CommandCancelled {
                    command: program.to_string(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(CommandOutput {
            code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

fn drain<R>(mut pipe: R, target: String) -> JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let text = String::from_utf8_lossy(&buf).into_owned();
        for line in text.lines() {
            trace!(target: target.as_str(), "{}", line);
        }
        text
    })
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Execution context for running system commands.
///
/// Cheap to clone; clones share the runner and the cancellation flag.
///
/// # Example
///
/// ```
/// use cephfs_mount_core::executor::{ExecutionContext, PrivilegeEscalation};
///
/// // Default: no privilege escalation
/// let ctx = ExecutionContext::default();
///
/// // For terminal applications
/// let tty_ctx = ExecutionContext::with_escalation(PrivilegeEscalation::Sudo);
/// assert_eq!(tty_ctx.escalation(), PrivilegeEscalation::Sudo);
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    escalation: PrivilegeEscalation,
    cancel: CancelToken,
    runner: Arc<dyn CommandRunner>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::with_runner(Arc::new(SystemRunner))
    }
}

impl ExecutionContext {
    /// Creates a new execution context with no privilege escalation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an execution context with a specific escalation method.
    pub fn with_escalation(escalation: PrivilegeEscalation) -> Self {
        Self {
            escalation,
            ..Self::default()
        }
    }

    /// Creates an execution context backed by a custom runner.
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            escalation: PrivilegeEscalation::None,
            cancel: CancelToken::new(),
            runner,
        }
    }

    /// Returns the current privilege escalation method.
    pub fn escalation(&self) -> PrivilegeEscalation {
        self.escalation
    }

    /// Token that aborts commands run through this context.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Executes a command, returning its output whatever the exit code.
    pub fn run(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        if self.cancel.is_cancelled() {
            return Err(Error::CommandCancelled {
                command: cmd.to_string(),
            });
        }

        trace!("running command: '{} {}'", cmd, args.join(" "));

        match self.escalation.wrapper() {
            None => self.runner.run(cmd, args, &self.cancel),
            Some(wrapper) => {
                let mut wrapped = Vec::with_capacity(args.len() + 1);
                wrapped.push(cmd.to_string());
                wrapped.extend_from_slice(args);
                self.runner.run(wrapper, &wrapped, &self.cancel)
            }
        }
    }

    /// Executes a command, turning a non-zero exit into [`Error::CommandExit`].
    pub fn run_checked(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let output = self.run(cmd, args)?;

        if !output.success() {
            return Err(Error::CommandExit {
                command: cmd.to_string(),
                code: output.code.unwrap_or(-1),
                stderr: output.stderr,
            });
        }

        Ok(output)
    }
}
