//! Command execution for the plugin: one narrow contract ([`CommandRunner`])
//! with a local child-process binding, an ssh binding that opens a fresh
//! session per call, and a scripted fake for tests.

mod fake;
mod invocation;
mod local;
mod ssh;

pub use fake::FakeRunner;
pub use invocation::Invocation;
pub use local::LocalRunner;
pub use ssh::{SshConfig, SshIdentity, SshRunner};

use async_trait::async_trait;
use static_assertions::assert_impl_all;
use std::{fmt, io, result, sync::Arc};
use thiserror::Error;

pub type Result<T> = result::Result<T, ExecError>;

/// Captured output of a command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
  pub stdout: String,
  pub stderr: String,
}

impl Output {
  pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
    Output {
      stdout: stdout.into(),
      stderr: stderr.into(),
    }
  }
}

/// A command that ran but did not exit successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
  pub command: String,
  /// Exit status, `None` when the process was killed by a signal.
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl fmt::Display for Failure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.code {
      Some(code) => write!(f, "`{}` exited with status {}", self.command, code)?,
      None => write!(f, "`{}` was terminated by a signal", self.command)?,
    }

    let stderr = self.stderr.trim();
    if !stderr.is_empty() {
      write!(f, ": {}", stderr)?;
    }

    Ok(())
  }
}

#[derive(Debug, Error)]
pub enum ExecError {
  #[error("failed to run `{command}`: {source}")]
  Io {
    command: String,
    #[source]
    source: io::Error,
  },

  #[error("{0}")]
  Failed(Failure),
}

impl ExecError {
  pub(crate) fn io(command: impl Into<String>, source: io::Error) -> Self {
    ExecError::Io {
      command: command.into(),
      source,
    }
  }

  /// The exit status, when the command ran to completion.
  pub fn exit_code(&self) -> Option<i32> {
    match self {
      ExecError::Failed(f) => f.code,
      ExecError::Io { .. } => None,
    }
  }

  /// Captured stderr of a failed command.
  pub fn stderr(&self) -> Option<&str> {
    match self {
      ExecError::Failed(f) => Some(&f.stderr),
      ExecError::Io { .. } => None,
    }
  }

  /// Captured stdout of a failed command.
  pub fn stdout(&self) -> Option<&str> {
    match self {
      ExecError::Failed(f) => Some(&f.stdout),
      ExecError::Io { .. } => None,
    }
  }

  /// The text to surface to a caller: the command's own stderr when it
  /// produced any, otherwise the rendered error.
  pub fn message(&self) -> String {
    match self.stderr().map(str::trim) {
      Some(stderr) if !stderr.is_empty() => stderr.to_owned(),
      _ => self.to_string(),
    }
  }
}

/// Runs an [`Invocation`] somewhere and reports how it went.
///
/// Dropping the returned future abandons the call; implementations kill
/// the process they started.
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
  async fn run(&self, invocation: &Invocation) -> Result<Output>;
}

#[async_trait]
impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
  #[inline]
  async fn run(&self, invocation: &Invocation) -> Result<Output> {
    (**self).run(invocation).await
  }
}

assert_impl_all!(LocalRunner: CommandRunner);
assert_impl_all!(SshRunner: CommandRunner);
assert_impl_all!(FakeRunner: CommandRunner);
assert_impl_all!(Arc<dyn CommandRunner>: CommandRunner);
