use crate::{CommandRunner, ExecError, Failure, Invocation, Output, Result};
use async_trait::async_trait;
use duct::Handle;
use std::{io, sync::Arc};
use tracing::{debug, warn};

/// Runs invocations as child processes of the plugin.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

#[async_trait]
impl CommandRunner for LocalRunner {
  async fn run(&self, invocation: &Invocation) -> Result<Output> {
    let argv = invocation.argv().map(ToOwned::to_owned).collect();
    execute(argv, invocation.command_line()).await
  }
}

/// Kills the child unless disarmed, so an abandoned call does not leave
/// the process running.
struct KillOnDrop(Option<Arc<Handle>>);

impl KillOnDrop {
  fn disarm(&mut self) {
    self.0 = None;
  }
}

impl Drop for KillOnDrop {
  fn drop(&mut self) {
    if let Some(handle) = self.0.take() {
      if let Err(e) = handle.kill() {
        debug!(error = %e, "failed to kill abandoned process");
      }
    }
  }
}

/// Spawns `argv` and waits for it off the async runtime. `command` is the
/// rendering used in logs and errors.
pub(crate) async fn execute(argv: Vec<String>, command: String) -> Result<Output> {
  let (program, args) = match argv.split_first() {
    Some((program, args)) => (program.clone(), args.to_vec()),
    None => {
      return Err(ExecError::io(
        command,
        io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
      ))
    }
  };

  debug!(%command, "running command");
  let handle = duct::cmd(program, args)
    .stdin_null()
    .stdout_capture()
    .stderr_capture()
    .unchecked()
    .start()
    .map(Arc::new)
    .map_err(|e| ExecError::io(command.clone(), e))?;

  let mut guard = KillOnDrop(Some(handle.clone()));
  let output = tokio::task::spawn_blocking(move || handle.wait().map(Clone::clone))
    .await
    .map_err(|e| ExecError::io(command.clone(), io::Error::new(io::ErrorKind::Other, e)))?
    .map_err(|e| ExecError::io(command.clone(), e))?;
  guard.disarm();

  let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
  let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

  if output.status.success() {
    return Ok(Output { stdout, stderr });
  }

  let code = output.status.code();
  warn!(%command, ?code, %stdout, %stderr, "command failed");
  Err(ExecError::Failed(Failure {
    command,
    code,
    stdout,
    stderr,
  }))
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn captures_stdout() {
    let out = LocalRunner
      .run(&Invocation::new("sh").arg("-c").arg("echo hello"))
      .await
      .unwrap();

    assert_eq!(out.stdout, "hello\n");
  }

  #[tokio::test]
  async fn reports_exit_code_and_stderr() {
    let err = LocalRunner
      .run(&Invocation::new("sh").arg("-c").arg("echo oops >&2; exit 32"))
      .await
      .unwrap_err();

    assert_eq!(err.exit_code(), Some(32));
    assert_eq!(err.stderr(), Some("oops\n"));
  }

  #[tokio::test]
  async fn missing_program_is_io_error() {
    let err = LocalRunner
      .run(&Invocation::new("/nonexistent/definitely-not-here"))
      .await
      .unwrap_err();

    assert!(matches!(err, ExecError::Io { .. }));
  }

  #[tokio::test]
  async fn abandoned_call_kills_process() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("finished");
    let script = format!("sleep 1; touch {}", marker.display());
    let invocation = Invocation::new("sh").arg("-c").arg(script);

    let abandoned =
      tokio::time::timeout(Duration::from_millis(100), LocalRunner.run(&invocation)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists());
  }
}
