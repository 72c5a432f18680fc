use crate::{CommandRunner, ExecError, Failure, Invocation, Output, Result};
use async_trait::async_trait;
use std::{
  collections::{HashMap, VecDeque},
  io,
  sync::Mutex,
};
use tracing::info;

#[derive(Debug, Clone)]
enum Scripted {
  Exit {
    code: i32,
    stdout: String,
    stderr: String,
  },
  Io(io::ErrorKind, String),
}

#[derive(Default)]
struct FakeRunnerInner {
  scripts: HashMap<String, VecDeque<Scripted>>,
  log: Vec<Invocation>,
}

/// In-memory [`CommandRunner`]. Responses are scripted per program and
/// consumed in order; a program with nothing scripted succeeds with empty
/// output. Every invocation is recorded.
#[derive(Default)]
pub struct FakeRunner(Mutex<FakeRunnerInner>);

impl FakeRunner {
  pub fn new() -> Self {
    Self::default()
  }

  fn push(&self, program: &str, response: Scripted) -> &Self {
    self
      .0
      .lock()
      .unwrap()
      .scripts
      .entry(program.to_owned())
      .or_default()
      .push_back(response);
    self
  }

  /// The next run of `program` succeeds with `stdout`.
  pub fn push_ok(&self, program: &str, stdout: impl Into<String>) -> &Self {
    self.push_exit(program, 0, stdout, "")
  }

  /// The next run of `program` exits with `code`.
  pub fn push_exit(
    &self,
    program: &str,
    code: i32,
    stdout: impl Into<String>,
    stderr: impl Into<String>,
  ) -> &Self {
    self.push(
      program,
      Scripted::Exit {
        code,
        stdout: stdout.into(),
        stderr: stderr.into(),
      },
    )
  }

  /// The next run of `program` fails before producing an exit status.
  pub fn push_io_error(&self, program: &str, kind: io::ErrorKind, message: &str) -> &Self {
    self.push(program, Scripted::Io(kind, message.to_owned()))
  }

  pub fn log(&self) -> Vec<Invocation> {
    self.0.lock().unwrap().log.clone()
  }

  /// Rendered command lines of every invocation, in order.
  pub fn command_lines(&self) -> Vec<String> {
    self.log().iter().map(Invocation::command_line).collect()
  }

  /// Invocations of one program, in order.
  pub fn runs_of(&self, program: &str) -> Vec<Invocation> {
    self
      .log()
      .into_iter()
      .filter(|i| i.program() == program)
      .collect()
  }
}

#[async_trait]
impl CommandRunner for FakeRunner {
  async fn run(&self, invocation: &Invocation) -> Result<Output> {
    let response = {
      let mut inner = self.0.lock().unwrap();
      inner.log.push(invocation.clone());
      inner
        .scripts
        .get_mut(invocation.program())
        .and_then(VecDeque::pop_front)
    };

    info!("Fake runner: {}", invocation);
    match response {
      None => Ok(Output::default()),
      Some(Scripted::Exit {
        code: 0,
        stdout,
        stderr,
      }) => Ok(Output { stdout, stderr }),
      Some(Scripted::Exit {
        code,
        stdout,
        stderr,
      }) => Err(ExecError::Failed(Failure {
        command: invocation.command_line(),
        code: Some(code),
        stdout,
        stderr,
      })),
      Some(Scripted::Io(kind, message)) => Err(ExecError::io(
        invocation.command_line(),
        io::Error::new(kind, message),
      )),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn scripts_are_consumed_in_order() {
    let fake = FakeRunner::new();
    fake
      .push_ok("blkid", "ext4\n")
      .push_exit("blkid", 2, "", "");

    let inv = Invocation::new("blkid").arg("/dev/sdb1");
    assert_eq!(fake.run(&inv).await.unwrap().stdout, "ext4\n");
    assert_eq!(fake.run(&inv).await.unwrap_err().exit_code(), Some(2));
    assert_eq!(fake.run(&inv).await.unwrap(), Output::default());
    assert_eq!(fake.runs_of("blkid").len(), 3);
  }

  #[tokio::test]
  async fn records_rendered_lines() {
    let fake = FakeRunner::new();
    fake
      .run(&Invocation::new("mkfs").arg("-t").arg("ext4").sudo(true))
      .await
      .unwrap();

    assert_eq!(fake.command_lines(), vec!["sudo mkfs -t ext4"]);
  }
}
