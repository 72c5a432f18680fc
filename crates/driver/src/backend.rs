//! The remote storage tool. One program, an `-operation=` flag, and
//! results reported through stdout, stderr and the exit status.

use libvirt_csi_exec::{CommandRunner, ExecError, Invocation};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::{error, info};

pub const DEFAULT_BACKEND_COMMAND: &str = "libvirt-storage-attach";

const VOLUME_ID_PREFIX: &str = "pv-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  List,
  Create,
  Delete,
  Attach,
  Detach,
}

impl Operation {
  pub fn as_str(self) -> &'static str {
    match self {
      Operation::List => "list",
      Operation::Create => "create",
      Operation::Delete => "delete",
      Operation::Attach => "attach",
      Operation::Detach => "detach",
    }
  }
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One entry of `list` output. Both the lower-case and the capitalized
/// field names are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VolumeInfo {
  #[serde(alias = "Id")]
  pub id: String,
  #[serde(alias = "Capacity", default)]
  pub capacity: u64,
  #[serde(alias = "Owners", default)]
  pub owners: Option<Vec<String>>,
}

impl VolumeInfo {
  /// Nodes the volume is attached to.
  pub fn owners(&self) -> &[String] {
    self.owners.as_deref().unwrap_or_default()
  }
}

#[derive(Debug, Error)]
pub enum BackendError {
  #[error("{operation} failed: {source}")]
  Command {
    operation: Operation,
    #[source]
    source: ExecError,
  },

  #[error("{operation} returned unreadable output: {detail}")]
  MalformedOutput {
    operation: Operation,
    detail: String,
  },
}

impl BackendError {
  /// Stderr of the failed command, if it ran.
  pub fn stderr(&self) -> Option<&str> {
    match self {
      BackendError::Command { source, .. } => source.stderr(),
      BackendError::MalformedOutput { .. } => None,
    }
  }

  /// The command's own stderr when there is any, otherwise the rendered
  /// error.
  pub fn message(&self) -> String {
    match self {
      BackendError::Command { source, .. } => source.message(),
      e => e.to_string(),
    }
  }
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Parses `list` output. Empty output is an empty list.
pub fn parse_volume_list(stdout: &str) -> Result<Vec<VolumeInfo>> {
  let stdout = stdout.trim();
  if stdout.is_empty() {
    return Ok(Vec::new());
  }

  serde_json::from_str::<Option<Vec<VolumeInfo>>>(stdout)
    .map(Option::unwrap_or_default)
    .map_err(|e| BackendError::MalformedOutput {
      operation: Operation::List,
      detail: e.to_string(),
    })
}

/// Accepts `create` output only when it is a single `pv-<id>` token.
pub fn parse_volume_id(stdout: &str) -> Option<&str> {
  let id = stdout.trim();
  let rest = id.strip_prefix(VOLUME_ID_PREFIX)?;
  if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
    return None;
  }

  Some(id)
}

/// Issues backend operations through a [`CommandRunner`].
pub struct Backend<R> {
  runner: R,
  command: String,
  sudo: bool,
}

impl<R: CommandRunner> Backend<R> {
  pub fn new(runner: R, command: impl Into<String>, sudo: bool) -> Self {
    Backend {
      runner,
      command: command.into(),
      sudo,
    }
  }

  fn invocation(&self, operation: Operation) -> Invocation {
    Invocation::new(self.command.as_str())
      .sudo(self.sudo)
      .flag("operation", operation)
  }

  async fn run(&self, operation: Operation, invocation: Invocation) -> Result<String> {
    match self.runner.run(&invocation).await {
      Ok(output) => Ok(output.stdout),
      Err(source) => {
        error!(
          %operation,
          command = %invocation,
          code = ?source.exit_code(),
          stdout = source.stdout().unwrap_or_default(),
          stderr = source.stderr().unwrap_or_default(),
          "backend command failed"
        );
        Err(BackendError::Command { operation, source })
      }
    }
  }

  pub async fn list(&self) -> Result<Vec<VolumeInfo>> {
    let stdout = self
      .run(Operation::List, self.invocation(Operation::List))
      .await?;

    parse_volume_list(&stdout).map_err(|e| {
      error!(%stdout, error = %e, "failed to parse volume list");
      e
    })
  }

  /// Creates a volume of `size` bytes and returns the id the backend
  /// assigned to it.
  pub async fn create(&self, volume_group: Option<&str>, size: u64) -> Result<String> {
    let mut invocation = self.invocation(Operation::Create);
    if let Some(volume_group) = volume_group {
      invocation = invocation.flag("volume-group", volume_group);
    }
    let invocation = invocation.flag("size", size);

    let stdout = self.run(Operation::Create, invocation).await?;
    match parse_volume_id(&stdout) {
      Some(id) => {
        info!(volume_id = %id, size, "created volume");
        Ok(id.to_owned())
      }
      None => {
        error!(%stdout, "create did not return a volume id");
        Err(BackendError::MalformedOutput {
          operation: Operation::Create,
          detail: format!("expected a pv-<id> volume id, got {:?}", stdout.trim()),
        })
      }
    }
  }

  pub async fn delete(&self, volume_id: &str) -> Result<()> {
    let invocation = self
      .invocation(Operation::Delete)
      .flag("pv-id", volume_id);

    self.run(Operation::Delete, invocation).await.map(drop)
  }

  pub async fn attach(&self, volume_id: &str, node_id: &str) -> Result<()> {
    let invocation = self
      .invocation(Operation::Attach)
      .flag("pv-id", volume_id)
      .flag("vm-name", node_id);

    self.run(Operation::Attach, invocation).await.map(drop)
  }

  /// Detaches the volume; without a node it is detached from wherever it
  /// is attached.
  pub async fn detach(&self, volume_id: &str, node_id: Option<&str>) -> Result<()> {
    let mut invocation = self
      .invocation(Operation::Detach)
      .flag("pv-id", volume_id);
    if let Some(node_id) = node_id {
      invocation = invocation.flag("vm-name", node_id);
    }

    self.run(Operation::Detach, invocation).await.map(drop)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use libvirt_csi_exec::FakeRunner;
  use std::sync::Arc;
  use test_case::test_case;

  fn backend() -> (Arc<FakeRunner>, Backend<Arc<FakeRunner>>) {
    let fake = Arc::new(FakeRunner::new());
    let backend = Backend::new(fake.clone(), DEFAULT_BACKEND_COMMAND, true);
    (fake, backend)
  }

  #[test_case("pv-abc123" => Some("pv-abc123"); "plain")]
  #[test_case("  pv-1b4e28ba-2fa1-11d2-883f-0016d3cca427\n" => Some("pv-1b4e28ba-2fa1-11d2-883f-0016d3cca427"); "trimmed")]
  #[test_case("error: no space" => None; "error text")]
  #[test_case("pv-" => None; "prefix only")]
  #[test_case("pv-1\npv-2" => None; "two ids")]
  #[test_case("" => None; "empty")]
  fn volume_id_from_create_output(stdout: &str) -> Option<&str> {
    parse_volume_id(stdout)
  }

  #[test]
  fn list_accepts_both_spellings() {
    let volumes = parse_volume_list(
      r#"[
        {"Id": "pv-a", "Capacity": 1024, "Owners": ["node-1"]},
        {"id": "pv-b", "capacity": 2048, "owners": null},
        {"id": "pv-c", "capacity": 4096}
      ]"#,
    )
    .unwrap();

    assert_eq!(volumes.len(), 3);
    assert_eq!(volumes[0].id, "pv-a");
    assert_eq!(volumes[0].owners().to_vec(), vec!["node-1".to_owned()]);
    assert_eq!(volumes[1].capacity, 2048);
    assert!(volumes[1].owners().is_empty());
    assert!(volumes[2].owners().is_empty());
  }

  #[test_case(""; "empty")]
  #[test_case("\n"; "newline")]
  #[test_case("null"; "null")]
  #[test_case("[]"; "empty array")]
  fn list_without_volumes(stdout: &str) {
    assert!(parse_volume_list(stdout).unwrap().is_empty());
  }

  #[test]
  fn list_rejects_garbage() {
    assert!(matches!(
      parse_volume_list("sudo: a password is required"),
      Err(BackendError::MalformedOutput { .. })
    ));
  }

  #[tokio::test]
  async fn command_lines() {
    let (fake, backend) = backend();
    fake.push_ok("libvirt-storage-attach", "[]");
    fake.push_ok("libvirt-storage-attach", "pv-abc\n");
    fake.push_ok("libvirt-storage-attach", "pv-def\n");

    backend.list().await.unwrap();
    backend.create(Some("fedora"), 1024).await.unwrap();
    backend.create(None, 2048).await.unwrap();
    backend.delete("pv-abc").await.unwrap();
    backend.attach("pv-abc", "worker-1").await.unwrap();
    backend.detach("pv-abc", Some("worker-1")).await.unwrap();
    backend.detach("pv-abc", None).await.unwrap();

    assert_eq!(
      fake.command_lines(),
      vec![
        "sudo libvirt-storage-attach -operation=list",
        "sudo libvirt-storage-attach -operation=create -volume-group=fedora -size=1024",
        "sudo libvirt-storage-attach -operation=create -size=2048",
        "sudo libvirt-storage-attach -operation=delete -pv-id=pv-abc",
        "sudo libvirt-storage-attach -operation=attach -pv-id=pv-abc -vm-name=worker-1",
        "sudo libvirt-storage-attach -operation=detach -pv-id=pv-abc -vm-name=worker-1",
        "sudo libvirt-storage-attach -operation=detach -pv-id=pv-abc",
      ]
    );
  }

  #[tokio::test]
  async fn caller_values_are_escaped() {
    let (fake, backend) = backend();

    backend
      .attach("pv-1; rm -rf /", "$(reboot)")
      .await
      .unwrap();

    assert_eq!(
      fake.command_lines(),
      vec!["sudo libvirt-storage-attach -operation=attach '-pv-id=pv-1; rm -rf /' '-vm-name=$(reboot)'"]
    );
  }

  #[tokio::test]
  async fn failure_keeps_stderr() {
    let (fake, backend) = backend();
    fake.push_exit("libvirt-storage-attach", 5, "", "  I/O error\n");

    let err = backend.delete("pv-x").await.unwrap_err();

    assert_eq!(err.message(), "I/O error");
    assert_eq!(err.stderr(), Some("  I/O error\n"));
  }

  #[tokio::test]
  async fn create_rejects_unexpected_output() {
    let (fake, backend) = backend();
    fake.push_ok("libvirt-storage-attach", "error: no space");

    let err = backend.create(None, 1).await.unwrap_err();

    assert!(matches!(
      err,
      BackendError::MalformedOutput {
        operation: Operation::Create,
        ..
      }
    ));
  }
}
