use crate::{local::execute, CommandRunner, ExecError, Invocation, Output, Result};
use async_trait::async_trait;
use std::{
  io::{self, Write},
  path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::info;
use which::which;

const DEFAULT_SSH_PORT: u16 = 22;

/// The key ssh authenticates with.
#[derive(Clone)]
pub enum SshIdentity {
  /// A private key file on disk.
  File(PathBuf),
  /// Private key material, written to a private temporary file on start-up.
  Inline(String),
}

impl std::fmt::Debug for SshIdentity {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SshIdentity::File(path) => f.debug_tuple("File").field(path).finish(),
      SshIdentity::Inline(_) => f.write_str("Inline(REDACTED)"),
    }
  }
}

#[derive(Debug, Clone)]
pub struct SshConfig {
  host: String,
  port: u16,
  user: String,
  known_hosts: PathBuf,
  identity: SshIdentity,
}

impl SshConfig {
  /// `address` is `host` or `host:port`. IPv6 addresses are written
  /// `[addr]` or `[addr]:port`.
  pub fn new(
    address: &str,
    user: impl Into<String>,
    known_hosts: impl Into<PathBuf>,
    identity: SshIdentity,
  ) -> Result<Self> {
    let (host, port) = split_address(address).map_err(invalid_address)?;
    let port = match port {
      Some(port) => port
        .parse::<u16>()
        .map_err(|e| invalid_address(format!("invalid ssh port in {:?}: {}", address, e)))?,
      None => DEFAULT_SSH_PORT,
    };

    if host.is_empty() {
      return Err(invalid_address("ssh host is empty".to_owned()));
    }

    Ok(SshConfig {
      host: host.to_owned(),
      port,
      user: user.into(),
      known_hosts: known_hosts.into(),
      identity,
    })
  }

  #[inline]
  pub fn host(&self) -> &str {
    &self.host
  }

  #[inline]
  pub fn port(&self) -> u16 {
    self.port
  }
}

/// Splits `address` into host and port text.
fn split_address(address: &str) -> std::result::Result<(&str, Option<&str>), String> {
  if let Some(rest) = address.strip_prefix('[') {
    let (host, rest) = rest
      .split_once(']')
      .ok_or_else(|| format!("unterminated '[' in ssh address {:?}", address))?;
    return match rest {
      "" => Ok((host, None)),
      _ => match rest.strip_prefix(':') {
        Some(port) => Ok((host, Some(port))),
        None => Err(format!("unexpected {:?} after ']' in ssh address {:?}", rest, address)),
      },
    };
  }

  match address.split_once(':') {
    None => Ok((address, None)),
    Some((host, port)) if !port.contains(':') => Ok((host, Some(port))),
    Some(_) => Err(format!(
      "ssh address {:?} looks like an IPv6 address, write it as [addr] or [addr]:port",
      address
    )),
  }
}

fn invalid_address(message: String) -> ExecError {
  ExecError::io("ssh", io::Error::new(io::ErrorKind::InvalidInput, message))
}

/// Runs invocations on a remote host. Every call opens its own ssh session;
/// nothing is pooled between calls.
#[derive(Debug)]
pub struct SshRunner {
  ssh: PathBuf,
  config: SshConfig,
  key_file: PathBuf,
  // Keeps an inline key on disk for as long as the runner lives.
  _key: Option<NamedTempFile>,
}

impl SshRunner {
  pub fn new(config: SshConfig) -> Result<Self> {
    let ssh = which("ssh").map_err(|e| {
      ExecError::io(
        "ssh",
        io::Error::new(io::ErrorKind::NotFound, format!("ssh client not found: {}", e)),
      )
    })?;

    Self::with_client(ssh, config)
  }

  /// Uses the ssh client at `ssh` instead of looking it up on `PATH`.
  pub fn with_client(ssh: impl Into<PathBuf>, config: SshConfig) -> Result<Self> {
    let (key_file, key) = match &config.identity {
      SshIdentity::File(path) => (path.clone(), None),
      SshIdentity::Inline(material) => {
        let file = write_key(material).map_err(|e| ExecError::io("ssh", e))?;
        (file.path().to_owned(), Some(file))
      }
    };

    info!(
      host = %config.host,
      port = config.port,
      user = %config.user,
      "using remote command execution over ssh"
    );

    Ok(SshRunner {
      ssh: ssh.into(),
      config,
      key_file,
      _key: key,
    })
  }

  #[inline]
  pub fn key_file(&self) -> &Path {
    &self.key_file
  }

  /// The local argument vector that runs `invocation` on the remote host.
  pub fn argv(&self, invocation: &Invocation) -> Vec<String> {
    let mut argv = vec![
      self.ssh.to_string_lossy().into_owned(),
      "-o".to_owned(),
      "BatchMode=yes".to_owned(),
      "-o".to_owned(),
      "StrictHostKeyChecking=yes".to_owned(),
      "-o".to_owned(),
      format!("UserKnownHostsFile={}", self.config.known_hosts.display()),
      "-i".to_owned(),
      self.key_file.to_string_lossy().into_owned(),
      "-p".to_owned(),
      self.config.port.to_string(),
      "-l".to_owned(),
      self.config.user.clone(),
      self.config.host.clone(),
      "--".to_owned(),
    ];

    // The remote side hands this to a shell, so it travels as one
    // already-escaped command line.
    argv.push(invocation.command_line());
    argv
  }
}

fn write_key(material: &str) -> io::Result<NamedTempFile> {
  let mut file = tempfile::Builder::new()
    .prefix("libvirt-csi-ssh-")
    .tempfile()?;

  file.write_all(material.as_bytes())?;
  if !material.ends_with('\n') {
    file.write_all(b"\n")?;
  }
  file.flush()?;

  Ok(file)
}

#[async_trait]
impl CommandRunner for SshRunner {
  async fn run(&self, invocation: &Invocation) -> Result<Output> {
    let command = format!(
      "ssh {}@{}: {}",
      self.config.user,
      self.config.host,
      invocation.command_line()
    );
    execute(self.argv(invocation), command).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use test_case::test_case;

  fn config(identity: SshIdentity) -> SshConfig {
    SshConfig::new("hv.example.com:2222", "csi", "/etc/ssh/known_hosts", identity).unwrap()
  }

  #[test_case("hv" => ("hv".to_owned(), 22); "default port")]
  #[test_case("hv:2200" => ("hv".to_owned(), 2200); "explicit port")]
  #[test_case("[::1]" => ("::1".to_owned(), 22); "bracketed ipv6")]
  #[test_case("[fd00::5]:2200" => ("fd00::5".to_owned(), 2200); "bracketed ipv6 with port")]
  fn parses_address(address: &str) -> (String, u16) {
    let config = SshConfig::new(address, "u", "/k", SshIdentity::File("/id".into())).unwrap();
    (config.host().to_owned(), config.port())
  }

  #[test_case("hv:port"; "bad port")]
  #[test_case(":22"; "empty host")]
  #[test_case("::1"; "bare ipv6")]
  #[test_case("[::1"; "unterminated bracket")]
  #[test_case("[::1]2200"; "missing port separator")]
  #[test_case("[]:22"; "empty bracketed host")]
  fn rejects_address(address: &str) {
    assert!(SshConfig::new(address, "u", "/k", SshIdentity::File("/id".into())).is_err());
  }

  #[test]
  fn remote_command_is_one_escaped_argument() {
    let runner =
      SshRunner::with_client("/usr/bin/ssh", config(SshIdentity::File("/keys/id".into()))).unwrap();
    let inv = Invocation::new("libvirt-storage-attach")
      .sudo(true)
      .flag("operation", "delete")
      .flag("pv-id", "pv-1; reboot");

    let argv = runner.argv(&inv);
    assert_eq!(argv[0], "/usr/bin/ssh");
    assert!(argv.contains(&"BatchMode=yes".to_owned()));
    assert!(argv.contains(&"StrictHostKeyChecking=yes".to_owned()));
    assert!(argv.contains(&"UserKnownHostsFile=/etc/ssh/known_hosts".to_owned()));
    assert_eq!(argv[argv.len() - 3], "hv.example.com");
    assert_eq!(argv[argv.len() - 2], "--");
    assert_eq!(
      argv.last().unwrap(),
      "sudo libvirt-storage-attach -operation=delete '-pv-id=pv-1; reboot'"
    );
  }

  #[test]
  fn inline_key_is_written_privately() {
    let runner = SshRunner::with_client(
      "/usr/bin/ssh",
      config(SshIdentity::Inline("-----BEGIN KEY-----".into())),
    )
    .unwrap();

    let content = fs::read_to_string(runner.key_file()).unwrap();
    assert_eq!(content, "-----BEGIN KEY-----\n");

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      let mode = fs::metadata(runner.key_file()).unwrap().permissions().mode();
      assert_eq!(mode & 0o077, 0);
    }

    let path = runner.key_file().to_owned();
    drop(runner);
    assert!(!path.exists());
  }

  #[test]
  fn debug_hides_inline_key() {
    let rendered = format!("{:?}", SshIdentity::Inline("secret".into()));
    assert!(!rendered.contains("secret"));
  }
}
