use crate::backend::DEFAULT_BACKEND_COMMAND;
use clap::{ArgAction, Parser, ValueEnum};
use libvirt_csi_exec::{ExecError, SshConfig, SshIdentity};
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_CSI_ADDRESS: &str = "/run/csi/socket";

/// Which CSI services the process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Role {
  /// Identity and Controller, run once per cluster.
  Controller,
  /// Identity and Node, run on every worker.
  #[value(alias = "driver")]
  Node,
}

/// libvirt-csi: CSI plugin for block volumes carved out of a libvirt
/// host's logical volume storage.
#[derive(Debug, Clone, Parser)]
#[command(name = "libvirt-csi", version, about, long_about = None)]
pub struct Config {
  /// Which gRPC services to run
  #[arg(long, env = "GRPC_SERVICE", value_enum, default_value_t = Role::Controller)]
  pub grpc_service: Role,

  /// Unix socket the CSI services listen on
  #[arg(long, env = "CSI_ADDRESS", default_value = DEFAULT_CSI_ADDRESS)]
  pub csi_address: PathBuf,

  /// Name of the node this plugin runs on (node role)
  #[arg(long, env = "KUBE_NODE_NAME")]
  pub node_name: Option<String>,

  /// Hypervisor to run backend commands on, as host or host:port (controller role)
  #[arg(long, env = "SSH_HOST")]
  pub ssh_host: Option<String>,

  /// User to log in to the hypervisor as (controller role)
  #[arg(long, env = "SSH_USER")]
  pub ssh_user: Option<String>,

  /// known_hosts file holding the hypervisor's host key (controller role)
  #[arg(long, env = "SSH_KNOWN_HOSTS")]
  pub ssh_known_hosts: Option<PathBuf>,

  /// Private key material used to log in (controller role)
  #[arg(long, env = "SSH_PRIVATE_KEY", hide_env_values = true, conflicts_with = "ssh_private_key_file")]
  pub ssh_private_key: Option<String>,

  /// Private key file used to log in (controller role)
  #[arg(long, env = "SSH_PRIVATE_KEY_FILE")]
  pub ssh_private_key_file: Option<PathBuf>,

  /// Storage tool invoked on the hypervisor
  #[arg(long, env = "BACKEND_COMMAND", default_value = DEFAULT_BACKEND_COMMAND)]
  pub backend_command: String,

  /// Run the storage tool through sudo
  #[arg(long, env = "BACKEND_SUDO", default_value_t = true, action = ArgAction::Set)]
  pub backend_sudo: bool,

  /// Log level (trace, debug, info, warn, error) or a tracing filter directive
  #[arg(long, env = "LOG_LEVEL", default_value = "info")]
  pub log_level: String,

  /// Output logs as JSON
  #[arg(long, env = "LOG_JSON")]
  pub log_json: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("{0} is required when running the {1:?} role")]
  Missing(&'static str, Role),

  #[error("invalid ssh settings: {0}")]
  Ssh(#[from] ExecError),
}

impl Config {
  /// Checks that every setting the selected role needs is present.
  pub fn validate(&self) -> Result<(), ConfigError> {
    match self.grpc_service {
      Role::Controller => self.ssh_config().map(drop),
      Role::Node => self.node_name().map(drop),
    }
  }

  pub fn node_name(&self) -> Result<&str, ConfigError> {
    match self.node_name.as_deref() {
      Some(name) if !name.is_empty() => Ok(name),
      _ => Err(ConfigError::Missing("--node-name", Role::Node)),
    }
  }

  pub fn ssh_config(&self) -> Result<SshConfig, ConfigError> {
    let missing = |name| ConfigError::Missing(name, Role::Controller);

    let host = self.ssh_host.as_deref().ok_or_else(|| missing("--ssh-host"))?;
    let user = self.ssh_user.clone().ok_or_else(|| missing("--ssh-user"))?;
    let known_hosts = self
      .ssh_known_hosts
      .clone()
      .ok_or_else(|| missing("--ssh-known-hosts"))?;

    let identity = match (&self.ssh_private_key, &self.ssh_private_key_file) {
      (Some(key), _) if !key.is_empty() => SshIdentity::Inline(key.clone()),
      (_, Some(path)) => SshIdentity::File(path.clone()),
      _ => return Err(missing("--ssh-private-key or --ssh-private-key-file")),
    };

    Ok(SshConfig::new(host, user, known_hosts, identity)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  fn parse(args: &[&str]) -> Config {
    Config::try_parse_from(Some("libvirt-csi").into_iter().chain(args.iter().copied())).unwrap()
  }

  const CONTROLLER: &[&str] = &[
    "--ssh-host",
    "hv.example.com:2222",
    "--ssh-user",
    "csi",
    "--ssh-known-hosts",
    "/etc/csi/known_hosts",
    "--ssh-private-key-file",
    "/etc/csi/id_ed25519",
  ];

  #[test]
  fn defaults() {
    let config = parse(CONTROLLER);

    assert_eq!(config.grpc_service, Role::Controller);
    assert_eq!(config.csi_address, PathBuf::from("/run/csi/socket"));
    assert_eq!(config.backend_command, "libvirt-storage-attach");
    assert!(config.backend_sudo);
    config.validate().unwrap();

    let ssh = config.ssh_config().unwrap();
    assert_eq!(ssh.host(), "hv.example.com");
    assert_eq!(ssh.port(), 2222);
  }

  #[test_case("node"; "node")]
  #[test_case("driver"; "legacy name")]
  fn node_role(name: &str) {
    let config = parse(&["--grpc-service", name, "--node-name", "worker-1"]);

    assert_eq!(config.grpc_service, Role::Node);
    assert_eq!(config.node_name().unwrap(), "worker-1");
    config.validate().unwrap();
  }

  #[test]
  fn node_role_needs_node_name() {
    let config = parse(&["--grpc-service", "node"]);

    assert!(matches!(
      config.validate(),
      Err(ConfigError::Missing("--node-name", Role::Node))
    ));
  }

  #[test]
  fn controller_role_needs_ssh() {
    let config = parse(&["--ssh-host", "hv"]);

    assert!(matches!(
      config.validate(),
      Err(ConfigError::Missing("--ssh-user", Role::Controller))
    ));
  }

  #[test]
  fn inline_key_wins() {
    let mut config = parse(CONTROLLER);
    config.ssh_private_key = Some("-----BEGIN KEY-----".into());

    config.ssh_config().unwrap();
  }

  #[test]
  fn sudo_can_be_disabled() {
    let mut args = CONTROLLER.to_vec();
    args.extend(["--backend-sudo", "false"].iter().copied());

    assert!(!parse(&args).backend_sudo);
  }
}
