use anyhow::Context;
use clap::Parser;
use libvirt_csi::{
  server::{serve_controller, serve_node},
  Backend, Config, LibvirtController, LibvirtNode, Role, PLUGIN_NAME, PLUGIN_VERSION,
};
use libvirt_csi_exec::{LocalRunner, SshRunner};
use libvirt_csi_mount_utils::missing_tools;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(config: &Config) -> anyhow::Result<()> {
  let filter = EnvFilter::try_new(&config.log_level)
    .with_context(|| format!("invalid log level {:?}", config.log_level))?
    .add_directive("h2=warn".parse()?)
    .add_directive("tower=warn".parse()?);

  if config.log_json {
    tracing_subscriber::registry()
      .with(filter)
      .with(fmt::layer().json())
      .try_init()?;
  } else {
    tracing_subscriber::registry()
      .with(filter)
      .with(fmt::layer().with_target(true))
      .try_init()?;
  }

  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let config = Config::parse();
  init_logging(&config)?;
  config.validate()?;

  info!(
    name = PLUGIN_NAME,
    version = PLUGIN_VERSION,
    role = ?config.grpc_service,
    socket = %config.csi_address.display(),
    "starting"
  );

  match config.grpc_service {
    Role::Controller => {
      let runner = SshRunner::new(config.ssh_config()?).context("failed to set up ssh")?;
      let backend = Backend::new(runner, config.backend_command.as_str(), config.backend_sudo);
      let controller = Arc::new(LibvirtController::new(backend));
      serve_controller(&config.csi_address, controller).await?;
    }
    Role::Node => {
      let missing = missing_tools();
      if !missing.is_empty() {
        warn!(?missing, "tools needed to publish volumes are not on PATH");
      }

      let node = Arc::new(LibvirtNode::new(config.node_name()?, LocalRunner));
      serve_node(&config.csi_address, node).await?;
    }
  }

  info!("shutdown complete");
  Ok(())
}
