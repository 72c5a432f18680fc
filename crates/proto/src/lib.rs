//! Typed CSI v1 surface for the libvirt storage plugin.
//!
//! Each CSI role is a trait ([`IdentityService`], [`ControllerService`],
//! [`NodeService`]) carrying only the operations the plugin implements.
//! The tonic adapters in [`controller`] and [`node`] translate wire messages
//! into the typed requests of this crate, and answer every operation the
//! plugin does not implement with `Unimplemented`.

macro_rules! unsupported {
  ($name:expr) => {{
    ::tracing::warn!("Unsupported method {} called", $name);
    return Err(::tonic::Status::new(
      ::tonic::Code::Unimplemented,
      format!("method {} not implemented", $name),
    ));
  }};
}

pub mod controller;
pub mod node;
pub mod plugin;
pub mod volume;

#[allow(clippy::all)]
pub mod proto {
  tonic::include_proto!("csi.v1");
}

mod secrets;
mod utils;

use std::{collections::HashMap, sync::Arc};

use lazy_static::lazy_static;

pub use controller::{Controller, ControllerService};
pub use node::{Node, NodeService};
pub use plugin::{Identity, PluginCapabilities};
pub use proto::{
  controller_server::ControllerServer, identity_server::IdentityServer, node_server::NodeServer,
};

pub trait IdentityService: Send + Sync + 'static {
  /// The name MUST follow domain name notation format
  /// (<https://tools.ietf.org/html/rfc1035#section-2.3.1>). It MUST be 63
  /// characters or less, beginning and ending with an alphanumeric
  /// character ([a-z0-9A-Z]) with dashes (-), dots (.), and
  /// alphanumerics between.
  fn name(&self) -> &str;

  /// Plugin version. Value of this field is opaque to the CO.
  fn version(&self) -> &str;

  /// Plugin-wide capabilities reported by `GetPluginCapabilities`.
  #[inline]
  fn plugin_capabilities(&self) -> PluginCapabilities {
    PluginCapabilities::CONTROLLER_SERVICE
  }

  #[inline]
  fn ready(&self) -> bool {
    true
  }

  #[inline]
  fn manifest(&self) -> &HashMap<String, String> {
    lazy_static! {
      static ref EMPTY_MANIFEST: HashMap<String, String> = HashMap::new();
    }

    &EMPTY_MANIFEST
  }
}

/// Builds the gRPC services registered by a plugin running in the controller role.
pub fn controller_services<T: ControllerService>(
  service: Arc<T>,
) -> (IdentityServer<Identity<T>>, ControllerServer<Controller<T>>) {
  (
    IdentityServer::new(Identity::new(service.clone())),
    ControllerServer::new(Controller::new(service)),
  )
}

/// Builds the gRPC services registered by a plugin running in the node role.
pub fn node_services<T: NodeService>(
  service: Arc<T>,
) -> (IdentityServer<Identity<T>>, NodeServer<Node<T>>) {
  (
    IdentityServer::new(Identity::new(service.clone())),
    NodeServer::new(Node::new(service)),
  )
}
