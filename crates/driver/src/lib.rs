//! CSI plugin for block volumes backed by logical volumes on a libvirt
//! hypervisor.
//!
//! The controller role runs the hypervisor's storage tool over ssh to
//! create, attach and list volumes. The node role finds the attached disk
//! inside the guest by its serial and brings it up to a mounted
//! filesystem.

pub mod backend;
pub mod config;
pub mod controller;
pub mod locks;
pub mod node;
pub mod server;

pub use backend::Backend;
pub use config::{Config, Role};
pub use controller::LibvirtController;
pub use node::LibvirtNode;

pub const PLUGIN_NAME: &str = "libvirt-csi.nijave.github.com";
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");
