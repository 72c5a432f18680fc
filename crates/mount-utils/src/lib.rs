//! Host-side block device handling for the node role: finding the disk
//! that backs a volume, bringing it from a blank disk to a mounted
//! filesystem, and reading its usage.
//!
//! Nothing here keeps state between calls. Every operation probes the
//! host through the external tools again.

cfg_if::cfg_if! {
  if #[cfg(unix)] {
    mod lsblk;
    mod provision;
    mod stats;
  } else {
    compile_error!("Only cfg(unix) is supported at this time")
  }
}

pub use lsblk::{expected_serial, find_device, parse_block_devices, BlockDevice, BlockDeviceLocator};
pub use provision::{DeviceState, Provisioner, DEFAULT_FS_TYPE};
pub use stats::{parse_disk_usage, probe_disk_usage, DiskUsage};

use libvirt_csi_exec::ExecError;
use std::{io, result};
use thiserror::Error;
use which::which;

pub type Result<T> = result::Result<T, MountError>;

/// Tools the node role shells out to.
pub const REQUIRED_TOOLS: &[&str] = &["lsblk", "parted", "blkid", "mkfs", "mount", "umount", "df"];

#[derive(Debug, Error)]
pub enum MountError {
  #[error("volume id {0:?} is not of the form pv-<uuid>")]
  InvalidVolumeId(String),

  #[error("no block device with serial {serial} found for volume {volume_id}")]
  DeviceNotFound { volume_id: String, serial: String },

  /// A path the operation works on does not exist. Carries the tool's
  /// message.
  #[error("{0}")]
  NotFound(String),

  #[error("failed to parse {what}: {detail}")]
  Parse { what: &'static str, detail: String },

  #[error("{context}: {source}")]
  Io {
    context: String,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Exec(#[from] ExecError),
}

impl MountError {
  pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
    MountError::Io {
      context: context.into(),
      source,
    }
  }

  /// Message for the caller. Tool failures surface the tool's own stderr.
  pub fn message(&self) -> String {
    match self {
      MountError::Exec(e) => e.message(),
      e => e.to_string(),
    }
  }
}

/// Resolves every tool in [`REQUIRED_TOOLS`] on `PATH`, returning the
/// names that are missing.
pub fn missing_tools() -> Vec<&'static str> {
  REQUIRED_TOOLS
    .iter()
    .copied()
    .filter(|tool| which(tool).is_err())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use libvirt_csi_exec::Failure;

  #[test]
  fn exec_message_is_stderr() {
    let err = MountError::from(ExecError::Failed(Failure {
      command: "umount /mnt".into(),
      code: Some(1),
      stdout: String::new(),
      stderr: "umount: /mnt: target is busy.\n".into(),
    }));

    assert_eq!(err.message(), "umount: /mnt: target is busy.");
  }

  #[test]
  fn device_not_found_names_serial() {
    let err = MountError::DeviceNotFound {
      volume_id: "pv-ab-cd".into(),
      serial: "abcd".into(),
    };

    assert_eq!(
      err.to_string(),
      "no block device with serial abcd found for volume pv-ab-cd"
    );
  }
}
