use crate::{
  proto,
  secrets::Secrets,
  utils::{absolute_path, required},
  volume::VolumeCapability,
};
use std::{
  collections::HashMap,
  convert::{TryFrom, TryInto},
  path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug)]
pub struct NodePublishVolumeRequest {
  volume_id: String,
  publish_context: HashMap<String, String>,
  target_path: PathBuf,
  volume_capability: VolumeCapability,
  readonly: bool,
  secrets: Secrets,
  volume_context: HashMap<String, String>,
}

impl NodePublishVolumeRequest {
  /// The ID of the volume to publish. This field is REQUIRED.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// The value returned by `ControllerPublishVolume`.
  #[inline]
  pub fn publish_context(&self) -> &HashMap<String, String> {
    &self.publish_context
  }

  /// The path to which the volume will be published. It MUST be an
  /// absolute path in the root filesystem of the process serving this
  /// request. The CO SHALL ensure uniqueness of target_path per volume.
  /// For volumes with an access type of mount, the SP SHALL place the
  /// mounted directory at target_path.
  /// Creation of target_path is the responsibility of the SP.
  /// This is a REQUIRED field.
  #[inline]
  pub fn target_path(&self) -> &Path {
    &self.target_path
  }

  /// Volume capability describing how the CO intends to use this volume.
  /// This is a REQUIRED field.
  #[inline]
  pub fn volume_capability(&self) -> &VolumeCapability {
    &self.volume_capability
  }

  /// Indicates SP MUST publish the volume in readonly mode.
  #[inline]
  pub fn readonly(&self) -> bool {
    self.readonly
  }

  #[inline]
  pub fn secrets(&self) -> &Secrets {
    &self.secrets
  }

  /// Volume context as returned by SP in
  /// CreateVolumeResponse.Volume.volume_context.
  #[inline]
  pub fn volume_context(&self) -> &HashMap<String, String> {
    &self.volume_context
  }
}

impl TryFrom<proto::NodePublishVolumeRequest> for NodePublishVolumeRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::NodePublishVolumeRequest) -> Result<Self, Self::Error> {
    let volume_id = required(value.volume_id, "NodePublishVolumeRequest.volume_id is empty")?;
    let target_path = absolute_path(value.target_path, "NodePublishVolumeRequest.target_path")?;

    let volume_capability = match value.volume_capability {
      None => {
        return Err(tonic::Status::invalid_argument(
          "NodePublishVolumeRequest.volume_capability missing",
        ))
      }
      Some(v) => v.try_into()?,
    };

    Ok(NodePublishVolumeRequest {
      volume_id,
      publish_context: value.publish_context,
      target_path,
      volume_capability,
      readonly: value.readonly,
      secrets: value.secrets.into(),
      volume_context: value.volume_context,
    })
  }
}

#[derive(Debug, Error)]
pub enum NodePublishVolumeError {
  /// No local block device carries the serial derived from the volume id.
  #[error("Device not found for volume: {0}")]
  DeviceNotFound(String),

  /// The device node being mounted disappeared.
  #[error("{0}")]
  VolumeNotFound(String),

  /// The requested capability cannot be provided on this node.
  #[error("Unsupported volume capability: {0}")]
  UnsupportedCapability(String),

  /// A provisioning step failed. Carries the tool's message verbatim.
  #[error("{0}")]
  Failed(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

use tonic::{Code, Status};
impl From<NodePublishVolumeError> for tonic::Status {
  fn from(value: NodePublishVolumeError) -> Self {
    match value {
      NodePublishVolumeError::Other(v) => v,
      value => {
        let code = match &value {
          NodePublishVolumeError::DeviceNotFound(_) => Code::NotFound,
          NodePublishVolumeError::VolumeNotFound(_) => Code::NotFound,
          NodePublishVolumeError::UnsupportedCapability(_) => Code::InvalidArgument,
          NodePublishVolumeError::Failed(_) => Code::Internal,
          NodePublishVolumeError::Other(_) => unreachable!(),
        };

        Status::new(code, value.to_string())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request(target_path: &str) -> proto::NodePublishVolumeRequest {
    proto::NodePublishVolumeRequest {
      volume_id: "pv-1".into(),
      target_path: target_path.into(),
      volume_capability: Some(proto::VolumeCapability {
        access_mode: Some(proto::volume_capability::AccessMode { mode: 1 }),
        access_type: Some(proto::volume_capability::AccessType::Mount(
          proto::volume_capability::MountVolume {
            fs_type: "xfs".into(),
            mount_flags: vec!["noatime".into()],
          },
        )),
      }),
      ..Default::default()
    }
  }

  #[test]
  fn converts_mount_capability() {
    let request = NodePublishVolumeRequest::try_from(request("/mnt/target")).unwrap();
    let mount = request.volume_capability().mount_volume().unwrap();

    assert_eq!(request.target_path(), Path::new("/mnt/target"));
    assert_eq!(mount.fs_type(), Some("xfs"));
    assert_eq!(mount.mount_flags().collect::<Vec<_>>(), vec!["noatime"]);
  }

  #[test]
  fn relative_target_path() {
    let err = NodePublishVolumeRequest::try_from(request("mnt/target")).unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
  }

  #[test]
  fn message_is_verbatim() {
    let status: Status =
      NodePublishVolumeError::VolumeNotFound("mount: /dev/sdb1: does not exist.".into()).into();
    assert_eq!(status.code(), Code::NotFound);
    assert_eq!(status.message(), "mount: /dev/sdb1: does not exist.");
  }
}
