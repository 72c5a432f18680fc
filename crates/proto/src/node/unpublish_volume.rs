use crate::{
  proto,
  utils::{absolute_path, required},
};
use std::{
  convert::TryFrom,
  path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug)]
pub struct NodeUnpublishVolumeRequest {
  volume_id: String,
  target_path: PathBuf,
}

impl NodeUnpublishVolumeRequest {
  /// The ID of the volume. This field is REQUIRED.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// The path at which the volume was published. It MUST be an absolute
  /// path in the root filesystem of the process serving this request.
  /// The SP MUST delete the file or directory it created at this path.
  /// This is a REQUIRED field.
  #[inline]
  pub fn target_path(&self) -> &Path {
    &self.target_path
  }
}

impl TryFrom<proto::NodeUnpublishVolumeRequest> for NodeUnpublishVolumeRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::NodeUnpublishVolumeRequest) -> Result<Self, Self::Error> {
    Ok(NodeUnpublishVolumeRequest {
      volume_id: required(
        value.volume_id,
        "NodeUnpublishVolumeRequest.volume_id is empty",
      )?,
      target_path: absolute_path(value.target_path, "NodeUnpublishVolumeRequest.target_path")?,
    })
  }
}

#[derive(Debug, Error)]
pub enum NodeUnpublishVolumeError {
  /// Unmounting failed. Carries the tool's message verbatim.
  #[error("{0}")]
  Failed(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

impl From<NodeUnpublishVolumeError> for tonic::Status {
  fn from(value: NodeUnpublishVolumeError) -> Self {
    match value {
      NodeUnpublishVolumeError::Failed(v) => tonic::Status::internal(v),
      NodeUnpublishVolumeError::Other(v) => v,
    }
  }
}
