use crate::{
  proto,
  utils::{absolute_path, required},
  volume::{VolumeCondition, VolumeUsage},
};
use std::{
  convert::TryFrom,
  path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug)]
pub struct NodeGetVolumeStatsRequest {
  volume_id: String,
  volume_path: PathBuf,
  staging_target_path: Option<PathBuf>,
}

impl NodeGetVolumeStatsRequest {
  /// The ID of the volume. This field is REQUIRED.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// It can be any valid path where volume was previously
  /// staged or published.
  /// It MUST be an absolute path in the root filesystem of
  /// the process serving this request.
  /// This is a REQUIRED field.
  #[inline]
  pub fn volume_path(&self) -> &Path {
    &self.volume_path
  }

  /// The path where the volume is staged, if the plugin has the
  /// STAGE_UNSTAGE_VOLUME capability, otherwise empty.
  #[inline]
  pub fn staging_target_path(&self) -> Option<&Path> {
    self.staging_target_path.as_deref()
  }
}

impl TryFrom<proto::NodeGetVolumeStatsRequest> for NodeGetVolumeStatsRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::NodeGetVolumeStatsRequest) -> Result<Self, Self::Error> {
    let volume_id = required(
      value.volume_id,
      "NodeGetVolumeStatsRequest.volume_id is empty",
    )?;
    let volume_path = absolute_path(value.volume_path, "NodeGetVolumeStatsRequest.volume_path")?;

    let staging_target_path = match value.staging_target_path {
      v if v.is_empty() => None,
      v => Some(absolute_path(
        v,
        "NodeGetVolumeStatsRequest.staging_target_path",
      )?),
    };

    Ok(NodeGetVolumeStatsRequest {
      volume_id,
      volume_path,
      staging_target_path,
    })
  }
}

#[derive(Debug)]
pub struct NodeGetVolumeStatsResponse {
  usage: Vec<VolumeUsage>,
  volume_condition: Option<VolumeCondition>,
}

impl NodeGetVolumeStatsResponse {
  pub fn new(usage: Vec<VolumeUsage>, volume_condition: Option<VolumeCondition>) -> Self {
    NodeGetVolumeStatsResponse {
      usage,
      volume_condition,
    }
  }

  #[inline]
  pub fn usage(&self) -> &[VolumeUsage] {
    &self.usage
  }

  #[inline]
  pub fn volume_condition(&self) -> Option<&VolumeCondition> {
    self.volume_condition.as_ref()
  }
}

impl From<NodeGetVolumeStatsResponse> for proto::NodeGetVolumeStatsResponse {
  fn from(value: NodeGetVolumeStatsResponse) -> Self {
    proto::NodeGetVolumeStatsResponse {
      usage: value.usage.into_iter().map(Into::into).collect(),
      volume_condition: value.volume_condition.map(Into::into),
    }
  }
}

#[derive(Debug, Error)]
pub enum NodeGetVolumeStatsError {
  /// Indicates that nothing exists at the requested volume path.
  #[error("{0}")]
  VolumeNotFound(String),

  /// The usage probe failed or produced unreadable output.
  #[error("{0}")]
  Failed(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

use tonic::{Code, Status};
impl From<NodeGetVolumeStatsError> for tonic::Status {
  fn from(value: NodeGetVolumeStatsError) -> Self {
    match value {
      NodeGetVolumeStatsError::Other(v) => v,
      NodeGetVolumeStatsError::VolumeNotFound(v) => Status::new(Code::NotFound, v),
      NodeGetVolumeStatsError::Failed(v) => Status::new(Code::Internal, v),
    }
  }
}
