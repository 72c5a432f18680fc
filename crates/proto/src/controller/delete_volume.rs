use crate::{proto, secrets::Secrets, utils::required};
use std::convert::TryFrom;
use thiserror::Error;

#[derive(Debug)]
pub struct DeleteVolumeRequest {
  volume_id: String,
  secrets: Secrets,
}

impl DeleteVolumeRequest {
  /// The ID of the volume to be deprovisioned.
  /// This field is REQUIRED.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  #[inline]
  pub fn secrets(&self) -> &Secrets {
    &self.secrets
  }
}

impl TryFrom<proto::DeleteVolumeRequest> for DeleteVolumeRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::DeleteVolumeRequest) -> Result<Self, Self::Error> {
    Ok(DeleteVolumeRequest {
      volume_id: required(value.volume_id, "DeleteVolumeRequest.volume_id is empty")?,
      secrets: value.secrets.into(),
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DeleteVolumeError {
  /// The backend has no logical volume with the requested id.
  #[error("{0}")]
  VolumeNotFound(String),

  /// The backend rejected the deletion. Carries the backend's stderr.
  #[error("{0}")]
  Backend(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

impl From<DeleteVolumeError> for tonic::Status {
  fn from(value: DeleteVolumeError) -> tonic::Status {
    use tonic::{Code, Status};

    match value {
      DeleteVolumeError::VolumeNotFound(v) => Status::new(Code::NotFound, v),
      DeleteVolumeError::Backend(v) => Status::new(Code::Internal, v),
      DeleteVolumeError::Other(v) => v,
    }
  }
}
