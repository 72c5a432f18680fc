use crate::{proto, secrets::Secrets, utils::required};
use std::convert::TryFrom;
use thiserror::Error;

#[derive(Debug)]
pub struct ControllerUnpublishVolumeRequest {
  volume_id: String,
  node_id: Option<String>,
  secrets: Secrets,
}

impl ControllerUnpublishVolumeRequest {
  /// The ID of the volume. This field is REQUIRED.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// The ID of the node. This field is OPTIONAL. If the value is unset,
  /// the SP MUST unpublish the volume from all nodes it is published to.
  #[inline]
  pub fn node_id(&self) -> Option<&str> {
    self.node_id.as_deref()
  }

  #[inline]
  pub fn secrets(&self) -> &Secrets {
    &self.secrets
  }
}

impl TryFrom<proto::ControllerUnpublishVolumeRequest> for ControllerUnpublishVolumeRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::ControllerUnpublishVolumeRequest) -> Result<Self, Self::Error> {
    let volume_id = required(
      value.volume_id,
      "ControllerUnpublishVolumeRequest.volume_id is empty",
    )?;

    let node_id = match value.node_id {
      v if v.is_empty() => None,
      v => Some(v),
    };

    Ok(ControllerUnpublishVolumeRequest {
      volume_id,
      node_id,
      secrets: value.secrets.into(),
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ControllerUnpublishVolumeError {
  /// The backend failed to detach the volume. Carries its message verbatim.
  #[error("{0}")]
  Backend(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

impl From<ControllerUnpublishVolumeError> for tonic::Status {
  fn from(value: ControllerUnpublishVolumeError) -> Self {
    use tonic::{Code, Status};

    match value {
      ControllerUnpublishVolumeError::Backend(v) => Status::new(Code::Internal, v),
      ControllerUnpublishVolumeError::Other(v) => v,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn node_id_is_optional() {
    let request = ControllerUnpublishVolumeRequest::try_from(proto::ControllerUnpublishVolumeRequest {
      volume_id: "pv-1".into(),
      ..Default::default()
    })
    .unwrap();

    assert_eq!(request.node_id(), None);
  }

  #[test]
  fn volume_id_is_required() {
    let err = ControllerUnpublishVolumeRequest::try_from(proto::ControllerUnpublishVolumeRequest {
      node_id: "node-a".into(),
      ..Default::default()
    })
    .unwrap_err();

    assert_eq!(err.code(), tonic::Code::InvalidArgument);
  }
}
