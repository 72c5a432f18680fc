use crate::{
  proto,
  secrets::Secrets,
  utils::required,
  volume::{capabilities_from_proto, CapacityRange, VolumeCapability},
};
use std::{
  collections::HashMap,
  convert::{TryFrom, TryInto},
};
use thiserror::Error;

#[derive(Debug)]
pub struct CreateVolumeRequest {
  name: String,
  capacity_range: Option<CapacityRange>,
  volume_capabilities: Vec<VolumeCapability>,
  parameters: HashMap<String, String>,
  secrets: Secrets,
}

impl CreateVolumeRequest {
  /// The suggested name for the storage space. This field is REQUIRED.
  /// It serves two purposes:
  /// 1) Idempotency - This name is generated by the CO to achieve
  ///    idempotency.
  /// 2) Suggested name - the SP MAY use it as an identifier for the
  ///    new volume.
  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  /// This field is OPTIONAL. This allows the CO to specify the capacity
  /// requirement of the volume to be provisioned. If not specified, the
  /// Plugin MAY choose an implementation-defined capacity range.
  #[inline]
  pub fn capacity_range(&self) -> Option<CapacityRange> {
    self.capacity_range
  }

  /// The capabilities that the provisioned volume MUST have. SP MUST
  /// provision a volume that will satisfy ALL of the capabilities
  /// specified in this list.
  #[inline]
  pub fn volume_capabilities(&self) -> &[VolumeCapability] {
    &self.volume_capabilities
  }

  /// Plugin specific parameters passed in as opaque key-value pairs.
  /// This field is OPTIONAL.
  #[inline]
  pub fn parameters(&self) -> &HashMap<String, String> {
    &self.parameters
  }

  /// Secrets required by plugin to complete volume creation request.
  #[inline]
  pub fn secrets(&self) -> &Secrets {
    &self.secrets
  }
}

impl TryFrom<proto::CreateVolumeRequest> for CreateVolumeRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::CreateVolumeRequest) -> Result<Self, Self::Error> {
    let name = required(value.name, "CreateVolumeRequest.name is empty")?;

    let capacity_range = match value.capacity_range {
      None => None,
      Some(v) => v.try_into()?,
    };

    let volume_capabilities = capabilities_from_proto(value.volume_capabilities)?;

    Ok(CreateVolumeRequest {
      name,
      capacity_range,
      volume_capabilities,
      parameters: value.parameters,
      secrets: value.secrets.into(),
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CreateVolumeError {
  /// A requested capability uses an access mode the plugin cannot
  /// provide. Raised before the backend is contacted.
  #[error("Unsupported volume capability: {0}")]
  UnsupportedCapability(String),

  /// The backend did not produce a volume id.
  #[error("Failed to create volume: {0}")]
  CreationFailed(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

use tonic::{Code, Status};
impl From<CreateVolumeError> for tonic::Status {
  fn from(value: CreateVolumeError) -> Self {
    match value {
      CreateVolumeError::Other(v) => v,
      value => {
        let code = match &value {
          CreateVolumeError::UnsupportedCapability(_) => Code::InvalidArgument,
          CreateVolumeError::CreationFailed(_) => Code::Internal,
          CreateVolumeError::Other(_) => unreachable!(),
        };

        Status::new(code, value.to_string())
      }
    }
  }
}
