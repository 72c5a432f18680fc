use crate::{
  proto,
  secrets::Secrets,
  utils::required,
  volume::{capabilities_from_proto, VolumeCapability},
};
use std::{collections::HashMap, convert::TryFrom};
use thiserror::Error;

#[derive(Debug)]
pub struct ValidateVolumeCapabilitiesRequest {
  volume_id: String,
  volume_context: HashMap<String, String>,
  volume_capabilities: Vec<VolumeCapability>,
  parameters: HashMap<String, String>,
  secrets: Secrets,
}

impl ValidateVolumeCapabilitiesRequest {
  /// The ID of the volume to check. This field is REQUIRED.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// Volume context as returned by SP in
  /// CreateVolumeResponse.Volume.volume_context.
  #[inline]
  pub fn volume_context(&self) -> &HashMap<String, String> {
    &self.volume_context
  }

  /// The capabilities that the CO wants to check for the volume. This
  /// field is REQUIRED.
  #[inline]
  pub fn volume_capabilities(&self) -> &[VolumeCapability] {
    &self.volume_capabilities
  }

  /// See CreateVolumeRequest.parameters.
  #[inline]
  pub fn parameters(&self) -> &HashMap<String, String> {
    &self.parameters
  }

  #[inline]
  pub fn secrets(&self) -> &Secrets {
    &self.secrets
  }
}

impl TryFrom<proto::ValidateVolumeCapabilitiesRequest> for ValidateVolumeCapabilitiesRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::ValidateVolumeCapabilitiesRequest) -> Result<Self, Self::Error> {
    let volume_id = required(
      value.volume_id,
      "ValidateVolumeCapabilitiesRequest.volume_id is empty",
    )?;

    if value.volume_capabilities.is_empty() {
      return Err(tonic::Status::invalid_argument(
        "Missing ValidateVolumeCapabilitiesRequest.volume_capabilities",
      ));
    }

    Ok(ValidateVolumeCapabilitiesRequest {
      volume_id,
      volume_context: value.volume_context,
      volume_capabilities: capabilities_from_proto(value.volume_capabilities)?,
      parameters: value.parameters,
      secrets: value.secrets.into(),
    })
  }
}

#[derive(Debug, Default)]
pub struct Confirmed {
  /// Volume context validated by the plugin.
  volume_context: HashMap<String, String>,
  /// Volume capabilities supported by the plugin.
  volume_capabilities: Vec<VolumeCapability>,
  /// The volume creation parameters validated by the plugin.
  parameters: HashMap<String, String>,
}

impl Confirmed {
  pub fn new(
    volume_context: HashMap<String, String>,
    volume_capabilities: Vec<VolumeCapability>,
  ) -> Self {
    Confirmed {
      volume_context,
      volume_capabilities,
      parameters: HashMap::new(),
    }
  }

  #[inline]
  pub fn volume_context(&self) -> &HashMap<String, String> {
    &self.volume_context
  }

  #[inline]
  pub fn volume_capabilities(&self) -> &[VolumeCapability] {
    &self.volume_capabilities
  }
}

impl From<Confirmed> for proto::validate_volume_capabilities_response::Confirmed {
  fn from(value: Confirmed) -> Self {
    proto::validate_volume_capabilities_response::Confirmed {
      volume_context: value.volume_context,
      volume_capabilities: value
        .volume_capabilities
        .into_iter()
        .map(Into::into)
        .collect(),
      parameters: value.parameters,
    }
  }
}

#[derive(Debug)]
pub enum ValidateVolumeCapabilitiesResponse {
  Confirmed(Confirmed),
  Message(String),
}

impl From<ValidateVolumeCapabilitiesResponse> for proto::ValidateVolumeCapabilitiesResponse {
  fn from(value: ValidateVolumeCapabilitiesResponse) -> Self {
    match value {
      ValidateVolumeCapabilitiesResponse::Confirmed(confirmed) => {
        proto::ValidateVolumeCapabilitiesResponse {
          confirmed: Some(confirmed.into()),
          message: Default::default(),
        }
      }

      ValidateVolumeCapabilitiesResponse::Message(message) => {
        proto::ValidateVolumeCapabilitiesResponse {
          confirmed: None,
          message,
        }
      }
    }
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ValidateVolumeCapabilitiesError {
  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

impl From<ValidateVolumeCapabilitiesError> for tonic::Status {
  fn from(value: ValidateVolumeCapabilitiesError) -> Self {
    match value {
      ValidateVolumeCapabilitiesError::Other(v) => v,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::volume::AccessMode;

  #[test]
  fn capabilities_are_required() {
    let err = ValidateVolumeCapabilitiesRequest::try_from(proto::ValidateVolumeCapabilitiesRequest {
      volume_id: "pv-1".into(),
      ..Default::default()
    })
    .unwrap_err();

    assert_eq!(err.code(), tonic::Code::InvalidArgument);
  }

  #[test]
  fn confirmed_to_wire() {
    let mut context = HashMap::new();
    context.insert("volumeGroup".to_owned(), "vg0".to_owned());

    let response = ValidateVolumeCapabilitiesResponse::Confirmed(Confirmed::new(
      context,
      vec![VolumeCapability::mount(AccessMode::SingleNodeWriter)],
    ));
    let wire: proto::ValidateVolumeCapabilitiesResponse = response.into();
    let confirmed = wire.confirmed.unwrap();

    assert_eq!(confirmed.volume_context["volumeGroup"], "vg0");
    assert_eq!(confirmed.volume_capabilities.len(), 1);
    assert!(matches!(
      confirmed.volume_capabilities[0].access_type,
      Some(proto::volume_capability::AccessType::Mount(_))
    ));
  }
}
