use crate::{
  proto,
  volume::{Volume, VolumeStatus},
};
use std::{convert::TryFrom, num::NonZeroU32};
use thiserror::Error;

#[derive(Debug)]
pub struct ListVolumesRequest {
  max_entries: Option<NonZeroU32>,
  starting_token: Option<String>,
}

impl ListVolumesRequest {
  /// If specified (non-zero value), the Plugin MUST NOT return more
  /// entries than this number in the response. If not specified (zero
  /// value), it means there is no restriction on the number of entries
  /// that can be returned.
  #[inline]
  pub fn max_entries(&self) -> Option<NonZeroU32> {
    self.max_entries
  }

  /// A token to specify where to start paginating. Set this field to
  /// `next_token` returned by a previous `ListVolumes` call to get the
  /// next page of entries. This field is OPTIONAL.
  #[inline]
  pub fn starting_token(&self) -> Option<&str> {
    self.starting_token.as_deref()
  }
}

impl TryFrom<proto::ListVolumesRequest> for ListVolumesRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::ListVolumesRequest) -> Result<Self, Self::Error> {
    let max_entries = match value.max_entries {
      v if v < 0 => {
        return Err(tonic::Status::invalid_argument(
          "ListVolumesRequest.max_entries was less than 0",
        ))
      }
      v => NonZeroU32::new(v as u32),
    };

    let starting_token = match value.starting_token {
      v if v.is_empty() => None,
      v => Some(v),
    };

    Ok(ListVolumesRequest {
      max_entries,
      starting_token,
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeListEntry {
  volume: Volume,
  status: VolumeStatus,
}

impl VolumeListEntry {
  pub fn new(volume: Volume, status: VolumeStatus) -> Self {
    VolumeListEntry { volume, status }
  }

  #[inline]
  pub fn volume(&self) -> &Volume {
    &self.volume
  }

  /// Published node ids, reported since the plugin advertises
  /// `LIST_VOLUMES_PUBLISHED_NODES`.
  #[inline]
  pub fn status(&self) -> &VolumeStatus {
    &self.status
  }
}

impl From<VolumeListEntry> for proto::list_volumes_response::Entry {
  fn from(value: VolumeListEntry) -> Self {
    proto::list_volumes_response::Entry {
      volume: Some(value.volume.into()),
      status: Some(value.status.into()),
    }
  }
}

/// A single, complete page of volumes. Pagination is not supported so
/// `next_token` is always empty on the wire.
#[derive(Debug, Default)]
pub struct ListVolumesResponse {
  entries: Vec<VolumeListEntry>,
}

impl ListVolumesResponse {
  pub fn new(entries: Vec<VolumeListEntry>) -> Self {
    ListVolumesResponse { entries }
  }

  #[inline]
  pub fn entries(&self) -> &[VolumeListEntry] {
    &self.entries
  }
}

impl From<ListVolumesResponse> for proto::ListVolumesResponse {
  fn from(value: ListVolumesResponse) -> Self {
    proto::ListVolumesResponse {
      entries: value.entries.into_iter().map(Into::into).collect(),
      next_token: String::new(),
    }
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ListVolumesError {
  /// Indicates that `starting_token` is not valid.
  #[error("Invalid `starting_token`: {0}")]
  InvalidStartingToken(String),

  /// The backend's listing could not be parsed.
  #[error("Failed to parse volume list: {0}")]
  MalformedOutput(String),

  /// The backend list operation failed. Carries its message verbatim.
  #[error("{0}")]
  Backend(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

use tonic::{Code, Status};
impl From<ListVolumesError> for tonic::Status {
  fn from(value: ListVolumesError) -> Self {
    match value {
      ListVolumesError::Other(v) => v,
      value => {
        let code = match &value {
          ListVolumesError::InvalidStartingToken(_) => Code::Aborted,
          ListVolumesError::MalformedOutput(_) => Code::Internal,
          ListVolumesError::Backend(_) => Code::Internal,
          ListVolumesError::Other(_) => unreachable!(),
        };

        Status::new(code, value.to_string())
      }
    }
  }
}
