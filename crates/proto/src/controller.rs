mod capabilities;
mod create_volume;
mod delete_volume;
mod list_volumes;
mod publish_volume;
mod unpublish_volume;
mod validate_volume_capabilities;

use crate::{
  proto,
  utils::{dispatch, Record},
  IdentityService,
};
use async_trait::async_trait;
use std::{convert::TryInto, sync::Arc};
use tracing::instrument;

pub use crate::secrets::Secrets;
pub use crate::volume::*;
pub use capabilities::*;
pub use create_volume::*;
pub use delete_volume::*;
pub use list_volumes::*;
pub use publish_volume::*;
pub use unpublish_volume::*;
pub use validate_volume_capabilities::*;

/// The controller role. Every method is an operation the plugin
/// implements; the remaining CSI controller RPCs are answered with
/// `Unimplemented` by [`Controller`].
#[async_trait]
pub trait ControllerService: IdentityService {
  /// Get the set of services provided by this controller.
  fn capabilities(&self) -> ControllerCapabilities;

  /// This RPC will be called by the CO to provision a new volume on behalf of a user
  /// (to be consumed as either a block device or a mounted filesystem).
  ///
  /// This operation MUST be idempotent.
  async fn create_volume(&self, request: CreateVolumeRequest) -> Result<Volume, CreateVolumeError>;

  /// This RPC will be called by the CO to deprovision a volume.
  ///
  /// This operation MUST be idempotent. If a volume corresponding to the specified volume_id
  /// does not exist or the artifacts associated with the volume do not exist anymore, the
  /// Plugin MUST reply 0 OK.
  async fn delete_volume(&self, request: DeleteVolumeRequest) -> Result<(), DeleteVolumeError>;

  /// This RPC will be called by the CO when it wants to place a workload that uses the
  /// volume onto a node. The Plugin SHOULD perform the work that is necessary for making
  /// the volume available on the given node. The Plugin MUST NOT assume that this RPC
  /// will be executed on the node where the volume will be used.
  ///
  /// This operation MUST be idempotent.
  async fn controller_publish_volume(
    &self,
    request: ControllerPublishVolumeRequest,
  ) -> Result<ControllerPublishVolumeResponse, ControllerPublishVolumeError>;

  /// This RPC is a reverse operation of ControllerPublishVolume. It MUST be called after
  /// all NodeUnstageVolume and NodeUnpublishVolume on the volume are called and succeed.
  ///
  /// This operation MUST be idempotent.
  async fn controller_unpublish_volume(
    &self,
    request: ControllerUnpublishVolumeRequest,
  ) -> Result<(), ControllerUnpublishVolumeError>;

  /// This RPC will be called by the CO to check if a pre-provisioned volume has all the
  /// capabilities that the CO wants. This operation MUST be idempotent.
  async fn validate_volume_capabilities(
    &self,
    request: ValidateVolumeCapabilitiesRequest,
  ) -> Result<ValidateVolumeCapabilitiesResponse, ValidateVolumeCapabilitiesError>;

  /// The Plugin SHALL return the information about all the volumes that it knows about.
  async fn list_volumes(
    &self,
    request: ListVolumesRequest,
  ) -> Result<ListVolumesResponse, ListVolumesError>;
}

/// Exposes a [`ControllerService`] as the CSI `Controller` gRPC service.
pub struct Controller<T: ControllerService>(Arc<T>);

impl<T: ControllerService> Controller<T> {
  pub fn new(service: Arc<T>) -> Self {
    Controller(service)
  }
}

#[async_trait]
impl<T: ControllerService> proto::controller_server::Controller for Controller<T> {
  #[instrument(name = "controller.create_volume", skip_all, fields(request, response))]
  async fn create_volume(
    &self,
    request: tonic::Request<proto::CreateVolumeRequest>,
  ) -> Result<tonic::Response<proto::CreateVolumeResponse>, tonic::Status> {
    let volume = dispatch(request, |r| self.0.create_volume(r)).await?;
    Ok(tonic::Response::new(volume.try_into()?))
  }

  #[instrument(name = "controller.delete_volume", skip_all, fields(request))]
  async fn delete_volume(
    &self,
    request: tonic::Request<proto::DeleteVolumeRequest>,
  ) -> Result<tonic::Response<proto::DeleteVolumeResponse>, tonic::Status> {
    dispatch(request, |r| self.0.delete_volume(r)).await?;
    Ok(tonic::Response::new(proto::DeleteVolumeResponse {}))
  }

  #[instrument(
    name = "controller.controller_publish_volume",
    skip_all,
    fields(request, response)
  )]
  async fn controller_publish_volume(
    &self,
    request: tonic::Request<proto::ControllerPublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerPublishVolumeResponse>, tonic::Status> {
    let published = dispatch(request, |r| self.0.controller_publish_volume(r)).await?;
    Ok(tonic::Response::new(published.into()))
  }

  #[instrument(name = "controller.controller_unpublish_volume", skip_all, fields(request))]
  async fn controller_unpublish_volume(
    &self,
    request: tonic::Request<proto::ControllerUnpublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerUnpublishVolumeResponse>, tonic::Status> {
    dispatch(request, |r| self.0.controller_unpublish_volume(r)).await?;
    Ok(tonic::Response::new(proto::ControllerUnpublishVolumeResponse {}))
  }

  #[instrument(
    name = "controller.validate_volume_capabilities",
    skip_all,
    fields(request, response)
  )]
  async fn validate_volume_capabilities(
    &self,
    request: tonic::Request<proto::ValidateVolumeCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::ValidateVolumeCapabilitiesResponse>, tonic::Status> {
    let validated = dispatch(request, |r| self.0.validate_volume_capabilities(r)).await?;
    Ok(tonic::Response::new(validated.into()))
  }

  #[instrument(name = "controller.list_volumes", skip_all, fields(request, response))]
  async fn list_volumes(
    &self,
    request: tonic::Request<proto::ListVolumesRequest>,
  ) -> Result<tonic::Response<proto::ListVolumesResponse>, tonic::Status> {
    let listed = dispatch(request, |r| self.0.list_volumes(r)).await?;
    Ok(tonic::Response::new(listed.into()))
  }

  #[instrument(name = "controller.controller_get_capabilities", skip_all, fields(response))]
  async fn controller_get_capabilities(
    &self,
    _request: tonic::Request<proto::ControllerGetCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::ControllerGetCapabilitiesResponse>, tonic::Status> {
    let capabilities = self.0.capabilities().record_response();
    Ok(tonic::Response::new(capabilities.into()))
  }

  async fn get_capacity(
    &self,
    _request: tonic::Request<proto::GetCapacityRequest>,
  ) -> Result<tonic::Response<proto::GetCapacityResponse>, tonic::Status> {
    unsupported!("GetCapacity")
  }

  async fn create_snapshot(
    &self,
    _request: tonic::Request<proto::CreateSnapshotRequest>,
  ) -> Result<tonic::Response<proto::CreateSnapshotResponse>, tonic::Status> {
    unsupported!("CreateSnapshot")
  }

  async fn delete_snapshot(
    &self,
    _request: tonic::Request<proto::DeleteSnapshotRequest>,
  ) -> Result<tonic::Response<proto::DeleteSnapshotResponse>, tonic::Status> {
    unsupported!("DeleteSnapshot")
  }

  async fn list_snapshots(
    &self,
    _request: tonic::Request<proto::ListSnapshotsRequest>,
  ) -> Result<tonic::Response<proto::ListSnapshotsResponse>, tonic::Status> {
    unsupported!("ListSnapshots")
  }

  async fn controller_expand_volume(
    &self,
    _request: tonic::Request<proto::ControllerExpandVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerExpandVolumeResponse>, tonic::Status> {
    unsupported!("ControllerExpandVolume")
  }

  async fn controller_get_volume(
    &self,
    _request: tonic::Request<proto::ControllerGetVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerGetVolumeResponse>, tonic::Status> {
    unsupported!("ControllerGetVolume")
  }
}
