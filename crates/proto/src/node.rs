mod capabilities;
mod get_info;
mod get_volume_stats;
mod publish_volume;
mod unpublish_volume;

use crate::{
  proto,
  utils::{dispatch, Record},
  IdentityService,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

pub use crate::volume::*;
pub use capabilities::*;
pub use get_info::*;
pub use get_volume_stats::*;
pub use publish_volume::*;
pub use unpublish_volume::*;

/// The node role. Staging and expansion are not part of it; [`Node`]
/// answers those RPCs with `Unimplemented`.
#[async_trait]
pub trait NodeService: IdentityService {
  /// Get the set of services provided by this node.
  fn capabilities(&self) -> NodeCapabilities;

  /// Identity of this node as used by `ControllerPublishVolume`.
  fn node_info(&self) -> NodeGetInfoResponse;

  /// This RPC is called by the CO when a workload that wants to use the
  /// specified volume is placed (scheduled) on a node.
  ///
  /// This operation MUST be idempotent. If the volume corresponding to the
  /// `volume_id` has already been published at the specified `target_path`,
  /// and is compatible with the specified `volume_capability` and `readonly`
  /// flag, the Plugin MUST reply `0 OK`.
  async fn node_publish_volume(
    &self,
    request: NodePublishVolumeRequest,
  ) -> Result<(), NodePublishVolumeError>;

  /// A Node Plugin MUST implement this RPC call. This RPC is a reverse
  /// operation of `NodePublishVolume`.
  ///
  /// This operation MUST be idempotent. If this RPC failed, or the CO does
  /// not know if it failed or not, it can choose to call
  /// `NodeUnpublishVolume` again.
  async fn node_unpublish_volume(
    &self,
    request: NodeUnpublishVolumeRequest,
  ) -> Result<(), NodeUnpublishVolumeError>;

  /// This RPC is called by the CO to get the volume usage and condition of
  /// a volume published on this node.
  async fn node_get_volume_stats(
    &self,
    request: NodeGetVolumeStatsRequest,
  ) -> Result<NodeGetVolumeStatsResponse, NodeGetVolumeStatsError>;
}

/// Exposes a [`NodeService`] as the CSI `Node` gRPC service.
pub struct Node<T: NodeService>(Arc<T>);

impl<T: NodeService> Node<T> {
  pub fn new(service: Arc<T>) -> Self {
    Node(service)
  }
}

#[async_trait]
impl<T: NodeService> proto::node_server::Node for Node<T> {
  #[instrument(name = "node.node_publish_volume", skip_all, fields(request))]
  async fn node_publish_volume(
    &self,
    request: tonic::Request<proto::NodePublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodePublishVolumeResponse>, tonic::Status> {
    dispatch(request, |r| self.0.node_publish_volume(r)).await?;
    Ok(tonic::Response::new(proto::NodePublishVolumeResponse {}))
  }

  #[instrument(name = "node.node_unpublish_volume", skip_all, fields(request))]
  async fn node_unpublish_volume(
    &self,
    request: tonic::Request<proto::NodeUnpublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodeUnpublishVolumeResponse>, tonic::Status> {
    dispatch(request, |r| self.0.node_unpublish_volume(r)).await?;
    Ok(tonic::Response::new(proto::NodeUnpublishVolumeResponse {}))
  }

  #[instrument(name = "node.node_get_volume_stats", skip_all, fields(request, response))]
  async fn node_get_volume_stats(
    &self,
    request: tonic::Request<proto::NodeGetVolumeStatsRequest>,
  ) -> Result<tonic::Response<proto::NodeGetVolumeStatsResponse>, tonic::Status> {
    let stats = dispatch(request, |r| self.0.node_get_volume_stats(r)).await?;
    Ok(tonic::Response::new(stats.into()))
  }

  #[instrument(name = "node.node_get_capabilities", skip_all, fields(response))]
  async fn node_get_capabilities(
    &self,
    _request: tonic::Request<proto::NodeGetCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::NodeGetCapabilitiesResponse>, tonic::Status> {
    let capabilities = self.0.capabilities().record_response();
    Ok(tonic::Response::new(capabilities.into()))
  }

  #[instrument(name = "node.node_get_info", skip_all, fields(response))]
  async fn node_get_info(
    &self,
    _request: tonic::Request<proto::NodeGetInfoRequest>,
  ) -> Result<tonic::Response<proto::NodeGetInfoResponse>, tonic::Status> {
    let info = self.0.node_info().record_response();
    Ok(tonic::Response::new(info.into()))
  }

  async fn node_stage_volume(
    &self,
    _request: tonic::Request<proto::NodeStageVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodeStageVolumeResponse>, tonic::Status> {
    unsupported!("NodeStageVolume")
  }

  async fn node_unstage_volume(
    &self,
    _request: tonic::Request<proto::NodeUnstageVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodeUnstageVolumeResponse>, tonic::Status> {
    unsupported!("NodeUnstageVolume")
  }

  async fn node_expand_volume(
    &self,
    _request: tonic::Request<proto::NodeExpandVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodeExpandVolumeResponse>, tonic::Status> {
    unsupported!("NodeExpandVolume")
  }
}
