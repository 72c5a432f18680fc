use crate::{locks::VolumeLocks, PLUGIN_NAME, PLUGIN_VERSION};
use async_trait::async_trait;
use libvirt_csi_exec::CommandRunner;
use libvirt_csi_mount_utils::{probe_disk_usage, BlockDeviceLocator, MountError, Provisioner};
use libvirt_csi_proto::{
  node::{
    AccessMode, AccessType, NodeCapabilities, NodeGetInfoResponse, NodeGetVolumeStatsError,
    NodeGetVolumeStatsRequest, NodeGetVolumeStatsResponse, NodePublishVolumeError,
    NodePublishVolumeRequest, NodeUnpublishVolumeError, NodeUnpublishVolumeRequest,
    VolumeCondition, VolumeUsage, VolumeUsageUnit,
  },
  IdentityService, NodeService,
};
use std::{num::NonZeroU64, path::PathBuf};
use tracing::info;

/// Disks a guest can take: the free slots on its SCSI controller.
pub const MAX_VOLUMES_PER_NODE: u64 = 20;

const READ_ONLY_FLAG: &str = "ro";

/// Node role. Device, filesystem and mount state are probed from the host
/// on every call.
pub struct LibvirtNode<R> {
  node_id: String,
  runner: R,
  locator: BlockDeviceLocator<R>,
  provisioner: Provisioner<R>,
  locks: VolumeLocks,
}

impl<R: CommandRunner + Clone> LibvirtNode<R> {
  pub fn new(node_id: impl Into<String>, runner: R) -> Self {
    Self::with_dev_root(node_id, runner, "/dev")
  }

  /// Looks for device nodes under `dev_root` instead of `/dev`.
  pub fn with_dev_root(node_id: impl Into<String>, runner: R, dev_root: impl Into<PathBuf>) -> Self {
    LibvirtNode {
      node_id: node_id.into(),
      locator: BlockDeviceLocator::new(runner.clone()),
      provisioner: Provisioner::with_dev_root(runner.clone(), dev_root),
      runner,
      locks: VolumeLocks::new(),
    }
  }
}

impl<R: CommandRunner> IdentityService for LibvirtNode<R> {
  #[inline]
  fn name(&self) -> &str {
    PLUGIN_NAME
  }

  #[inline]
  fn version(&self) -> &str {
    PLUGIN_VERSION
  }
}

#[async_trait]
impl<R: CommandRunner> NodeService for LibvirtNode<R> {
  fn capabilities(&self) -> NodeCapabilities {
    NodeCapabilities::GET_VOLUME_STATS
  }

  fn node_info(&self) -> NodeGetInfoResponse {
    NodeGetInfoResponse::new(self.node_id.clone(), NonZeroU64::new(MAX_VOLUMES_PER_NODE))
  }

  async fn node_publish_volume(
    &self,
    request: NodePublishVolumeRequest,
  ) -> Result<(), NodePublishVolumeError> {
    let capability = request.volume_capability();
    if capability.access_mode() != AccessMode::SingleNodeWriter {
      return Err(NodePublishVolumeError::UnsupportedCapability(format!(
        "access mode {:?} is not supported, only SingleNodeWriter",
        capability.access_mode()
      )));
    }

    let mount = match capability.access_type() {
      AccessType::Mount(mount) => mount,
      AccessType::Block => {
        return Err(NodePublishVolumeError::UnsupportedCapability(
          "raw block access is not supported".into(),
        ))
      }
    };

    let mut flags = mount.mount_flags().map(str::to_owned).collect::<Vec<_>>();
    if request.readonly() && !flags.iter().any(|f| f == READ_ONLY_FLAG) {
      flags.push(READ_ONLY_FLAG.to_owned());
    }

    let volume_id = request.volume_id();
    let _guard = self.locks.lock(volume_id).await;

    let device = self.locator.locate(volume_id).await.map_err(|e| match e {
      MountError::DeviceNotFound { .. } | MountError::InvalidVolumeId(_) => {
        NodePublishVolumeError::DeviceNotFound(volume_id.to_owned())
      }
      e => NodePublishVolumeError::Failed(e.message()),
    })?;

    let state = self
      .provisioner
      .publish(&device.name, request.target_path(), mount.fs_type(), &flags)
      .await
      .map_err(|e| match e {
        MountError::NotFound(message) => NodePublishVolumeError::VolumeNotFound(message),
        e => NodePublishVolumeError::Failed(e.message()),
      })?;

    info!(
      %volume_id,
      device = %device.name,
      target = %request.target_path().display(),
      found = ?state,
      "volume published"
    );
    Ok(())
  }

  async fn node_unpublish_volume(
    &self,
    request: NodeUnpublishVolumeRequest,
  ) -> Result<(), NodeUnpublishVolumeError> {
    let _guard = self.locks.lock(request.volume_id()).await;

    self
      .provisioner
      .unpublish(request.target_path())
      .await
      .map_err(|e| NodeUnpublishVolumeError::Failed(e.message()))?;

    info!(
      volume_id = %request.volume_id(),
      target = %request.target_path().display(),
      "volume unpublished"
    );
    Ok(())
  }

  async fn node_get_volume_stats(
    &self,
    request: NodeGetVolumeStatsRequest,
  ) -> Result<NodeGetVolumeStatsResponse, NodeGetVolumeStatsError> {
    let usage = probe_disk_usage(&self.runner, request.volume_path())
      .await
      .map_err(|e| match e {
        MountError::NotFound(message) => NodeGetVolumeStatsError::VolumeNotFound(message),
        e => NodeGetVolumeStatsError::Failed(e.message()),
      })?;

    Ok(NodeGetVolumeStatsResponse::new(
      vec![
        VolumeUsage::new(
          VolumeUsageUnit::Inodes,
          usage.inodes_available,
          usage.inodes_total,
          usage.inodes_used,
        ),
        VolumeUsage::new(
          VolumeUsageUnit::Bytes,
          usage.bytes_available,
          usage.bytes_total,
          usage.bytes_used,
        ),
      ],
      Some(VolumeCondition::normal("")),
    ))
  }
}
