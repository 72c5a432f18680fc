use crate::{
  backend::{Backend, BackendError},
  locks::VolumeLocks,
  PLUGIN_NAME, PLUGIN_VERSION,
};
use async_trait::async_trait;
use libvirt_csi_exec::CommandRunner;
use libvirt_csi_proto::{
  controller::{
    AccessMode, CapacityRange, Confirmed, ControllerCapabilities, ControllerPublishVolumeError,
    ControllerPublishVolumeRequest, ControllerPublishVolumeResponse,
    ControllerUnpublishVolumeError, ControllerUnpublishVolumeRequest, CreateVolumeError,
    CreateVolumeRequest, DeleteVolumeError, DeleteVolumeRequest, ListVolumesError,
    ListVolumesRequest, ListVolumesResponse, ValidateVolumeCapabilitiesError,
    ValidateVolumeCapabilitiesRequest, ValidateVolumeCapabilitiesResponse, Volume,
    VolumeCapability, VolumeListEntry, VolumeStatus,
  },
  ControllerService, IdentityService,
};
use tracing::{info, warn};

/// Capacity of a volume whose request names no size.
pub const DEFAULT_CAPACITY_BYTES: u64 = 20 * 1024 * 1024 * 1024;

/// `CreateVolume` parameter naming the volume group to carve the volume
/// from. It is handed back in the volume context.
pub const VOLUME_GROUP_PARAMETER: &str = "volumeGroup";

const VOLUME_NOT_FOUND_PREFIX: &str = "Failed to find logical volume";

/// Size to create: the required bytes when given, otherwise the limit,
/// otherwise [`DEFAULT_CAPACITY_BYTES`].
pub fn resolve_capacity(range: Option<CapacityRange>) -> u64 {
  range
    .and_then(|range| range.required_bytes().or_else(|| range.limit_bytes()))
    .unwrap_or(DEFAULT_CAPACITY_BYTES)
}

/// Controller role. Volume inventory and placement live on the
/// hypervisor; nothing is kept here between calls.
pub struct LibvirtController<R> {
  backend: Backend<R>,
  locks: VolumeLocks,
}

impl<R: CommandRunner> LibvirtController<R> {
  pub fn new(backend: Backend<R>) -> Self {
    LibvirtController {
      backend,
      locks: VolumeLocks::new(),
    }
  }
}

impl<R: CommandRunner> IdentityService for LibvirtController<R> {
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
impl<R: CommandRunner> ControllerService for LibvirtController<R> {
  fn capabilities(&self) -> ControllerCapabilities {
    ControllerCapabilities::LIST_VOLUMES
      | ControllerCapabilities::LIST_VOLUMES_PUBLISHED_NODES
      | ControllerCapabilities::CREATE_DELETE_VOLUME
      | ControllerCapabilities::PUBLISH_UNPUBLISH_VOLUME
  }

  async fn create_volume(&self, request: CreateVolumeRequest) -> Result<Volume, CreateVolumeError> {
    if let Some(capability) = request
      .volume_capabilities()
      .iter()
      .find(|c| c.access_mode() != AccessMode::SingleNodeWriter)
    {
      return Err(CreateVolumeError::UnsupportedCapability(format!(
        "access mode {:?} is not supported, only SingleNodeWriter",
        capability.access_mode()
      )));
    }

    let capacity = resolve_capacity(request.capacity_range());
    let volume_group = request
      .parameters()
      .get(VOLUME_GROUP_PARAMETER)
      .map(String::as_str)
      .filter(|vg| !vg.is_empty());

    let _guard = self.locks.lock(request.name()).await;
    let volume_id = self
      .backend
      .create(volume_group, capacity)
      .await
      .map_err(|e| CreateVolumeError::CreationFailed(e.message()))?;

    info!(name = %request.name(), %volume_id, capacity, "volume created");
    Ok(
      Volume::new(volume_id, capacity)
        .with_context(VOLUME_GROUP_PARAMETER, volume_group.unwrap_or_default()),
    )
  }

  async fn delete_volume(&self, request: DeleteVolumeRequest) -> Result<(), DeleteVolumeError> {
    let _guard = self.locks.lock(request.volume_id()).await;

    match self.backend.delete(request.volume_id()).await {
      Ok(()) => {
        info!(volume_id = %request.volume_id(), "volume deleted");
        Ok(())
      }
      Err(e) => Err(classify_delete(e)),
    }
  }

  async fn controller_publish_volume(
    &self,
    request: ControllerPublishVolumeRequest,
  ) -> Result<ControllerPublishVolumeResponse, ControllerPublishVolumeError> {
    let _guard = self.locks.lock(request.volume_id()).await;

    self
      .backend
      .attach(request.volume_id(), request.node_id())
      .await
      .map_err(|e| ControllerPublishVolumeError::Backend(e.message()))?;

    info!(volume_id = %request.volume_id(), node_id = %request.node_id(), "volume attached");
    Ok(ControllerPublishVolumeResponse::default())
  }

  async fn controller_unpublish_volume(
    &self,
    request: ControllerUnpublishVolumeRequest,
  ) -> Result<(), ControllerUnpublishVolumeError> {
    let _guard = self.locks.lock(request.volume_id()).await;

    self
      .backend
      .detach(request.volume_id(), request.node_id())
      .await
      .map_err(|e| ControllerUnpublishVolumeError::Backend(e.message()))?;

    info!(volume_id = %request.volume_id(), node_id = ?request.node_id(), "volume detached");
    Ok(())
  }

  async fn validate_volume_capabilities(
    &self,
    request: ValidateVolumeCapabilitiesRequest,
  ) -> Result<ValidateVolumeCapabilitiesResponse, ValidateVolumeCapabilitiesError> {
    let confirmed = request
      .volume_capabilities()
      .iter()
      .map(VolumeCapability::access_mode)
      .filter(|mode| *mode == AccessMode::SingleNodeWriter)
      .map(VolumeCapability::mount)
      .collect::<Vec<_>>();

    Ok(ValidateVolumeCapabilitiesResponse::Confirmed(
      Confirmed::new(request.volume_context().clone(), confirmed),
    ))
  }

  async fn list_volumes(
    &self,
    request: ListVolumesRequest,
  ) -> Result<ListVolumesResponse, ListVolumesError> {
    if let Some(token) = request.starting_token() {
      return Err(ListVolumesError::InvalidStartingToken(format!(
        "{:?}, volume listing is not paginated",
        token
      )));
    }

    let volumes = self.backend.list().await.map_err(|e| match e {
      BackendError::MalformedOutput { detail, .. } => ListVolumesError::MalformedOutput(detail),
      e => ListVolumesError::Backend(e.message()),
    })?;

    let entries = volumes
      .into_iter()
      .map(|info| {
        let status = VolumeStatus::published_on(info.owners().to_vec());
        VolumeListEntry::new(Volume::new(info.id, info.capacity), status)
      })
      .collect();

    Ok(ListVolumesResponse::new(entries))
  }
}

fn classify_delete(e: BackendError) -> DeleteVolumeError {
  match e.stderr().map(str::trim) {
    Some(stderr) if stderr.starts_with(VOLUME_NOT_FOUND_PREFIX) => {
      warn!(%stderr, "volume does not exist on the backend");
      DeleteVolumeError::VolumeNotFound(stderr.to_owned())
    }
    _ => DeleteVolumeError::Backend(e.message()),
  }
}
