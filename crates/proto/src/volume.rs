use std::{
  collections::HashMap,
  convert::{TryFrom, TryInto},
  fmt,
};

use crate::{proto, utils::wire_i64};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
  capacity_bytes: u64,
  volume_id: String,
  volume_context: HashMap<String, String>,
}

impl Volume {
  pub fn new(volume_id: impl Into<String>, capacity_bytes: u64) -> Self {
    Volume {
      capacity_bytes,
      volume_id: volume_id.into(),
      volume_context: HashMap::new(),
    }
  }

  pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.volume_context.insert(key.into(), value.into());
    self
  }

  /// The capacity of the volume in bytes. Zero means the capacity is
  /// unknown.
  #[inline]
  pub fn capacity_bytes(&self) -> u64 {
    self.capacity_bytes
  }

  /// The identifier for this volume, generated by the backend.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// Opaque static properties of the volume, passed back by the CO on
  /// subsequent calls.
  #[inline]
  pub fn volume_context(&self) -> &HashMap<String, String> {
    &self.volume_context
  }
}

impl From<Volume> for proto::Volume {
  fn from(value: Volume) -> Self {
    proto::Volume {
      capacity_bytes: wire_i64(value.capacity_bytes),
      volume_id: value.volume_id,
      volume_context: value.volume_context,
      content_source: None,
      accessible_topology: Vec::new(),
    }
  }
}

impl TryFrom<Volume> for proto::CreateVolumeResponse {
  type Error = tonic::Status;

  fn try_from(value: Volume) -> Result<Self, Self::Error> {
    if value.volume_id.is_empty() {
      return Err(tonic::Status::internal("volume has no id"));
    }

    Ok(proto::CreateVolumeResponse {
      volume: Some(value.into()),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeCapability {
  access_mode: AccessMode,
  access_type: AccessType,
}

impl VolumeCapability {
  pub fn new(access_mode: AccessMode, access_type: AccessType) -> Self {
    VolumeCapability {
      access_mode,
      access_type,
    }
  }

  /// The volume is mounted as a filesystem with no mount options.
  pub fn mount(access_mode: AccessMode) -> Self {
    Self::new(access_mode, AccessType::Mount(MountVolume::default()))
  }

  #[inline]
  pub fn access_mode(&self) -> AccessMode {
    self.access_mode
  }

  #[inline]
  pub fn access_type(&self) -> &AccessType {
    &self.access_type
  }

  /// The mount details, when the volume is accessed through the filesystem API.
  #[inline]
  pub fn mount_volume(&self) -> Option<&MountVolume> {
    match &self.access_type {
      AccessType::Mount(v) => Some(v),
      AccessType::Block => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AccessMode {
  Unknown,
  /// Can only be published once as read/write on a single node, at
  /// any given time.
  SingleNodeWriter,
  /// Can only be published once as readonly on a single node, at
  /// any given time.
  SingleNodeReaderOnly,
  /// Can be published as readonly at multiple nodes simultaneously.
  MultiNodeReaderOnly,
  /// Can be published at multiple nodes simultaneously. Only one of
  /// the node can be used as read/write. The rest will be readonly.
  MultiNodeSingleWriter,
  /// Can be published as read/write at multiple nodes
  /// simultaneously.
  MultiNodeMultiWriter,
}

use proto::volume_capability::access_mode::Mode;

impl From<proto::volume_capability::AccessMode> for AccessMode {
  fn from(value: proto::volume_capability::AccessMode) -> Self {
    match Mode::from_i32(value.mode) {
      Some(Mode::SingleNodeWriter) => AccessMode::SingleNodeWriter,
      Some(Mode::SingleNodeReaderOnly) => AccessMode::SingleNodeReaderOnly,
      Some(Mode::MultiNodeReaderOnly) => AccessMode::MultiNodeReaderOnly,
      Some(Mode::MultiNodeSingleWriter) => AccessMode::MultiNodeSingleWriter,
      Some(Mode::MultiNodeMultiWriter) => AccessMode::MultiNodeMultiWriter,
      _ => AccessMode::Unknown,
    }
  }
}

impl From<AccessMode> for proto::volume_capability::AccessMode {
  fn from(value: AccessMode) -> Self {
    let mode = match value {
      AccessMode::Unknown => Mode::Unknown,
      AccessMode::SingleNodeWriter => Mode::SingleNodeWriter,
      AccessMode::SingleNodeReaderOnly => Mode::SingleNodeReaderOnly,
      AccessMode::MultiNodeReaderOnly => Mode::MultiNodeReaderOnly,
      AccessMode::MultiNodeSingleWriter => Mode::MultiNodeSingleWriter,
      AccessMode::MultiNodeMultiWriter => Mode::MultiNodeMultiWriter,
    } as i32;

    proto::volume_capability::AccessMode { mode }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessType {
  /// Indicate that the volume will be accessed via the block device API.
  Block,

  /// Indicate that the volume will be accessed via the filesystem API.
  Mount(MountVolume),
}

impl From<proto::volume_capability::AccessType> for AccessType {
  fn from(value: proto::volume_capability::AccessType) -> Self {
    match value {
      proto::volume_capability::AccessType::Block(_) => AccessType::Block,
      proto::volume_capability::AccessType::Mount(v) => AccessType::Mount(v.into()),
    }
  }
}

impl From<AccessType> for proto::volume_capability::AccessType {
  fn from(value: AccessType) -> Self {
    match value {
      AccessType::Block => {
        proto::volume_capability::AccessType::Block(proto::volume_capability::BlockVolume {})
      }
      AccessType::Mount(v) => proto::volume_capability::AccessType::Mount(v.into()),
    }
  }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct MountVolume {
  fs_type: Option<String>,
  mount_flags: Vec<String>,
}

impl MountVolume {
  pub fn new(fs_type: Option<String>, mount_flags: Vec<String>) -> Self {
    MountVolume {
      fs_type: fs_type.filter(|v| !v.is_empty()),
      mount_flags,
    }
  }

  /// The filesystem type.
  #[inline]
  pub fn fs_type(&self) -> Option<&str> {
    self.fs_type.as_deref()
  }

  /// The mount options that can be used for the volume. This field is
  /// OPTIONAL. `mount_flags` MAY contain sensitive information.
  /// Therefore, the CO and the Plugin MUST NOT leak this information
  /// to untrusted entities.
  pub fn mount_flags(&self) -> impl Iterator<Item = &str> + ExactSizeIterator {
    self.mount_flags.iter().map(|v| &**v)
  }
}

impl From<proto::volume_capability::MountVolume> for MountVolume {
  fn from(value: proto::volume_capability::MountVolume) -> Self {
    MountVolume::new(Some(value.fs_type), value.mount_flags)
  }
}

impl From<MountVolume> for proto::volume_capability::MountVolume {
  fn from(value: MountVolume) -> Self {
    proto::volume_capability::MountVolume {
      fs_type: value.fs_type.unwrap_or_default(),
      mount_flags: value.mount_flags,
    }
  }
}

impl fmt::Debug for MountVolume {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MountVolume")
      .field("fs_type", &self.fs_type)
      .field(
        "mount_flags",
        &format!("REDACTED ({} items)", self.mount_flags.len()),
      )
      .finish()
  }
}

impl TryFrom<proto::VolumeCapability> for VolumeCapability {
  type Error = tonic::Status;

  fn try_from(value: proto::VolumeCapability) -> Result<Self, Self::Error> {
    let access_mode = value
      .access_mode
      .ok_or_else(|| tonic::Status::invalid_argument("Missing access_mode for VolumeCapability"))?
      .into();

    let access_type = value
      .access_type
      .ok_or_else(|| tonic::Status::invalid_argument("Missing access_type for VolumeCapability"))?
      .into();

    Ok(VolumeCapability {
      access_mode,
      access_type,
    })
  }
}

impl From<VolumeCapability> for proto::VolumeCapability {
  fn from(value: VolumeCapability) -> Self {
    proto::VolumeCapability {
      access_mode: Some(value.access_mode.into()),
      access_type: Some(value.access_type.into()),
    }
  }
}

pub(crate) fn capabilities_from_proto(
  values: Vec<proto::VolumeCapability>,
) -> Result<Vec<VolumeCapability>, tonic::Status> {
  values.into_iter().map(TryInto::try_into).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeCondition {
  /// Normal volumes are available for use and operating optimally.
  /// An abnormal volume does not meet these criteria.
  abnormal: bool,
  /// The message describing the condition of the volume.
  message: String,
}

impl VolumeCondition {
  pub fn normal(message: impl Into<String>) -> Self {
    VolumeCondition {
      abnormal: false,
      message: message.into(),
    }
  }

  #[inline]
  pub fn message(&self) -> &str {
    &self.message
  }
}

impl From<VolumeCondition> for proto::VolumeCondition {
  fn from(value: VolumeCondition) -> Self {
    proto::VolumeCondition {
      abnormal: value.abnormal,
      message: value.message,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeStatus {
  /// A list of all `node_id` of nodes that the volume in this entry
  /// is controller published on.
  /// published_node_ids MAY include nodes not published to or
  /// reported by the SP. The CO MUST be resilient to that.
  published_node_ids: Vec<String>,

  /// Information about the current condition of the volume.
  /// This field is OPTIONAL.
  volume_condition: Option<VolumeCondition>,
}

impl VolumeStatus {
  pub fn published_on(published_node_ids: Vec<String>) -> Self {
    VolumeStatus {
      published_node_ids,
      volume_condition: None,
    }
  }

  #[inline]
  pub fn published_node_ids(&self) -> &[String] {
    &self.published_node_ids
  }
}

impl From<VolumeStatus> for proto::list_volumes_response::VolumeStatus {
  fn from(value: VolumeStatus) -> Self {
    proto::list_volumes_response::VolumeStatus {
      published_node_ids: value.published_node_ids,
      volume_condition: value.volume_condition.map(Into::into),
    }
  }
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeUsageUnit {
  Bytes,
  Inodes,
}

impl From<VolumeUsageUnit> for proto::volume_usage::Unit {
  fn from(value: VolumeUsageUnit) -> Self {
    match value {
      VolumeUsageUnit::Bytes => proto::volume_usage::Unit::Bytes,
      VolumeUsageUnit::Inodes => proto::volume_usage::Unit::Inodes,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeUsage {
  /// The available capacity in specified Unit.
  available: u64,

  /// The total capacity in specified Unit.
  total: u64,

  /// The used capacity in specified Unit.
  used: u64,

  /// Units by which values are measured.
  unit: VolumeUsageUnit,
}

impl VolumeUsage {
  pub fn new(unit: VolumeUsageUnit, available: u64, total: u64, used: u64) -> Self {
    VolumeUsage {
      available,
      total,
      used,
      unit,
    }
  }

  #[inline]
  pub fn available(&self) -> u64 {
    self.available
  }

  #[inline]
  pub fn total(&self) -> u64 {
    self.total
  }

  #[inline]
  pub fn used(&self) -> u64 {
    self.used
  }

  #[inline]
  pub fn unit(&self) -> VolumeUsageUnit {
    self.unit
  }
}

impl From<VolumeUsage> for proto::VolumeUsage {
  fn from(value: VolumeUsage) -> Self {
    proto::VolumeUsage {
      available: wire_i64(value.available),
      total: wire_i64(value.total),
      used: wire_i64(value.used),
      unit: proto::volume_usage::Unit::from(value.unit) as i32,
    }
  }
}

/// The capacity bounds of a volume. At least one bound is set; an unset
/// range on the wire becomes `None` rather than a value of this type.
/// The bounds are not checked against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityRange {
  required_bytes: Option<u64>,
  limit_bytes: Option<u64>,
}

impl CapacityRange {
  /// Volume MUST be at least this big.
  #[inline]
  pub fn required_bytes(&self) -> Option<u64> {
    self.required_bytes
  }

  /// Volume MUST not be bigger than this.
  #[inline]
  pub fn limit_bytes(&self) -> Option<u64> {
    self.limit_bytes
  }
}

impl TryFrom<proto::CapacityRange> for Option<CapacityRange> {
  type Error = tonic::Status;

  fn try_from(value: proto::CapacityRange) -> Result<Self, Self::Error> {
    #[inline]
    fn non_zero(v: i64) -> Option<u64> {
      if v == 0 {
        None
      } else {
        Some(v as u64)
      }
    }

    match (value.required_bytes, value.limit_bytes) {
      (r, _) if r < 0 => Err(tonic::Status::invalid_argument(
        "CapacityRange.required_bytes cannot be negative",
      )),
      (_, l) if l < 0 => Err(tonic::Status::invalid_argument(
        "CapacityRange.limit_bytes cannot be negative",
      )),
      (0, 0) => Ok(None),
      (r, l) => Ok(Some(CapacityRange {
        required_bytes: non_zero(r),
        limit_bytes: non_zero(l),
      })),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  #[test_case(0, 0 => None; "unset")]
  #[test_case(5, 0 => Some((Some(5), None)); "required only")]
  #[test_case(0, 10 => Some((None, Some(10))); "limit only")]
  #[test_case(5, 10 => Some((Some(5), Some(10))); "both")]
  #[test_case(10, 5 => Some((Some(10), Some(5))); "required above limit")]
  fn capacity_range(required_bytes: i64, limit_bytes: i64) -> Option<(Option<u64>, Option<u64>)> {
    let range: Option<CapacityRange> = proto::CapacityRange {
      required_bytes,
      limit_bytes,
    }
    .try_into()
    .unwrap();

    range.map(|r| (r.required_bytes(), r.limit_bytes()))
  }

  #[test_case(-1, 0; "negative required")]
  #[test_case(0, -1; "negative limit")]
  fn capacity_range_invalid(required_bytes: i64, limit_bytes: i64) {
    let result: Result<Option<CapacityRange>, _> = proto::CapacityRange {
      required_bytes,
      limit_bytes,
    }
    .try_into();

    assert_eq!(result.unwrap_err().code(), tonic::Code::InvalidArgument);
  }

  #[test]
  fn oversized_values_clamp_on_the_wire() {
    let volume: proto::Volume = Volume::new("pv-big", u64::MAX).into();
    assert_eq!(volume.capacity_bytes, i64::MAX);

    let usage: proto::VolumeUsage =
      VolumeUsage::new(VolumeUsageUnit::Bytes, u64::MAX, u64::MAX, 4096).into();
    assert_eq!(usage.available, i64::MAX);
    assert_eq!(usage.total, i64::MAX);
    assert_eq!(usage.used, 4096);
  }

  #[test]
  fn mount_volume_debug_redacts_flags() {
    let mount = MountVolume::new(Some("xfs".into()), vec!["password=hunter2".into()]);
    let rendered = format!("{:?}", mount);
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("REDACTED (1 items)"));
  }

  #[test]
  fn empty_fs_type_is_none() {
    let mount: MountVolume = proto::volume_capability::MountVolume {
      fs_type: String::new(),
      mount_flags: vec![],
    }
    .into();

    assert_eq!(mount.fs_type(), None);
  }

  #[test]
  fn capability_requires_access_mode() {
    let result: Result<VolumeCapability, _> = proto::VolumeCapability {
      access_mode: None,
      access_type: Some(proto::volume_capability::AccessType::Block(
        proto::volume_capability::BlockVolume {},
      )),
    }
    .try_into();

    assert_eq!(result.unwrap_err().code(), tonic::Code::InvalidArgument);
  }

  #[test]
  fn unknown_mode_number_is_unknown() {
    let mode: AccessMode = proto::volume_capability::AccessMode { mode: 42 }.into();
    assert_eq!(mode, AccessMode::Unknown);
  }
}
