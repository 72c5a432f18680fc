use crate::{proto, utils::wire_i64};
use std::num::NonZeroU64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGetInfoResponse {
  /// The identifier of the node as understood by the SP.
  /// This field SHALL be used by the CO in subsequent calls, including
  /// `ControllerPublishVolume`, to refer to this node.
  node_id: String,

  /// Maximum number of volumes that controller can publish to the node.
  /// If value is not set or zero CO SHALL decide how many volumes of
  /// this type can be published by the controller to the node.
  max_volumes_per_node: Option<NonZeroU64>,
}

impl NodeGetInfoResponse {
  pub fn new(node_id: impl Into<String>, max_volumes_per_node: Option<NonZeroU64>) -> Self {
    NodeGetInfoResponse {
      node_id: node_id.into(),
      max_volumes_per_node,
    }
  }

  #[inline]
  pub fn node_id(&self) -> &str {
    &self.node_id
  }

  #[inline]
  pub fn max_volumes_per_node(&self) -> Option<NonZeroU64> {
    self.max_volumes_per_node
  }
}

impl From<NodeGetInfoResponse> for proto::NodeGetInfoResponse {
  fn from(value: NodeGetInfoResponse) -> Self {
    proto::NodeGetInfoResponse {
      node_id: value.node_id,
      max_volumes_per_node: value
        .max_volumes_per_node
        .map(|v| wire_i64(v.get()))
        .unwrap_or_default(),
      accessible_topology: None,
    }
  }
}
