use bitflags::bitflags;

use crate::proto;

#[rustfmt::skip]
bitflags! {
  pub struct NodeCapabilities: u32 {
    const GET_VOLUME_STATS = 0b_0001;
  }
}

use proto::node_service_capability::rpc::Type;
impl From<NodeCapabilities> for proto::NodeGetCapabilitiesResponse {
  fn from(value: NodeCapabilities) -> Self {
    let mut capabilities = Vec::with_capacity(1);
    if value.contains(NodeCapabilities::GET_VOLUME_STATS) {
      capabilities.push(proto::NodeServiceCapability {
        r#type: Some(proto::node_service_capability::Type::Rpc(
          proto::node_service_capability::Rpc {
            r#type: Type::GetVolumeStats as i32,
          },
        )),
      });
    }

    proto::NodeGetCapabilitiesResponse { capabilities }
  }
}
