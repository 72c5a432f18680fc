use bitflags::bitflags;

use crate::proto;

#[rustfmt::skip]
bitflags! {
  pub struct ControllerCapabilities: u32 {
    const CREATE_DELETE_VOLUME         = 0b_0000_0001;
    const PUBLISH_UNPUBLISH_VOLUME     = 0b_0000_0010;
    const LIST_VOLUMES                 = 0b_0000_0100;

    /// Indicates the SP supports the
    /// ListVolumesResponse.entry.published_nodes field
    const LIST_VOLUMES_PUBLISHED_NODES = 0b_0000_1000;
  }
}

use proto::controller_service_capability::rpc::Type;
impl From<ControllerCapabilities> for proto::ControllerGetCapabilitiesResponse {
  fn from(value: ControllerCapabilities) -> Self {
    #[inline]
    fn push_cap(
      vec: &mut Vec<proto::ControllerServiceCapability>,
      value: ControllerCapabilities,
      test: ControllerCapabilities,
      proto: Type,
    ) {
      if value.contains(test) {
        vec.push(proto::ControllerServiceCapability {
          r#type: Some(proto::controller_service_capability::Type::Rpc(
            proto::controller_service_capability::Rpc {
              r#type: proto as i32,
            },
          )),
        })
      }
    }

    let mut capabilities = Vec::with_capacity(4);
    push_cap(
      &mut capabilities,
      value,
      ControllerCapabilities::LIST_VOLUMES,
      Type::ListVolumes,
    );
    push_cap(
      &mut capabilities,
      value,
      ControllerCapabilities::LIST_VOLUMES_PUBLISHED_NODES,
      Type::ListVolumesPublishedNodes,
    );
    push_cap(
      &mut capabilities,
      value,
      ControllerCapabilities::CREATE_DELETE_VOLUME,
      Type::CreateDeleteVolume,
    );
    push_cap(
      &mut capabilities,
      value,
      ControllerCapabilities::PUBLISH_UNPUBLISH_VOLUME,
      Type::PublishUnpublishVolume,
    );

    proto::ControllerGetCapabilitiesResponse { capabilities }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn types(response: proto::ControllerGetCapabilitiesResponse) -> Vec<i32> {
    response
      .capabilities
      .into_iter()
      .filter_map(|c| match c.r#type {
        Some(proto::controller_service_capability::Type::Rpc(rpc)) => Some(rpc.r#type),
        None => None,
      })
      .collect()
  }

  #[test]
  fn empty_set_reports_nothing() {
    assert!(types(ControllerCapabilities::empty().into()).is_empty());
  }

  #[test]
  fn full_set_in_order() {
    assert_eq!(
      types(ControllerCapabilities::all().into()),
      vec![
        Type::ListVolumes as i32,
        Type::ListVolumesPublishedNodes as i32,
        Type::CreateDeleteVolume as i32,
        Type::PublishUnpublishVolume as i32,
      ]
    );
  }
}
