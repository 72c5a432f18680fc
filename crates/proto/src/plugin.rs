use crate::{proto, utils::Record, IdentityService};
use async_trait::async_trait;
use bitflags::bitflags;
use std::sync::Arc;
use tracing::instrument;

bitflags! {
  pub struct PluginCapabilities: u32 {
    /// The plugin provides RPCs for the ControllerService.
    const CONTROLLER_SERVICE = 0b_0001;
  }
}

impl From<PluginCapabilities> for proto::GetPluginCapabilitiesResponse {
  fn from(value: PluginCapabilities) -> Self {
    use proto::plugin_capability::service::Type;

    let mut response = proto::GetPluginCapabilitiesResponse::default();
    if value.contains(PluginCapabilities::CONTROLLER_SERVICE) {
      response.capabilities.push(proto::PluginCapability {
        r#type: Some(proto::plugin_capability::Type::Service(
          proto::plugin_capability::Service {
            r#type: Type::ControllerService as i32,
          },
        )),
      });
    }

    response
  }
}

/// Exposes an [`IdentityService`] as the CSI `Identity` gRPC service.
pub struct Identity<T: IdentityService>(Arc<T>);

impl<T: IdentityService> Identity<T> {
  pub fn new(service: Arc<T>) -> Self {
    Identity(service)
  }
}

#[async_trait]
impl<T: IdentityService> proto::identity_server::Identity for Identity<T> {
  #[instrument(
    name = "identity.get_plugin_info",
    skip(self, _request),
    fields(name, vendor_version, manifest)
  )]
  async fn get_plugin_info(
    &self,
    _request: tonic::Request<proto::GetPluginInfoRequest>,
  ) -> Result<tonic::Response<proto::GetPluginInfoResponse>, tonic::Status> {
    let response = proto::GetPluginInfoResponse {
      name: self.0.name().record_field("name").into(),
      vendor_version: self.0.version().record_field("vendor_version").into(),
      manifest: self.0.manifest().record_field("manifest").clone(),
    };

    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "identity.get_plugin_capabilities",
    skip(self, _request),
    fields(response)
  )]
  async fn get_plugin_capabilities(
    &self,
    _request: tonic::Request<proto::GetPluginCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::GetPluginCapabilitiesResponse>, tonic::Status> {
    let response = self.0.plugin_capabilities().record_response().into();
    Ok(tonic::Response::new(response))
  }

  #[instrument(name = "identity.probe", skip(self, _request), fields(ready))]
  async fn probe(
    &self,
    _request: tonic::Request<proto::ProbeRequest>,
  ) -> Result<tonic::Response<proto::ProbeResponse>, tonic::Status> {
    let response = proto::ProbeResponse {
      ready: Some(self.0.ready().record_field("ready")),
    };

    Ok(tonic::Response::new(response))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proto::identity_server::Identity as _;

  struct Plugin;

  impl IdentityService for Plugin {
    fn name(&self) -> &str {
      "example.csi.test"
    }

    fn version(&self) -> &str {
      "0.1.0"
    }
  }

  #[tokio::test]
  async fn plugin_info() {
    let identity = Identity::new(Arc::new(Plugin));
    let info = identity
      .get_plugin_info(tonic::Request::new(proto::GetPluginInfoRequest {}))
      .await
      .unwrap()
      .into_inner();

    assert_eq!(info.name, "example.csi.test");
    assert_eq!(info.vendor_version, "0.1.0");
    assert!(info.manifest.is_empty());
  }

  #[tokio::test]
  async fn probe_is_ready() {
    let identity = Identity::new(Arc::new(Plugin));
    let probe = identity
      .probe(tonic::Request::new(proto::ProbeRequest {}))
      .await
      .unwrap()
      .into_inner();

    assert_eq!(probe.ready, Some(true));
  }

  #[tokio::test]
  async fn default_capabilities_are_controller_service() {
    let identity = Identity::new(Arc::new(Plugin));
    let caps = identity
      .get_plugin_capabilities(tonic::Request::new(
        proto::GetPluginCapabilitiesRequest {},
      ))
      .await
      .unwrap()
      .into_inner();

    assert_eq!(caps.capabilities.len(), 1);
    assert_eq!(
      caps.capabilities[0].r#type,
      Some(proto::plugin_capability::Type::Service(
        proto::plugin_capability::Service {
          r#type: proto::plugin_capability::service::Type::ControllerService as i32,
        }
      ))
    );
  }
}
