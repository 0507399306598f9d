// ABOUTME: MethodValidator trait shared by the dispatcher and the validation interceptor.
// ABOUTME: Implemented in-process by RegistryServer and remotely over a RegistryService client.

use crate::server::RegistryServer;
use async_trait::async_trait;
use mesh_proto::client::RegistryServiceClient;
use mesh_proto::{ValidateMethodRequest, ValidateMethodResponse};
use tonic::transport::Channel;
use tonic::Status;

/// Answers whether a `(namespace, service, method)` triple is in the catalog.
///
/// An unknown method is `Ok` with `is_valid == false`; `Err` is reserved for
/// failing to reach or read the catalog.
#[async_trait]
pub trait MethodValidator: Send + Sync {
    async fn validate_method(
        &self,
        namespace: &str,
        service_name: &str,
        method_name: &str,
    ) -> Result<ValidateMethodResponse, Status>;
}

#[async_trait]
impl MethodValidator for RegistryServer {
    async fn validate_method(
        &self,
        namespace: &str,
        service_name: &str,
        method_name: &str,
    ) -> Result<ValidateMethodResponse, Status> {
        RegistryServer::validate_method(self, namespace, service_name, method_name)
            .await
            .map_err(Status::from)
    }
}

/// Validator backed by a registry hosted on another collector.
#[derive(Clone)]
pub struct RemoteValidator {
    client: RegistryServiceClient<Channel>,
}

impl RemoteValidator {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: RegistryServiceClient::new(channel),
        }
    }
}

#[async_trait]
impl MethodValidator for RemoteValidator {
    async fn validate_method(
        &self,
        namespace: &str,
        service_name: &str,
        method_name: &str,
    ) -> Result<ValidateMethodResponse, Status> {
        let response = self
            .client
            .clone()
            .validate_method(ValidateMethodRequest {
                namespace: namespace.to_string(),
                service_name: service_name.to_string(),
                method_name: method_name.to_string(),
            })
            .await?;
        Ok(response.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_proto::{MethodDescriptorProto, ServiceDescriptorProto};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_registry_server_as_validator() {
        let registry = Arc::new(RegistryServer::in_memory());
        registry
            .register_service(
                "alpha",
                Some(ServiceDescriptorProto {
                    name: Some("Greeter".to_string()),
                    method: vec![MethodDescriptorProto {
                        name: Some("SayHello".to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        let validator: Arc<dyn MethodValidator> = registry;
        let ok = validator
            .validate_method("alpha", "Greeter", "SayHello")
            .await
            .unwrap();
        assert!(ok.is_valid);

        let miss = validator
            .validate_method("alpha", "Greeter", "SayBye")
            .await
            .unwrap();
        assert!(!miss.is_valid);
    }
}
