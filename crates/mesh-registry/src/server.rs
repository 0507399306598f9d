// ABOUTME: RegistryService gRPC implementation backed by a record store
// ABOUTME: Registers, looks up, lists, and validates services and protos per namespace

use crate::error::RegistryError;
use chrono::Utc;
use mesh_proto::server::RegistryService;
use mesh_proto::{
    FileDescriptorProto, ListProtosRequest, ListProtosResponse, ListServicesRequest,
    ListServicesResponse, LookupProtoRequest, LookupServiceRequest, RegisterProtoRequest,
    RegisterServiceRequest, RegisteredProto, RegisteredService, ServiceDescriptorProto,
    ValidateMethodRequest, ValidateMethodResponse,
};
use mesh_store::{MemoryStore, RecordStore};
use prost::Message;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

type Result<T> = std::result::Result<T, RegistryError>;

/// Catalog id of a registry entry.
pub fn entry_id(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// Authoritative catalog of which services, methods, and message types exist per namespace.
///
/// Entries are immutable: registering an id twice fails with
/// [`RegistryError::AlreadyExists`] rather than updating in place.
pub struct RegistryServer {
    services: Arc<dyn RecordStore>,
    protos: Arc<dyn RecordStore>,
}

impl RegistryServer {
    pub fn new(services: Arc<dyn RecordStore>, protos: Arc<dyn RecordStore>) -> Self {
        Self { services, protos }
    }

    /// Registry with volatile storage.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    pub async fn register_service(
        &self,
        namespace: &str,
        descriptor: Option<ServiceDescriptorProto>,
    ) -> Result<RegisteredService> {
        if namespace.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "namespace is required".to_string(),
            ));
        }
        let descriptor = descriptor.ok_or_else(|| {
            RegistryError::InvalidArgument("service descriptor is required".to_string())
        })?;
        let service_name = descriptor.name().to_string();
        if service_name.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "service descriptor name is required".to_string(),
            ));
        }

        let entry = RegisteredService {
            id: entry_id(namespace, &service_name),
            namespace: namespace.to_string(),
            service_name,
            method_names: descriptor
                .method
                .iter()
                .map(|m| m.name().to_string())
                .collect(),
            descriptor: Some(descriptor),
            registered_at: Utc::now().to_rfc3339(),
        };

        self.services
            .create_record(&entry.id, entry.encode_to_vec())
            .await?;

        info!(
            id = %entry.id,
            methods = entry.method_names.len(),
            "Service registered"
        );
        Ok(entry)
    }

    pub async fn register_proto(
        &self,
        namespace: &str,
        descriptor: Option<FileDescriptorProto>,
    ) -> Result<RegisteredProto> {
        if namespace.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "namespace is required".to_string(),
            ));
        }
        let descriptor = descriptor.ok_or_else(|| {
            RegistryError::InvalidArgument("file descriptor is required".to_string())
        })?;
        let file_name = descriptor.name().to_string();
        if file_name.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "file descriptor name is required".to_string(),
            ));
        }

        // Nested types stay inside the stored descriptor; only top-level names are listed.
        let entry = RegisteredProto {
            id: entry_id(namespace, &file_name),
            namespace: namespace.to_string(),
            file_name,
            message_names: descriptor
                .message_type
                .iter()
                .map(|m| m.name().to_string())
                .collect(),
            dependencies: descriptor.dependency.clone(),
            descriptor: Some(descriptor),
            registered_at: Utc::now().to_rfc3339(),
        };

        self.protos
            .create_record(&entry.id, entry.encode_to_vec())
            .await?;

        info!(
            id = %entry.id,
            messages = entry.message_names.len(),
            "Proto registered"
        );
        Ok(entry)
    }

    pub async fn lookup_service(
        &self,
        namespace: &str,
        service_name: &str,
    ) -> Result<RegisteredService> {
        let record = self
            .services
            .get_record(&entry_id(namespace, service_name))
            .await?;
        Ok(RegisteredService::decode(record.data.as_slice())?)
    }

    pub async fn lookup_proto(&self, namespace: &str, file_name: &str) -> Result<RegisteredProto> {
        let record = self
            .protos
            .get_record(&entry_id(namespace, file_name))
            .await?;
        Ok(RegisteredProto::decode(record.data.as_slice())?)
    }

    /// All services, optionally restricted to one namespace.
    pub async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<RegisteredService>> {
        let mut services = Vec::new();
        for record in self.services.list_records().await? {
            let entry = RegisteredService::decode(record.data.as_slice())?;
            if namespace.map_or(true, |ns| entry.namespace == ns) {
                services.push(entry);
            }
        }
        Ok(services)
    }

    /// All protos, optionally restricted to one namespace.
    pub async fn list_protos(&self, namespace: Option<&str>) -> Result<Vec<RegisteredProto>> {
        let mut protos = Vec::new();
        for record in self.protos.list_records().await? {
            let entry = RegisteredProto::decode(record.data.as_slice())?;
            if namespace.map_or(true, |ns| entry.namespace == ns) {
                protos.push(entry);
            }
        }
        Ok(protos)
    }

    /// Whether `service_name.method_name` is registered in `namespace`.
    ///
    /// Absence is a negative answer, not an error; only store failures error.
    pub async fn validate_method(
        &self,
        namespace: &str,
        service_name: &str,
        method_name: &str,
    ) -> Result<ValidateMethodResponse> {
        let service = match self.lookup_service(namespace, service_name).await {
            Ok(service) => service,
            Err(RegistryError::NotFound(_)) => {
                debug!(namespace = %namespace, service = %service_name, "Validation miss: service");
                return Ok(ValidateMethodResponse {
                    is_valid: false,
                    message: format!(
                        "service '{}' not registered in namespace '{}'",
                        service_name, namespace
                    ),
                });
            }
            Err(e) => return Err(e),
        };

        if service.method_names.iter().any(|m| m == method_name) {
            return Ok(ValidateMethodResponse {
                is_valid: true,
                message: String::new(),
            });
        }

        debug!(
            namespace = %namespace,
            service = %service_name,
            method = %method_name,
            "Validation miss: method"
        );
        Ok(ValidateMethodResponse {
            is_valid: false,
            message: format!(
                "method '{}' not found on service '{}' in namespace '{}'",
                method_name, service_name, namespace
            ),
        })
    }
}

fn namespace_filter(namespace: &str) -> Option<&str> {
    if namespace.is_empty() {
        None
    } else {
        Some(namespace)
    }
}

#[tonic::async_trait]
impl RegistryService for RegistryServer {
    async fn register_service(
        &self,
        request: Request<RegisterServiceRequest>,
    ) -> std::result::Result<Response<RegisteredService>, Status> {
        let req = request.into_inner();
        let entry = RegistryServer::register_service(self, &req.namespace, req.descriptor).await?;
        Ok(Response::new(entry))
    }

    async fn register_proto(
        &self,
        request: Request<RegisterProtoRequest>,
    ) -> std::result::Result<Response<RegisteredProto>, Status> {
        let req = request.into_inner();
        let entry = RegistryServer::register_proto(self, &req.namespace, req.descriptor).await?;
        Ok(Response::new(entry))
    }

    async fn lookup_service(
        &self,
        request: Request<LookupServiceRequest>,
    ) -> std::result::Result<Response<RegisteredService>, Status> {
        let req = request.into_inner();
        let entry = RegistryServer::lookup_service(self, &req.namespace, &req.service_name).await?;
        Ok(Response::new(entry))
    }

    async fn lookup_proto(
        &self,
        request: Request<LookupProtoRequest>,
    ) -> std::result::Result<Response<RegisteredProto>, Status> {
        let req = request.into_inner();
        let entry = RegistryServer::lookup_proto(self, &req.namespace, &req.file_name).await?;
        Ok(Response::new(entry))
    }

    async fn list_services(
        &self,
        request: Request<ListServicesRequest>,
    ) -> std::result::Result<Response<ListServicesResponse>, Status> {
        let req = request.into_inner();
        let services =
            RegistryServer::list_services(self, namespace_filter(&req.namespace)).await?;
        Ok(Response::new(ListServicesResponse { services }))
    }

    async fn list_protos(
        &self,
        request: Request<ListProtosRequest>,
    ) -> std::result::Result<Response<ListProtosResponse>, Status> {
        let req = request.into_inner();
        let protos = RegistryServer::list_protos(self, namespace_filter(&req.namespace)).await?;
        Ok(Response::new(ListProtosResponse { protos }))
    }

    async fn validate_method(
        &self,
        request: Request<ValidateMethodRequest>,
    ) -> std::result::Result<Response<ValidateMethodResponse>, Status> {
        let req = request.into_inner();
        let result = RegistryServer::validate_method(
            self,
            &req.namespace,
            &req.service_name,
            &req.method_name,
        )
        .await?;
        Ok(Response::new(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_proto::{DescriptorProto, MethodDescriptorProto};
    use mesh_store::SqliteStore;
    use tempfile::TempDir;
    use tonic::Code;

    fn greeter(methods: &[&str]) -> ServiceDescriptorProto {
        ServiceDescriptorProto {
            name: Some("Greeter".to_string()),
            method: methods
                .iter()
                .map(|m| MethodDescriptorProto {
                    name: Some(m.to_string()),
                    input_type: Some(".greet.HelloRequest".to_string()),
                    output_type: Some(".greet.HelloReply".to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn greet_file() -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some("greet.proto".to_string()),
            package: Some("greet".to_string()),
            dependency: vec!["google/protobuf/empty.proto".to_string()],
            message_type: vec![
                DescriptorProto {
                    name: Some("HelloRequest".to_string()),
                    nested_type: vec![DescriptorProto {
                        name: Some("Options".to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                DescriptorProto {
                    name: Some("HelloReply".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup_service() {
        let registry = RegistryServer::in_memory();
        let entry = registry
            .register_service("alpha", Some(greeter(&["SayHello", "SayBye"])))
            .await
            .unwrap();
        assert_eq!(entry.id, "alpha/Greeter");
        assert_eq!(entry.method_names, vec!["SayHello", "SayBye"]);

        let fetched = registry.lookup_service("alpha", "Greeter").await.unwrap();
        assert_eq!(fetched.id, "alpha/Greeter");
        assert_eq!(fetched.descriptor, Some(greeter(&["SayHello", "SayBye"])));
    }

    #[tokio::test]
    async fn test_duplicate_service_is_already_exists() {
        let registry = RegistryServer::in_memory();
        registry
            .register_service("alpha", Some(greeter(&["SayHello"])))
            .await
            .unwrap();

        let err = registry
            .register_service("alpha", Some(greeter(&["SayHello", "Other"])))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(ref id) if id == "alpha/Greeter"));
        assert_eq!(Status::from(err).code(), Code::AlreadyExists);

        // Same service in another namespace is a distinct entry
        registry
            .register_service("beta", Some(greeter(&["SayHello"])))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_service_invalid_arguments() {
        let registry = RegistryServer::in_memory();

        let err = registry
            .register_service("", Some(greeter(&["SayHello"])))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));

        let err = registry.register_service("alpha", None).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));

        let nameless = ServiceDescriptorProto::default();
        let err = registry
            .register_service("alpha", Some(nameless))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));

        let empty_name = ServiceDescriptorProto {
            name: Some(String::new()),
            ..Default::default()
        };
        let status = Status::from(
            registry
                .register_service("alpha", Some(empty_name))
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_register_proto_lists_top_level_messages() {
        let registry = RegistryServer::in_memory();
        let entry = registry
            .register_proto("alpha", Some(greet_file()))
            .await
            .unwrap();

        assert_eq!(entry.id, "alpha/greet.proto");
        assert_eq!(entry.message_names, vec!["HelloRequest", "HelloReply"]);
        assert_eq!(entry.dependencies, vec!["google/protobuf/empty.proto"]);

        // Nested type survives in the stored descriptor
        let fetched = registry.lookup_proto("alpha", "greet.proto").await.unwrap();
        let descriptor = fetched.descriptor.unwrap();
        assert_eq!(descriptor.message_type[0].nested_type[0].name(), "Options");
    }

    #[tokio::test]
    async fn test_register_proto_errors() {
        let registry = RegistryServer::in_memory();
        registry
            .register_proto("alpha", Some(greet_file()))
            .await
            .unwrap();

        let err = registry
            .register_proto("alpha", Some(greet_file()))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));

        let err = registry.register_proto("", Some(greet_file())).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));

        let err = registry
            .register_proto("alpha", Some(FileDescriptorProto::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_lookup_missing_is_not_found() {
        let registry = RegistryServer::in_memory();
        let err = registry.lookup_service("alpha", "Greeter").await.unwrap_err();
        assert_eq!(Status::from(err).code(), Code::NotFound);

        let err = registry.lookup_proto("alpha", "greet.proto").await.unwrap_err();
        assert_eq!(Status::from(err).code(), Code::NotFound);
    }

    #[tokio::test]
    async fn test_list_filters_by_namespace() {
        let registry = RegistryServer::in_memory();
        registry
            .register_service("alpha", Some(greeter(&["SayHello"])))
            .await
            .unwrap();
        registry
            .register_service("beta", Some(greeter(&["SayHello"])))
            .await
            .unwrap();
        registry
            .register_proto("beta", Some(greet_file()))
            .await
            .unwrap();

        assert_eq!(registry.list_services(None).await.unwrap().len(), 2);
        let alpha = registry.list_services(Some("alpha")).await.unwrap();
        assert_eq!(alpha.len(), 1);
        assert_eq!(alpha[0].namespace, "alpha");
        assert!(registry.list_services(Some("gamma")).await.unwrap().is_empty());

        assert_eq!(registry.list_protos(Some("beta")).await.unwrap().len(), 1);
        assert!(registry.list_protos(Some("alpha")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validate_method() {
        let registry = RegistryServer::in_memory();
        registry
            .register_service("alpha", Some(greeter(&["SayHello"])))
            .await
            .unwrap();

        let ok = registry
            .validate_method("alpha", "Greeter", "SayHello")
            .await
            .unwrap();
        assert!(ok.is_valid);

        let missing_method = registry
            .validate_method("alpha", "Greeter", "SayBye")
            .await
            .unwrap();
        assert!(!missing_method.is_valid);
        assert!(missing_method.message.contains("SayBye"));

        let missing_service = registry
            .validate_method("alpha", "Farewell", "SayBye")
            .await
            .unwrap();
        assert!(!missing_service.is_valid);
        assert!(missing_service.message.contains("Farewell"));

        // Namespaces isolate the catalog
        let other_ns = registry
            .validate_method("beta", "Greeter", "SayHello")
            .await
            .unwrap();
        assert!(!other_ns.is_valid);
    }

    #[tokio::test]
    async fn test_grpc_surface_uses_transport_errors_for_registration() {
        let registry = RegistryServer::in_memory();
        let request = || {
            Request::new(RegisterServiceRequest {
                namespace: "alpha".to_string(),
                descriptor: Some(greeter(&["SayHello"])),
            })
        };

        RegistryService::register_service(&registry, request())
            .await
            .unwrap();
        let status = RegistryService::register_service(&registry, request())
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::AlreadyExists);

        let status = RegistryService::register_service(
            &registry,
            Request::new(RegisterServiceRequest {
                namespace: "alpha".to_string(),
                descriptor: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);

        let listed = RegistryService::list_services(
            &registry,
            Request::new(ListServicesRequest {
                namespace: String::new(),
            }),
        )
        .await
        .unwrap()
        .into_inner();
        assert_eq!(listed.services.len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_backed_registry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.db");
        let services = SqliteStore::open(&path, "services").await.unwrap();
        let protos = services.collection("protos");
        let registry = RegistryServer::new(Arc::new(services), Arc::new(protos));

        registry
            .register_service("alpha", Some(greeter(&["SayHello"])))
            .await
            .unwrap();
        registry
            .register_proto("alpha", Some(greet_file()))
            .await
            .unwrap();

        let err = registry
            .register_service("alpha", Some(greeter(&["SayHello"])))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));

        let valid = registry
            .validate_method("alpha", "Greeter", "SayHello")
            .await
            .unwrap();
        assert!(valid.is_valid);
    }
}
