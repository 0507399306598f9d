// ABOUTME: Re-exports generated protobuf types for the collector mesh protocol.
// ABOUTME: Single source of truth for dispatch/registry gRPC services and message types.

#![allow(clippy::derive_partial_eq_without_eq)]

/// Generated protobuf types for the mesh protocol.
pub mod mesh {
    tonic::include_proto!("mesh");
}

// Re-export commonly used types at crate root for convenience
pub use mesh::*;

// Descriptor types carried by the registry
pub use prost_types::{
    DescriptorProto, FileDescriptorProto, MethodDescriptorProto, ServiceDescriptorProto,
};

// Re-export client types under a client module
pub mod client {
    pub use super::mesh::dispatch_service_client::DispatchServiceClient;
    pub use super::mesh::registry_service_client::RegistryServiceClient;
}

// Re-export server types under a server module
pub mod server {
    pub use super::mesh::dispatch_service_server::{DispatchService, DispatchServiceServer};
    pub use super::mesh::registry_service_server::{RegistryService, RegistryServiceServer};
}
