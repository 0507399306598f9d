// ABOUTME: Namespace-scoped registry of services and protos for the collector mesh.
// ABOUTME: Provides the registry server, the MethodValidator seam, and the validation interceptor.

pub mod error;
pub mod interceptor;
pub mod server;
pub mod validator;

pub use error::RegistryError;
pub use interceptor::{CallPath, ValidatedService, ValidationLayer};
pub use server::RegistryServer;
pub use validator::{MethodValidator, RemoteValidator};

// Re-export proto types for convenience
pub use mesh_proto;
