// ABOUTME: Error types for the registry crate.
// ABOUTME: Maps catalog failures onto the gRPC status codes callers assert on.

use mesh_store::StoreError;
use thiserror::Error;
use tonic::Status;

/// Errors raised by registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Missing namespace, descriptor, or descriptor name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An entry with the same id is already registered.
    #[error("already registered: {0}")]
    AlreadyExists(String),

    /// No entry with this id.
    #[error("not registered: {0}")]
    NotFound(String),

    /// Backend failure.
    #[error("store error: {0}")]
    Store(StoreError),

    /// A stored record could not be decoded.
    #[error("corrupt registry record: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => RegistryError::NotFound(id),
            StoreError::AlreadyExists(id) => RegistryError::AlreadyExists(id),
            other => RegistryError::Store(other),
        }
    }
}

impl From<RegistryError> for Status {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::InvalidArgument(msg) => Status::invalid_argument(msg),
            RegistryError::AlreadyExists(id) => {
                Status::already_exists(format!("already registered: {}", id))
            }
            RegistryError::NotFound(id) => Status::not_found(format!("not registered: {}", id)),
            other => Status::internal(other.to_string()),
        }
    }
}
