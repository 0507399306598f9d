// ABOUTME: Peer topology and call routing for the collector mesh.
// ABOUTME: Provides the connection manager, the dispatcher, handler registration, and peer channels.

pub mod channel;
pub mod connection;
pub mod deadline;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod status;

// Channel creation
pub use channel::{create_channel, ChannelConfig, Heartbeat};

// Topology
pub use connection::{shared_namespaces, CollectorIdentity, Connection, ConnectionManager};

// Routing
pub use dispatcher::{Call, Dispatcher, Routed};

// Error types
pub use error::DispatchError;
pub use status::{CallError, CallResult, StatusCode};

// Handlers
pub use handler::{handler_fn, CallbackHandler, HandlerContext, MethodKey, ServiceHandler};

// Re-export proto types for convenience
pub use mesh_proto;
