// ABOUTME: Connection manager tracking links between collectors
// ABOUTME: Records inbound/outbound connections, shared namespaces, and cached peer clients

use crate::channel::{create_channel, ChannelConfig};
use crate::error::DispatchError;
use crate::status::{check_status, CallError};
use chrono::{DateTime, Utc};
use mesh_proto::client::DispatchServiceClient;
use mesh_proto::ConnectRequest;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tonic::transport::Channel;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Who this collector is. Fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorIdentity {
    pub id: String,
    /// How peers reach this collector.
    pub address: String,
    /// Declared capability set, in declaration order without duplicates.
    pub namespaces: Vec<String>,
}

impl CollectorIdentity {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        namespaces: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut seen = HashSet::new();
        let namespaces = namespaces
            .into_iter()
            .map(Into::into)
            .filter(|ns: &String| seen.insert(ns.clone()))
            .collect();
        Self {
            id: id.into(),
            address: address.into(),
            namespaces,
        }
    }
}

/// One directional link record, held by whichever side recorded it.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: String,
    /// Best-effort; empty when the dialing side did not identify itself.
    pub source_collector_id: String,
    /// Best-effort; empty when the accepting side did not identify itself.
    pub target_collector_id: String,
    /// Address of the other endpoint.
    pub address: String,
    /// Fixed at connect time.
    pub shared_namespaces: Vec<String>,
    /// Advisory only; nothing is evicted based on it.
    pub last_activity: DateTime<Utc>,
}

impl Connection {
    /// ID of the end that is not `local_id`. Empty if the peer never identified itself.
    pub fn remote_id(&self, local_id: &str) -> &str {
        if self.source_collector_id == local_id {
            &self.target_collector_id
        } else {
            &self.source_collector_id
        }
    }

    /// Whether the far end of this link, seen from `local_id`, is `collector_id`.
    pub fn leads_to(&self, collector_id: &str, local_id: &str) -> bool {
        !collector_id.is_empty() && self.remote_id(local_id) == collector_id
    }

    pub fn shares(&self, namespace: &str) -> bool {
        self.shared_namespaces.iter().any(|ns| ns == namespace)
    }
}

impl From<&Connection> for mesh_proto::Connection {
    fn from(conn: &Connection) -> Self {
        mesh_proto::Connection {
            id: conn.id.clone(),
            source_collector_id: conn.source_collector_id.clone(),
            target_collector_id: conn.target_collector_id.clone(),
            address: conn.address.clone(),
            shared_namespaces: conn.shared_namespaces.clone(),
            last_activity: conn.last_activity.to_rfc3339(),
        }
    }
}

/// `own ∩ requester`, ordered as in `requester`.
pub fn shared_namespaces(own: &[String], requester: &[String]) -> Vec<String> {
    let own: HashSet<&str> = own.iter().map(String::as_str).collect();
    requester
        .iter()
        .filter(|ns| own.contains(ns.as_str()))
        .cloned()
        .collect()
}

/// Tracks connection records and peer clients for one collector.
///
/// The two maps are guarded independently and never locked together;
/// no lock is held across a network call.
pub struct ConnectionManager {
    identity: Arc<CollectorIdentity>,
    connect_timeout: Duration,
    /// Connection records by ID
    connections: RwLock<HashMap<String, Connection>>,
    /// Peer clients by the address they were dialed on
    clients: RwLock<HashMap<String, DispatchServiceClient<Channel>>>,
}

impl ConnectionManager {
    pub fn new(identity: Arc<CollectorIdentity>) -> Self {
        Self {
            identity,
            connect_timeout: Duration::from_secs(10),
            connections: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Set the dial timeout used by [`ConnectionManager::connect_to`].
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn identity(&self) -> &CollectorIdentity {
        &self.identity
    }

    /// Record an inbound link from a collector at `requester_address`.
    pub async fn handle_connect(
        &self,
        requester_address: &str,
        requester_namespaces: &[String],
        requester_id: &str,
    ) -> Result<Connection, CallError> {
        if requester_address.is_empty() {
            return Err(CallError::invalid_argument("requester address is required"));
        }

        let connection = Connection {
            id: Uuid::new_v4().to_string(),
            source_collector_id: requester_id.to_string(),
            target_collector_id: self.identity.id.clone(),
            address: requester_address.to_string(),
            shared_namespaces: shared_namespaces(&self.identity.namespaces, requester_namespaces),
            last_activity: Utc::now(),
        };

        self.connections
            .write()
            .await
            .insert(connection.id.clone(), connection.clone());

        info!(
            connection_id = %connection.id,
            peer = %requester_address,
            peer_id = %requester_id,
            shared = ?connection.shared_namespaces,
            "Accepted inbound connection"
        );
        Ok(connection)
    }

    /// Dial `peer_address`, announce ourselves, and cache the resulting client.
    pub async fn connect_to(
        &self,
        peer_address: &str,
        my_namespaces: &[String],
    ) -> Result<Connection, DispatchError> {
        let config = ChannelConfig::new(peer_address).with_connect_timeout(self.connect_timeout);
        let channel = create_channel(&config).await?;
        let mut client = DispatchServiceClient::new(channel);

        let response = client
            .connect(ConnectRequest {
                address: self.identity.address.clone(),
                namespaces: my_namespaces.to_vec(),
                collector_id: self.identity.id.clone(),
            })
            .await?
            .into_inner();

        if let Err(err) = check_status(response.status.as_ref()) {
            warn!(peer = %peer_address, error = %err, "Peer rejected connection");
            // Dropping the only client closes the transport
            drop(client);
            return Err(DispatchError::Remote {
                code: err.code.code(),
                message: err.message,
            });
        }

        let connection = Connection {
            id: Uuid::new_v4().to_string(),
            source_collector_id: self.identity.id.clone(),
            target_collector_id: response.collector_id,
            address: peer_address.to_string(),
            shared_namespaces: response.shared_namespaces,
            last_activity: Utc::now(),
        };

        self.clients
            .write()
            .await
            .insert(peer_address.to_string(), client);
        self.connections
            .write()
            .await
            .insert(connection.id.clone(), connection.clone());

        info!(
            connection_id = %connection.id,
            remote_connection_id = %response.connection_id,
            peer = %peer_address,
            peer_id = %connection.target_collector_id,
            shared = ?connection.shared_namespaces,
            "Connected to peer"
        );
        Ok(connection)
    }

    /// Cached client for a peer address.
    pub async fn get_client(&self, address: &str) -> Option<DispatchServiceClient<Channel>> {
        self.clients.read().await.get(address).cloned()
    }

    /// Snapshot of all connection records.
    pub async fn list_connections(&self) -> Vec<Connection> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Refresh the advisory activity timestamp of a connection.
    pub async fn touch(&self, connection_id: &str) {
        if let Some(conn) = self.connections.write().await.get_mut(connection_id) {
            conn.last_activity = Utc::now();
        }
    }

    /// Drop every peer client and forget all connections. Safe to call repeatedly.
    pub async fn close_all(&self) {
        let clients = std::mem::take(&mut *self.clients.write().await);
        let connections = std::mem::take(&mut *self.connections.write().await);
        debug!(
            clients = clients.len(),
            connections = connections.len(),
            "Closed all connections"
        );
    }
}
