// ABOUTME: gRPC channel creation for collector-to-collector links.
// ABOUTME: Normalizes peer addresses and applies heartbeats and connect timeouts.

use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

use crate::error::DispatchError;

/// HTTP/2 pings on a cached peer link.
///
/// Peer links sit idle between forwards, so pings are always sent while idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub every: Duration,
    /// A peer that misses a ping reply for this long is considered gone.
    pub grace: Duration,
}

impl Heartbeat {
    pub const STANDARD: Heartbeat = Heartbeat {
        every: Duration::from_secs(15),
        grace: Duration::from_secs(5),
    };
}

/// How to dial a peer collector.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Peer URI (e.g., "http://10.0.0.7:50061").
    pub address: String,
    pub heartbeat: Option<Heartbeat>,
    pub connect_timeout: Duration,
}

impl ChannelConfig {
    /// Bare `host:port` addresses get an `http://` scheme.
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        let address = address.trim();
        Self {
            address: if address.is_empty() || address.contains("://") {
                address.to_string()
            } else {
                format!("http://{}", address)
            },
            heartbeat: Some(Heartbeat::STANDARD),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Replace the heartbeat; `None` turns pings off.
    pub fn with_heartbeat(self, heartbeat: Option<Heartbeat>) -> Self {
        Self { heartbeat, ..self }
    }

    pub fn with_connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self
        }
    }
}

/// Dial a peer with the specified configuration.
///
/// Peer channels are cached for the life of the connection; the heartbeat is
/// what notices a dead peer.
pub async fn create_channel(config: &ChannelConfig) -> Result<Channel, DispatchError> {
    let mut endpoint = Endpoint::from_shared(config.address.clone())
        .map_err(|e| DispatchError::InvalidAddress(format!("{}: {}", config.address, e)))?;

    endpoint = endpoint.connect_timeout(config.connect_timeout);
    if let Some(heartbeat) = config.heartbeat {
        endpoint = endpoint
            .http2_keep_alive_interval(heartbeat.every)
            .keep_alive_timeout(heartbeat.grace)
            .keep_alive_while_idle(true);
    }

    let channel = endpoint
        .connect()
        .await
        .map_err(|e| DispatchError::ConnectionFailed {
            address: config.address.clone(),
            reason: e.to_string(),
        })?;

    tracing::debug!(
        address = %config.address,
        heartbeat = config.heartbeat.is_some(),
        "peer channel connected"
    );

    Ok(channel)
}
