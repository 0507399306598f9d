// ABOUTME: gRPC server setup and lifecycle for a collector
// ABOUTME: Wires registry, dispatcher, and interceptor together, dials bootstrap peers, shuts down cleanly

use crate::config::{Config, RegistryBackend};
use anyhow::{Context, Result};
use mesh_dispatch::{create_channel, ChannelConfig, CollectorIdentity, Dispatcher};
use mesh_proto::server::{DispatchServiceServer, RegistryServiceServer};
use mesh_proto::{MethodDescriptorProto, ServiceDescriptorProto};
use mesh_registry::{MethodValidator, RegistryError, RegistryServer, RemoteValidator, ValidationLayer};
use mesh_store::SqliteStore;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tower::Layer;
use tracing::{info, warn};

/// Catalog entry that lets gated collectors keep answering mesh traffic.
const DISPATCH_SERVICE: &str = "DispatchService";
const DISPATCH_METHODS: [&str; 4] = ["Connect", "Serve", "Dispatch", "ListConnections"];

/// A collector with its services built and ready to listen.
pub struct Node {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    registry: Option<Arc<RegistryServer>>,
    validator: Option<Arc<dyn MethodValidator>>,
}

impl Node {
    /// Build registry, validator, and dispatcher from `config`.
    pub async fn build(config: Config) -> Result<Self> {
        config.validate()?;

        let registry = if config.registry.enabled {
            Some(Arc::new(open_registry(&config).await?))
        } else {
            None
        };

        let gated = config.registry.validate_serve || config.registry.intercept_calls;
        let validator = match (&registry, &config.registry.remote) {
            (_, _) if !gated => None,
            (Some(registry), _) => Some(registry.clone() as Arc<dyn MethodValidator>),
            (None, Some(remote)) => {
                let channel = create_channel(
                    &ChannelConfig::new(remote).with_connect_timeout(config.connect_timeout()),
                )
                .await
                .with_context(|| format!("connecting to remote registry {}", remote))?;
                Some(Arc::new(RemoteValidator::new(channel)) as Arc<dyn MethodValidator>)
            }
            (None, None) => None,
        };

        let identity = CollectorIdentity::new(
            config.collector_id(),
            config.advertise_address(),
            config.collector.namespaces.iter().cloned(),
        );
        let mut dispatcher = Dispatcher::new(identity).with_connect_timeout(config.connect_timeout());
        if let Some(timeout) = config.forward_timeout() {
            dispatcher = dispatcher.with_forward_timeout(timeout);
        }
        if config.registry.validate_serve {
            if let Some(validator) = &validator {
                dispatcher = dispatcher.with_registry_validator(validator.clone());
            }
        }

        if config.registry.intercept_calls {
            if let (Some(registry), Some(namespace)) = (&registry, config.interceptor_namespace()) {
                register_dispatch_surface(registry, &namespace).await?;
            }
        }

        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            registry,
            validator,
        })
    }

    /// The dispatcher, for registering handlers before serving.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The locally hosted registry, if any.
    pub fn registry(&self) -> Option<&Arc<RegistryServer>> {
        self.registry.as_ref()
    }

    fn interceptor(&self) -> Option<ValidationLayer> {
        if !self.config.registry.intercept_calls {
            return None;
        }
        let namespace = self.config.interceptor_namespace()?;
        let validator = self.validator.clone()?;
        Some(ValidationLayer::new(namespace, validator))
    }

    /// Dial every bootstrap peer in the background. Failures are logged, not fatal.
    fn spawn_bootstrap(&self) {
        let peers = self.config.peers.bootstrap.clone();
        if peers.is_empty() {
            return;
        }
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            for peer in peers {
                match dispatcher.connect_to(&peer).await {
                    Ok(conn) => info!(
                        peer = %peer,
                        peer_id = %conn.target_collector_id,
                        shared = ?conn.shared_namespaces,
                        "Bootstrap peer connected"
                    ),
                    Err(e) => warn!(peer = %peer, error = %e, "Bootstrap peer unreachable"),
                }
            }
        });
    }

    /// Serve on `listener` until `shutdown` resolves, then drop all peer links.
    pub async fn serve_with_incoming<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let identity = self.dispatcher.identity();
        info!(
            collector_id = %identity.id,
            address = %identity.address,
            namespaces = ?identity.namespaces,
            registry = self.registry.is_some(),
            validate_serve = self.config.registry.validate_serve,
            intercept_calls = self.config.registry.intercept_calls,
            "Starting collector"
        );

        // RegistryService stays ungated so the catalog can always be populated
        let dispatch = DispatchServiceServer::from_arc(self.dispatcher.clone());
        let (gated, open) = match self.interceptor() {
            Some(layer) => (Some(layer.layer(dispatch)), None),
            None => (None, Some(dispatch)),
        };
        let registry = self.registry.clone().map(RegistryServiceServer::from_arc);

        self.spawn_bootstrap();

        Server::builder()
            .add_optional_service(gated)
            .add_optional_service(open)
            .add_optional_service(registry)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await
            .context("running gRPC server")?;

        self.dispatcher.connections().close_all().await;
        info!("Collector shut down gracefully");
        Ok(())
    }
}

async fn open_registry(config: &Config) -> Result<RegistryServer> {
    match config.registry.backend {
        RegistryBackend::Memory => Ok(RegistryServer::in_memory()),
        RegistryBackend::Sqlite => {
            let path = config.registry_db_path();
            let services = SqliteStore::open(&path, "services")
                .await
                .with_context(|| format!("opening registry database {}", path.display()))?;
            let protos = services.collection("protos");
            info!(path = %path.display(), "Registry database opened");
            Ok(RegistryServer::new(Arc::new(services), Arc::new(protos)))
        }
    }
}

async fn register_dispatch_surface(registry: &RegistryServer, namespace: &str) -> Result<()> {
    let descriptor = ServiceDescriptorProto {
        name: Some(DISPATCH_SERVICE.to_string()),
        method: DISPATCH_METHODS
            .iter()
            .map(|m| MethodDescriptorProto {
                name: Some(m.to_string()),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };
    match registry.register_service(namespace, Some(descriptor)).await {
        Ok(_) | Err(RegistryError::AlreadyExists(_)) => Ok(()),
        Err(e) => Err(e).context("registering the dispatch service"),
    }
}

/// Run a collector on the configured listen address until Ctrl+C or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let listen_addr = config.collector.listen_addr.clone();
    let node = Node::build(config).await?;

    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding {}", listen_addr))?;

    println!();
    println!("Collector {} listening on {}", node.dispatcher.identity().id, listen_addr);
    println!("Press Ctrl+C to stop");
    println!();

    node.serve_with_incoming(listener, shutdown_signal()).await?;
    println!("\nCollector stopped.");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
