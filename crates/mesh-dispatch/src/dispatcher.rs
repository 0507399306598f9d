// ABOUTME: DispatchService implementation: Connect, Serve, and Dispatch
// ABOUTME: Executes registered handlers locally or routes calls to peers sharing the namespace

use crate::connection::{CollectorIdentity, Connection, ConnectionManager};
use crate::deadline::{inherited_timeout, tightest};
use crate::error::DispatchError;
use crate::handler::{HandlerContext, MethodKey, ServiceHandler};
use crate::status::{check_status, into_wire, ok_status, CallError, CallResult};
use futures::FutureExt;
use mesh_proto::client::DispatchServiceClient;
use mesh_proto::server::DispatchService;
use mesh_proto::{
    ConnectRequest, ConnectResponse, DispatchRequest, DispatchResponse, ListConnectionsRequest,
    ListConnectionsResponse, ServeRequest, ServeResponse, ServiceRef,
};
use mesh_registry::MethodValidator;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tonic::transport::Channel;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

/// A call addressed to `namespace` / `service.method`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub namespace: String,
    pub service: String,
    pub method: String,
    pub input: Vec<u8>,
}

impl Call {
    pub fn new(
        namespace: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
        input: Vec<u8>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            service: service.into(),
            method: method.into(),
            input,
        }
    }

    fn check_fields(&self) -> Result<(), CallError> {
        if self.namespace.is_empty() || self.service.is_empty() || self.method.is_empty() {
            return Err(CallError::invalid_argument(
                "namespace, service name, and method are required",
            ));
        }
        Ok(())
    }

    fn key(&self) -> MethodKey {
        MethodKey::new(self.service.clone(), self.method.clone())
    }

    fn to_serve_request(&self) -> ServeRequest {
        ServeRequest {
            namespace: self.namespace.clone(),
            service: Some(ServiceRef {
                name: self.service.clone(),
            }),
            method: self.method.clone(),
            input: self.input.clone(),
        }
    }
}

/// Outcome of a dispatched call and the collector that executed it.
#[derive(Debug)]
pub struct Routed {
    pub result: CallResult,
    /// Empty when no collector executed the call.
    pub handled_by: String,
}

impl Routed {
    fn unhandled(err: CallError) -> Self {
        Self {
            result: Err(err),
            handled_by: String::new(),
        }
    }
}

/// Handlers per namespace, plus the optional registry gate.
#[derive(Default)]
struct ServiceTable {
    handlers: HashMap<String, HashMap<MethodKey, Arc<dyn ServiceHandler>>>,
    validator: Option<Arc<dyn MethodValidator>>,
}

/// Executes calls for one collector and routes the rest to its peers.
pub struct Dispatcher {
    identity: Arc<CollectorIdentity>,
    connections: ConnectionManager,
    services: RwLock<ServiceTable>,
    /// Upper bound on each forwarded Serve, on top of the caller's deadline.
    forward_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(identity: CollectorIdentity) -> Self {
        let identity = Arc::new(identity);
        Self {
            connections: ConnectionManager::new(identity.clone()),
            identity,
            services: RwLock::new(ServiceTable::default()),
            forward_timeout: None,
        }
    }

    /// Gate Serve calls through `validator` from the start.
    pub fn with_registry_validator(mut self, validator: Arc<dyn MethodValidator>) -> Self {
        self.services.get_mut().validator = Some(validator);
        self
    }

    /// Cap every forwarded call at `timeout`.
    pub fn with_forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = Some(timeout);
        self
    }

    /// Dial timeout for outbound connections.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connections = ConnectionManager::new(self.identity.clone()).with_connect_timeout(timeout);
        self
    }

    pub fn identity(&self) -> &CollectorIdentity {
        &self.identity
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Bind a handler to `namespace` / `service.method`, replacing any previous binding.
    pub async fn register_service(
        &self,
        namespace: &str,
        service: &str,
        method: &str,
        handler: Arc<dyn ServiceHandler>,
    ) {
        let key = MethodKey::new(service, method);
        info!(namespace = %namespace, method = %key, "Handler registered");
        self.services
            .write()
            .await
            .handlers
            .entry(namespace.to_string())
            .or_default()
            .insert(key, handler);
    }

    /// Attach (or replace) the registry gate consulted by Serve.
    pub async fn set_registry_validator(&self, validator: Arc<dyn MethodValidator>) {
        self.services.write().await.validator = Some(validator);
        info!("Registry validator attached");
    }

    /// Whether a handler for `call` is registered on this collector.
    pub async fn has_handler(&self, namespace: &str, service: &str, method: &str) -> bool {
        self.services
            .read()
            .await
            .handlers
            .get(namespace)
            .is_some_and(|methods| methods.contains_key(&MethodKey::new(service, method)))
    }

    /// Dial a peer and announce this collector's namespaces.
    pub async fn connect_to(&self, peer_address: &str) -> Result<Connection, DispatchError> {
        self.connections
            .connect_to(peer_address, &self.identity.namespaces)
            .await
    }

    /// Execute `call` against a local handler.
    pub async fn serve_call(&self, call: &Call) -> CallResult {
        call.check_fields()?;

        let validator = self.services.read().await.validator.clone();
        if let Some(validator) = validator {
            let verdict = validator
                .validate_method(&call.namespace, &call.service, &call.method)
                .await;
            match verdict {
                Ok(result) if result.is_valid => {}
                Ok(result) => {
                    return Err(CallError::not_found(format!(
                        "method validation failed: {}",
                        result.message
                    )))
                }
                Err(status) => {
                    return Err(CallError::not_found(format!(
                        "method validation failed: {}",
                        status.message()
                    )))
                }
            }
        }

        let key = call.key();
        let handler = {
            let services = self.services.read().await;
            let Some(methods) = services.handlers.get(&call.namespace) else {
                return Err(CallError::not_found(format!(
                    "namespace '{}' not registered on collector '{}'",
                    call.namespace, self.identity.id
                )));
            };
            let Some(handler) = methods.get(&key) else {
                return Err(CallError::not_found(format!(
                    "method '{}' not registered in namespace '{}'",
                    key, call.namespace
                )));
            };
            handler.clone()
        };

        let ctx = HandlerContext {
            collector_id: self.identity.id.clone(),
            namespace: call.namespace.clone(),
            service: call.service.clone(),
            method: call.method.clone(),
        };
        debug!(namespace = %call.namespace, method = %key, "Serving call");

        // Handlers may panic before returning their future; call them inside the guard
        let input = call.input.clone();
        match AssertUnwindSafe(async { handler.call(&ctx, input).await })
            .catch_unwind()
            .await
        {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                warn!(namespace = %call.namespace, method = %key, error = %e, "Handler failed");
                Err(CallError::internal(format!("handler error: {}", e)))
            }
            Err(_) => {
                warn!(namespace = %call.namespace, method = %key, "Handler panicked");
                Err(CallError::internal(format!("handler for '{}' panicked", key)))
            }
        }
    }

    /// Route `call` to `target` if given, otherwise to whichever collector can serve it.
    ///
    /// `deadline` bounds each forwarded attempt; auto-routing has no overall deadline.
    pub async fn dispatch_call(
        &self,
        call: &Call,
        target: Option<&str>,
        deadline: Option<Duration>,
    ) -> Routed {
        if let Err(err) = call.check_fields() {
            return Routed::unhandled(err);
        }
        let deadline = tightest(deadline, self.forward_timeout);

        match target {
            Some(target) => self.dispatch_to(call, target, deadline).await,
            None => self.auto_route(call, deadline).await,
        }
    }

    async fn dispatch_to(&self, call: &Call, target: &str, deadline: Option<Duration>) -> Routed {
        let connection = self
            .connections
            .list_connections()
            .await
            .into_iter()
            .find(|conn| conn.leads_to(target, &self.identity.id));
        let Some(connection) = connection else {
            return Routed::unhandled(CallError::not_found(format!(
                "no connection to collector '{}'",
                target
            )));
        };

        let Some(client) = self.connections.get_client(&connection.address).await else {
            return Routed::unhandled(CallError::internal(format!(
                "no client for connection to '{}' at {}",
                target, connection.address
            )));
        };

        debug!(collector = %target, peer = %connection.address, "Forwarding to explicit target");
        match self.forward(client, &connection, call, deadline).await {
            Ok(response) => Routed {
                result: check_status(response.status.as_ref()).map(|()| response.output),
                handled_by: response.executor_id,
            },
            Err(err) => Routed::unhandled(err),
        }
    }

    async fn auto_route(&self, call: &Call, deadline: Option<Duration>) -> Routed {
        if self
            .has_handler(&call.namespace, &call.service, &call.method)
            .await
        {
            return Routed {
                result: self.serve_call(call).await,
                handled_by: self.identity.id.clone(),
            };
        }

        // First peer answering OK wins; the rest are skipped silently.
        for connection in self.connections.list_connections().await {
            if !connection.shares(&call.namespace) {
                continue;
            }
            let Some(client) = self.connections.get_client(&connection.address).await else {
                continue;
            };

            match self.forward(client, &connection, call, deadline).await {
                Ok(response) if check_status(response.status.as_ref()).is_ok() => {
                    debug!(
                        namespace = %call.namespace,
                        peer = %connection.address,
                        executor = %response.executor_id,
                        "Auto-routed call"
                    );
                    return Routed {
                        result: Ok(response.output),
                        handled_by: response.executor_id,
                    };
                }
                Ok(response) => {
                    debug!(
                        peer = %connection.address,
                        status = ?response.status,
                        "Peer could not serve call, trying next"
                    );
                }
                Err(err) => {
                    debug!(peer = %connection.address, error = %err, "Peer unreachable, trying next");
                }
            }
        }

        Routed::unhandled(CallError::not_found(format!(
            "no collector found for namespace '{}'",
            call.namespace
        )))
    }

    /// Forward a Serve over an existing peer link. No lock is held here.
    async fn forward(
        &self,
        mut client: DispatchServiceClient<Channel>,
        connection: &Connection,
        call: &Call,
        deadline: Option<Duration>,
    ) -> Result<ServeResponse, CallError> {
        let mut request = Request::new(call.to_serve_request());
        if let Some(deadline) = deadline {
            request.set_timeout(deadline);
        }

        let pending = client.serve(request);
        let outcome = match deadline {
            Some(deadline) => match tokio::time::timeout(deadline, pending).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(CallError::internal(format!(
                        "forwarded call to {} timed out after {:?}",
                        connection.address, deadline
                    )))
                }
            },
            None => pending.await,
        };

        self.connections.touch(&connection.id).await;
        outcome.map(Response::into_inner).map_err(|status| {
            CallError::internal(format!(
                "forwarded call to {} failed: {}",
                connection.address,
                status.message()
            ))
        })
    }
}

fn call_from_parts(
    namespace: String,
    service: Option<ServiceRef>,
    method: String,
    input: Vec<u8>,
) -> Call {
    Call {
        namespace,
        service: service.map(|s| s.name).unwrap_or_default(),
        method,
        input,
    }
}

#[tonic::async_trait]
impl DispatchService for Dispatcher {
    async fn connect(
        &self,
        request: Request<ConnectRequest>,
    ) -> Result<Response<ConnectResponse>, Status> {
        let req = request.into_inner();
        let response = match self
            .connections
            .handle_connect(&req.address, &req.namespaces, &req.collector_id)
            .await
        {
            Ok(conn) => ConnectResponse {
                status: Some(ok_status()),
                connection_id: conn.id,
                shared_namespaces: conn.shared_namespaces,
                collector_id: self.identity.id.clone(),
            },
            Err(err) => ConnectResponse {
                status: Some(err.into()),
                collector_id: self.identity.id.clone(),
                ..Default::default()
            },
        };
        Ok(Response::new(response))
    }

    async fn serve(&self, request: Request<ServeRequest>) -> Result<Response<ServeResponse>, Status> {
        let req = request.into_inner();
        let call = call_from_parts(req.namespace, req.service, req.method, req.input);
        let (status, output) = into_wire(self.serve_call(&call).await);
        Ok(Response::new(ServeResponse {
            status: Some(status),
            output,
            executor_id: self.identity.id.clone(),
        }))
    }

    async fn dispatch(
        &self,
        request: Request<DispatchRequest>,
    ) -> Result<Response<DispatchResponse>, Status> {
        let deadline = inherited_timeout(request.metadata());
        let req = request.into_inner();
        let target = req.target_collector_id;
        let call = call_from_parts(req.namespace, req.service, req.method, req.input);

        let target = Some(target.as_str()).filter(|t| !t.is_empty());
        let routed = self.dispatch_call(&call, target, deadline).await;
        let (status, output) = into_wire(routed.result);
        Ok(Response::new(DispatchResponse {
            status: Some(status),
            output,
            handled_by_collector_id: routed.handled_by,
        }))
    }

    async fn list_connections(
        &self,
        _request: Request<ListConnectionsRequest>,
    ) -> Result<Response<ListConnectionsResponse>, Status> {
        let connections = self
            .connections
            .list_connections()
            .await
            .iter()
            .map(mesh_proto::Connection::from)
            .collect();
        Ok(Response::new(ListConnectionsResponse { connections }))
    }
}
