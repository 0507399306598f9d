// ABOUTME: Tower layer that gates every inbound gRPC call against the registry.
// ABOUTME: Parses /<package>.<Service>/<Method> and rejects unregistered methods as UNIMPLEMENTED.

use crate::validator::MethodValidator;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::server::NamedService;
use tonic::Status;
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Service and method addressed by a gRPC call path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPath {
    /// Unqualified service name (`Greeter` for `/greet.v1.Greeter/SayHello`).
    pub service: String,
    pub method: String,
}

impl CallPath {
    /// Parse `/<package>.<ServiceName>/<MethodName>`.
    ///
    /// Returns `None` unless the path has exactly three `/`-separated segments;
    /// such calls bypass validation.
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() != 3 {
            return None;
        }
        let qualified = segments[1];
        let service = qualified.rsplit('.').next().unwrap_or(qualified);
        Some(Self {
            service: service.to_string(),
            method: segments[2].to_string(),
        })
    }
}

/// Layer applying [`ValidatedService`] to every service of a tonic server.
///
/// Unary and streaming calls are gated identically since validation happens
/// on the HTTP request before any message is decoded.
#[derive(Clone)]
pub struct ValidationLayer {
    namespace: Arc<str>,
    validator: Arc<dyn MethodValidator>,
}

impl ValidationLayer {
    /// Validate calls against `namespace` using `validator`.
    pub fn new(namespace: impl Into<String>, validator: Arc<dyn MethodValidator>) -> Self {
        Self {
            namespace: Arc::from(namespace.into()),
            validator,
        }
    }
}

impl<S> Layer<S> for ValidationLayer {
    type Service = ValidatedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ValidatedService {
            inner,
            namespace: self.namespace.clone(),
            validator: self.validator.clone(),
        }
    }
}

/// A service whose calls only reach `inner` when the registry knows the method.
#[derive(Clone)]
pub struct ValidatedService<S> {
    inner: S,
    namespace: Arc<str>,
    validator: Arc<dyn MethodValidator>,
}

impl<S: NamedService> NamedService for ValidatedService<S> {
    const NAME: &'static str = S::NAME;
}

/// Consult the registry for `call`, producing the rejection status on failure.
async fn check_call(
    validator: &dyn MethodValidator,
    namespace: &str,
    call: &CallPath,
) -> Result<(), Status> {
    let rejection = || {
        Status::unimplemented(format!(
            "method '{}' on service '{}' is not registered in namespace '{}'",
            call.method, call.service, namespace
        ))
    };

    match validator
        .validate_method(namespace, &call.service, &call.method)
        .await
    {
        Ok(result) if result.is_valid => Ok(()),
        Ok(result) => {
            warn!(
                namespace = %namespace,
                service = %call.service,
                method = %call.method,
                reason = %result.message,
                "Rejected unregistered call"
            );
            Err(rejection())
        }
        Err(status) => {
            warn!(
                namespace = %namespace,
                service = %call.service,
                method = %call.method,
                error = %status,
                "Method validation failed; rejecting call"
            );
            Err(rejection())
        }
    }
}

impl<S, B> Service<http::Request<B>> for ValidatedService<S>
where
    S: Service<http::Request<B>, Response = http::Response<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        // Take the service that was driven to readiness, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let namespace = self.namespace.clone();
        let validator = self.validator.clone();

        Box::pin(async move {
            let Some(call) = CallPath::parse(req.uri().path()) else {
                debug!(path = %req.uri().path(), "Unrecognized call path, skipping validation");
                return inner.call(req).await;
            };

            match check_call(validator.as_ref(), &namespace, &call).await {
                Ok(()) => inner.call(req).await,
                Err(status) => Ok(status.into_http()),
            }
        })
    }
}
