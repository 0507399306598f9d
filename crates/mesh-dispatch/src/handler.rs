// ABOUTME: Service handler trait for methods executed by a collector.
// ABOUTME: Handlers are keyed by namespace plus service.method and invoked by Serve.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Context provided to handlers.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// The collector executing the call.
    pub collector_id: String,
    pub namespace: String,
    pub service: String,
    pub method: String,
}

/// `service.method` key of a handler within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub service: String,
    pub method: String,
}

impl MethodKey {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.method)
    }
}

/// An executable method.
///
/// Errors are reported to the caller as INTERNAL with the error text inlined.
///
/// # Example
///
/// ```ignore
/// struct Echo;
///
/// impl ServiceHandler for Echo {
///     fn call<'a>(
///         &'a self,
///         _ctx: &'a HandlerContext,
///         input: Vec<u8>,
///     ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send + 'a>> {
///         Box::pin(async move { Ok(input) })
///     }
/// }
/// ```
pub trait ServiceHandler: Send + Sync {
    fn call<'a>(
        &'a self,
        ctx: &'a HandlerContext,
        input: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send + 'a>>;
}

/// A closure-based handler.
///
/// Useful when a handler needs no state beyond what the closure captures.
pub struct CallbackHandler<F> {
    callback: F,
}

impl<F, Fut> CallbackHandler<F>
where
    F: Fn(HandlerContext, Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    /// Create a callback handler from a closure.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F, Fut> ServiceHandler for CallbackHandler<F>
where
    F: Fn(HandlerContext, Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    fn call<'a>(
        &'a self,
        ctx: &'a HandlerContext,
        input: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send + 'a>> {
        Box::pin((self.callback)(ctx.clone(), input))
    }
}

/// Wrap a closure as a shareable handler.
pub fn handler_fn<F, Fut>(callback: F) -> Arc<dyn ServiceHandler>
where
    F: Fn(HandlerContext, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    Arc::new(CallbackHandler::new(callback))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> HandlerContext {
        HandlerContext {
            collector_id: "collector-a".to_string(),
            namespace: "alpha".to_string(),
            service: "Greeter".to_string(),
            method: "SayHello".to_string(),
        }
    }

    #[test]
    fn test_method_key_display() {
        let key = MethodKey::new("Greeter", "SayHello");
        assert_eq!(key.to_string(), "Greeter.SayHello");
    }

    #[tokio::test]
    async fn test_callback_handler_sees_context() {
        let handler = handler_fn(|ctx, input| async move {
            let mut out = format!("{}:{}:", ctx.collector_id, ctx.method).into_bytes();
            out.extend(input);
            Ok::<_, anyhow::Error>(out)
        });

        let output = handler.call(&ctx(), b"hi".to_vec()).await.unwrap();
        assert_eq!(output, b"collector-a:SayHello:hi");
    }

    #[tokio::test]
    async fn test_callback_handler_error() {
        let handler = handler_fn(|_ctx, _input| async {
            Err::<Vec<u8>, _>(anyhow::anyhow!("backend offline"))
        });
        let err = handler.call(&ctx(), Vec::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "backend offline");
    }
}
