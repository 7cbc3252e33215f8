//! Ordered stage constructors folded around an inner handler

use std::fmt;
use std::sync::Arc;

use tower::Layer;

use crate::handler::{JsonRpcHandler, SharedHandler};

/// A stage constructor over type-erased handlers
pub type BoxLayer = Arc<dyn Layer<SharedHandler, Service = SharedHandler> + Send + Sync>;

/// Ordered collection of stage constructors.
///
/// Layers are folded right-to-left around the inner handler, so the first
/// layer pushed becomes the outermost stage and sees the request first.
///
/// # Examples
///
/// ```rust
/// use jsonrpc_toolkit::middleware::MiddlewareStack;
/// use jsonrpc_toolkit::prelude::*;
/// use std::sync::Arc;
/// use tower::layer::layer_fn;
///
/// struct Tag {
///     inner: SharedHandler,
/// }
///
/// impl JsonRpcHandler for Tag {
///     fn call(&self, request: &JsonRpcRequest, ctx: &mut Context) -> HandlerResult {
///         ctx.insert("tagged", serde_json::json!(true));
///         self.inner.call(request, ctx)
///     }
/// }
///
/// let mut stack = MiddlewareStack::new();
/// stack.push(layer_fn(|inner| Tag { inner }));
/// assert_eq!(stack.len(), 1);
///
/// let pipeline = stack.build(Arc::new(MethodDispatcher::new()));
/// let mut ctx = Context::new();
/// let _ = pipeline.call(&JsonRpcRequest::notification("ping", None), &mut ctx);
/// assert!(ctx.contains_key("tagged"));
/// ```
#[derive(Default, Clone)]
pub struct MiddlewareStack {
    layers: Vec<BoxLayer>,
}

impl MiddlewareStack {
    /// Create an empty middleware stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer inside the ones already pushed
    pub fn push<L>(&mut self, layer: L)
    where
        L: Layer<SharedHandler> + Send + Sync + 'static,
        L::Service: JsonRpcHandler + 'static,
    {
        self.layers.push(Arc::new(Erased(layer)));
    }

    /// Get the number of layers in the stack
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Check if the stack is empty
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wrap `inner` in every layer, first pushed outermost
    pub fn build(&self, inner: SharedHandler) -> SharedHandler {
        self.layers
            .iter()
            .rev()
            .fold(inner, |handler, layer| layer.layer(handler))
    }
}

impl fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareStack")
            .field("layers", &self.layers.len())
            .finish()
    }
}

/// Boxes whatever stage a layer produces
struct Erased<L>(L);

impl<L> Layer<SharedHandler> for Erased<L>
where
    L: Layer<SharedHandler>,
    L::Service: JsonRpcHandler + 'static,
{
    type Service = SharedHandler;

    fn layer(&self, inner: SharedHandler) -> SharedHandler {
        Arc::new(self.0.layer(inner))
    }
}
