//! Server assembly: dispatcher, middleware and error handling in one pipeline

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower::Layer;
use tracing::{debug, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::context::Context;
use crate::decode::{parse_request, parse_request_value};
use crate::dispatcher::{MethodDispatcher, Namespace};
use crate::error::JsonRpcErrorObject;
use crate::fault::Fault;
use crate::handler::{HandlerResult, JsonRpcHandler, SharedHandler};
use crate::method::Method;
use crate::middleware::{
    ExceptionHandlers, ExceptionLayer, HandlerKey, MiddlewareStack, ServerErrorLayer,
    ServerErrorMiddleware,
};
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcResponse;

enum Registration {
    Method(Method),
    Namespace(Namespace),
}

/// Builder for [`JsonRpcServer`]
///
/// # Examples
///
/// ```rust
/// use jsonrpc_toolkit::prelude::*;
/// use serde_json::json;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("not enough stock")]
/// struct OutOfStock;
///
/// impl Classified for OutOfStock {
///     fn class(&self) -> ErrorClass {
///         ErrorClass::from_static("shop.out_of_stock")
///     }
/// }
///
/// fn order(_: (String, u32)) -> Result<u32, OutOfStock> {
///     Err(OutOfStock)
/// }
///
/// # fn main() -> Result<(), ConfigError> {
/// let server = JsonRpcServer::builder()
///     .method(method!(order))
///     .exception_handler("shop", |_: &JsonRpcRequest, _: &mut Context, fault: &Fault| {
///         JsonRpcErrorObject::new(-32001, fault.to_string(), None)
///     })
///     .build()?;
///
/// let response = server
///     .handle_value(json!({"jsonrpc": "2.0", "method": "order", "params": ["tea", 2], "id": 1}))
///     .unwrap();
/// assert_eq!(response.error_object().unwrap().code, -32001);
/// # Ok(())
/// # }
/// ```
pub struct JsonRpcServerBuilder {
    config: ServerConfig,
    registrations: Vec<Registration>,
    middleware: MiddlewareStack,
    exception_handlers: ExceptionHandlers,
    server_errors: ServerErrorLayer,
}

impl JsonRpcServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            registrations: Vec::new(),
            middleware: MiddlewareStack::new(),
            exception_handlers: ExceptionHandlers::new(),
            server_errors: ServerErrorLayer::new(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Include fault details and backtraces in internal error responses
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn namespace_separator(mut self, separator: impl Into<String>) -> Self {
        self.config.namespace_separator = separator.into();
        self
    }

    /// Register a prepared method, see [`method!`](crate::method)
    pub fn method(mut self, method: Method) -> Self {
        self.registrations.push(Registration::Method(method));
        self
    }

    pub fn methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.registrations
            .extend(methods.into_iter().map(Registration::Method));
        self
    }

    /// Register a function under `name`
    pub fn register<F, P, R, E>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(P) -> Result<R, E> + Send + Sync + 'static,
        P: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
        E: Into<Fault> + 'static,
    {
        self.method(Method::new(name, f))
    }

    /// Register a function that also receives the per-call context
    pub fn register_with_context<F, P, R, E>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(P, &mut Context) -> Result<R, E> + Send + Sync + 'static,
        P: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
        E: Into<Fault> + 'static,
    {
        self.method(Method::with_context(name, f))
    }

    /// Mount a namespace; its methods are prefixed with the configured separator
    pub fn namespace(mut self, namespace: Namespace) -> Self {
        self.registrations.push(Registration::Namespace(namespace));
        self
    }

    /// Add a middleware layer between the server-error guard and the
    /// exception translator. Layers added first sit further out.
    pub fn middleware<L>(mut self, layer: L) -> Self
    where
        L: Layer<SharedHandler> + Send + Sync + 'static,
        L::Service: JsonRpcHandler + 'static,
    {
        self.middleware.push(layer);
        self
    }

    /// Translate faults matching `key` (a code or an error class) with `handler`
    pub fn exception_handler<F>(mut self, key: impl Into<HandlerKey>, handler: F) -> Self
    where
        F: Fn(&JsonRpcRequest, &mut Context, &Fault) -> JsonRpcErrorObject + Send + Sync + 'static,
    {
        self.exception_handlers.add_handler(key, handler);
        self
    }

    /// Build the error for faults no exception handler matched. Ignored in
    /// debug mode.
    pub fn server_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&JsonRpcRequest, &mut Context, &Fault) -> JsonRpcErrorObject + Send + Sync + 'static,
    {
        self.server_errors = self.server_errors.handler(handler);
        self
    }

    pub fn build(self) -> Result<JsonRpcServer, ConfigError> {
        self.config.validate()?;

        let mut dispatcher =
            MethodDispatcher::new().with_separator(self.config.namespace_separator.clone());
        for registration in self.registrations {
            match registration {
                Registration::Method(method) => dispatcher.add_method(method),
                Registration::Namespace(namespace) => dispatcher.mount(namespace),
            };
        }

        debug!(
            methods = dispatcher.len(),
            middleware = self.middleware.len(),
            debug = self.config.debug,
            "Built JSON-RPC server"
        );

        Ok(JsonRpcServer {
            dispatcher: Arc::new(dispatcher),
            middleware: self.middleware,
            exception_handlers: self.exception_handlers,
            server_errors: self.server_errors.debug(self.config.debug),
            config: self.config,
            pipeline: OnceCell::new(),
        })
    }
}

impl Default for JsonRpcServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A complete request-handling pipeline:
///
/// ```text
/// ServerErrorMiddleware → user middleware → ExceptionMiddleware → MethodDispatcher
/// ```
///
/// The pipeline is assembled on first use and reused afterwards. Every call
/// gets a response; notifications never do.
pub struct JsonRpcServer {
    dispatcher: Arc<MethodDispatcher>,
    middleware: MiddlewareStack,
    exception_handlers: ExceptionHandlers,
    server_errors: ServerErrorLayer,
    config: ServerConfig,
    pipeline: OnceCell<Arc<ServerErrorMiddleware>>,
}

impl JsonRpcServer {
    pub fn builder() -> JsonRpcServerBuilder {
        JsonRpcServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &MethodDispatcher {
        &self.dispatcher
    }

    fn guard(&self) -> &Arc<ServerErrorMiddleware> {
        self.pipeline.get_or_init(|| {
            debug!("Assembling middleware pipeline");
            let dispatcher: SharedHandler = self.dispatcher.clone();
            let exceptions: SharedHandler =
                Arc::new(ExceptionLayer::new(self.exception_handlers.clone()).layer(dispatcher));
            let inner = self.middleware.build(exceptions);
            Arc::new(self.server_errors.layer(inner))
        })
    }

    /// The assembled pipeline, for use as an inner stage elsewhere
    pub fn pipeline(&self) -> SharedHandler {
        self.guard().clone()
    }

    /// Handle a request with a fresh context
    pub fn handle(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        self.handle_with_context(request, &mut Context::new())
    }

    /// Handle a request with a caller-prepared context
    pub fn handle_with_context(
        &self,
        request: &JsonRpcRequest,
        context: &mut Context,
    ) -> Option<JsonRpcResponse> {
        self.guard().handle(request, context)
    }

    /// Decode and handle a JSON value. Input the decoder rejects is always
    /// answered, with a `null` id when none could be recovered.
    pub fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        match parse_request_value(value) {
            Ok(request) => self.handle(&request),
            Err(err) => {
                warn!(error = %err, "Rejected malformed request");
                Some(err.into_response())
            }
        }
    }

    /// Decode and handle request text
    pub fn handle_str(&self, json_str: &str) -> Option<JsonRpcResponse> {
        match parse_request(json_str) {
            Ok(request) => self.handle(&request),
            Err(err) => {
                warn!(error = %err, "Rejected malformed request");
                Some(err.into_response())
            }
        }
    }
}

impl JsonRpcHandler for JsonRpcServer {
    fn call(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        Ok(self.handle_with_context(request, context))
    }
}

impl fmt::Debug for JsonRpcServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpcServer")
            .field("methods", &self.dispatcher.method_names())
            .field("middleware", &self.middleware)
            .field("exception_handlers", &self.exception_handlers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestId;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::layer::layer_fn;

    fn add(params: (i64, i64)) -> Result<i64, Fault> {
        Ok(params.0 + params.1)
    }

    struct Counting {
        inner: SharedHandler,
    }

    impl JsonRpcHandler for Counting {
        fn call(&self, request: &JsonRpcRequest, ctx: &mut Context) -> HandlerResult {
            self.inner.call(request, ctx)
        }
    }

    #[test]
    fn test_pipeline_is_built_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let server = JsonRpcServer::builder()
            .register("add", add)
            .middleware(layer_fn(move |inner| {
                counter.fetch_add(1, Ordering::SeqCst);
                Counting { inner }
            }))
            .build()
            .unwrap();

        assert_eq!(built.load(Ordering::SeqCst), 0);
        let request =
            JsonRpcRequest::new_with_array_params(RequestId::Number(1), "add", vec![json!(1), json!(2)]);
        server.handle(&request);
        server.handle(&request);
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_namespace_uses_configured_separator() {
        let mut math = Namespace::new("math");
        math.register("add", add);

        let server = JsonRpcServer::builder()
            .namespace_separator("::")
            .namespace(math)
            .build()
            .unwrap();

        assert_eq!(server.dispatcher().method_names(), vec!["math::add"]);
        let response = server
            .handle_value(json!({"jsonrpc": "2.0", "method": "math::add", "params": [2, 2], "id": "x"}))
            .unwrap();
        assert_eq!(response.result(), Some(&json!(4)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = JsonRpcServer::builder().namespace_separator("").build().unwrap_err();
        assert_eq!(err, ConfigError::EmptySeparator);
    }

    #[test]
    fn test_malformed_input_is_always_answered() {
        let server = JsonRpcServer::builder().register("add", add).build().unwrap();

        let response = server.handle_str("{not json").unwrap();
        assert_eq!(response.id(), None);
        assert_eq!(response.error_object().unwrap().code, -32700);

        let response = server
            .handle_value(json!({"jsonrpc": "2.0", "method": 5}))
            .unwrap();
        assert_eq!(response.error_object().unwrap().code, -32600);
    }

    #[test]
    fn test_caller_context_reaches_methods() {
        let server = JsonRpcServer::builder()
            .register_with_context("whoami", |_: (), ctx: &mut Context| -> Result<Value, Fault> {
                Ok(ctx.get("user").cloned().unwrap_or(Value::Null))
            })
            .build()
            .unwrap();

        let mut ctx = Context::new();
        ctx.insert("user", json!("carol"));
        let request = JsonRpcRequest::new_no_params(RequestId::Number(5), "whoami");
        let response = server.handle_with_context(&request, &mut ctx).unwrap();

        assert_eq!(response.result(), Some(&json!("carol")));
        assert_eq!(ctx.boundary(), Some("server_errors"));
    }
}
