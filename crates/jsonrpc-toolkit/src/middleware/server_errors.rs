//! Outermost guard that turns every escaping fault into an error response

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::json;
use tower::Layer;
use tracing::{error, warn};

use crate::context::Context;
use crate::error::{JsonRpcErrorCode, JsonRpcErrorObject};
use crate::fault::Fault;
use crate::handler::{HandlerResult, JsonRpcHandler, SharedHandler};
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcResponse;

/// Builds the error object for a fault nothing else handled
pub type ServerErrorHandler =
    Arc<dyn Fn(&JsonRpcRequest, &mut Context, &Fault) -> JsonRpcErrorObject + Send + Sync>;

const BOUNDARY: &str = "server_errors";
const GENERIC_MESSAGE: &str = "Internal Server Error";

/// Last-resort stage around the whole pipeline.
///
/// Faults and panics from the inner stage are converted according to one of
/// three policies, checked in this order:
///
/// 1. debug mode: `INTERNAL_ERROR` with the fault text as message and the
///    error chain plus backtrace in `data.debug.traceback`;
/// 2. a custom handler, given the request, context and fault;
/// 3. otherwise a fixed `{INTERNAL_ERROR, "Internal Server Error"}` that
///    exposes nothing about the failure.
#[derive(Clone)]
pub struct ServerErrorMiddleware {
    inner: SharedHandler,
    handler: Option<ServerErrorHandler>,
    debug: bool,
}

impl ServerErrorMiddleware {
    pub fn new(inner: SharedHandler) -> Self {
        Self {
            inner,
            handler: None,
            debug: false,
        }
    }

    pub fn with_handler(mut self, handler: ServerErrorHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Run the inner pipeline. Never fails: every fault is answered, or
    /// dropped for notifications.
    pub fn handle(&self, request: &JsonRpcRequest, context: &mut Context) -> Option<JsonRpcResponse> {
        context.claim_boundary(BOUNDARY);

        let outcome = catch_unwind(AssertUnwindSafe(|| self.inner.call(request, context)))
            .unwrap_or_else(|payload| Err(Fault::Panic(panic_message(payload.as_ref()))));

        let fault = match outcome {
            Ok(response) => return response,
            Err(fault) => fault,
        };

        error!(method = %request.method, id = ?request.id, error = %fault, "Uncaught fault");

        let error = self.error_object(request, context, &fault);
        if request.is_notification() {
            warn!(method = %request.method, "Dropping error for notification");
            return None;
        }
        Some(JsonRpcResponse::error(request.id.clone(), error))
    }

    fn error_object(&self, request: &JsonRpcRequest, context: &mut Context, fault: &Fault) -> JsonRpcErrorObject {
        if self.debug {
            return JsonRpcErrorObject::new(
                JsonRpcErrorCode::InternalError.code(),
                fault.to_string(),
                Some(json!({ "debug": { "traceback": fault.traceback() } })),
            );
        }

        if let Some(handler) = &self.handler {
            // A panicking handler must not escape the guard either
            return catch_unwind(AssertUnwindSafe(|| handler(request, context, fault)))
                .unwrap_or_else(|payload| {
                    error!(
                        method = %request.method,
                        panic = %panic_message(payload.as_ref()),
                        "Server error handler panicked"
                    );
                    generic_error()
                });
        }

        generic_error()
    }
}

impl JsonRpcHandler for ServerErrorMiddleware {
    fn call(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        Ok(self.handle(request, context))
    }
}

impl fmt::Debug for ServerErrorMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerErrorMiddleware")
            .field("custom_handler", &self.handler.is_some())
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

fn generic_error() -> JsonRpcErrorObject {
    JsonRpcErrorObject::new(JsonRpcErrorCode::InternalError.code(), GENERIC_MESSAGE, None)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Constructor for [`ServerErrorMiddleware`]
#[derive(Clone, Default)]
pub struct ServerErrorLayer {
    handler: Option<ServerErrorHandler>,
    debug: bool,
}

impl ServerErrorLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&JsonRpcRequest, &mut Context, &Fault) -> JsonRpcErrorObject + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn shared_handler(mut self, handler: Option<ServerErrorHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Layer<SharedHandler> for ServerErrorLayer {
    type Service = ServerErrorMiddleware;

    fn layer(&self, inner: SharedHandler) -> Self::Service {
        ServerErrorMiddleware {
            inner,
            handler: self.handler.clone(),
            debug: self.debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::ApplicationError;
    use crate::handler::handler_fn;
    use crate::types::RequestId;
    use tracing_test::traced_test;

    fn failing() -> SharedHandler {
        Arc::new(handler_fn(|_: &JsonRpcRequest, _: &mut Context| -> HandlerResult {
            Err(ApplicationError::msg("ledger.locked", "ledger is locked").into())
        }))
    }

    fn panicking() -> SharedHandler {
        Arc::new(handler_fn(|_: &JsonRpcRequest, _: &mut Context| -> HandlerResult {
            panic!("handler exploded")
        }))
    }

    fn request() -> JsonRpcRequest {
        JsonRpcRequest::new_no_params(RequestId::Number(9), "post")
    }

    #[test]
    fn test_default_policy_hides_details() {
        let guard = ServerErrorLayer::new().layer(failing());
        let response = guard.handle(&request(), &mut Context::new()).unwrap();

        assert_eq!(response.id(), Some(&RequestId::Number(9)));
        let error = response.error_object().unwrap();
        assert_eq!(error.code, -32603);
        assert_eq!(error.message, "Internal Server Error");
        assert_eq!(error.data, None);
    }

    #[test]
    fn test_debug_policy_includes_traceback() {
        let guard = ServerErrorLayer::new().debug(true).layer(failing());
        let response = guard.handle(&request(), &mut Context::new()).unwrap();

        let error = response.error_object().unwrap();
        assert_eq!(error.code, -32603);
        assert_eq!(error.message, "ledger is locked");
        let traceback = error.data.as_ref().unwrap()["debug"]["traceback"].as_str().unwrap();
        assert!(traceback.contains("ledger is locked"));
    }

    #[test]
    fn test_custom_handler_receives_fault() {
        let guard = ServerErrorLayer::new()
            .handler(|request: &JsonRpcRequest, ctx: &mut Context, fault: &Fault| {
                ctx.insert("handled", json!(true));
                JsonRpcErrorObject::new(-32050, format!("{}: {}", request.method, fault), None)
            })
            .layer(failing());

        let mut ctx = Context::new();
        let response = guard.handle(&request(), &mut ctx).unwrap();
        assert_eq!(response.error_object().unwrap().code, -32050);
        assert_eq!(response.error_object().unwrap().message, "post: ledger is locked");
        assert_eq!(ctx.get("handled"), Some(&json!(true)));
    }

    #[test]
    fn test_panics_are_contained() {
        let guard = ServerErrorLayer::new().debug(true).layer(panicking());
        let response = guard.handle(&request(), &mut Context::new()).unwrap();

        let error = response.error_object().unwrap();
        assert_eq!(error.code, -32603);
        assert_eq!(error.message, "panic: handler exploded");
    }

    #[test]
    fn test_guard_owns_boundary() {
        let guard = ServerErrorLayer::new().layer(failing());
        let mut ctx = Context::new();
        guard.handle(&request(), &mut ctx);
        assert_eq!(ctx.boundary(), Some("server_errors"));
    }

    #[traced_test]
    #[test]
    fn test_notification_is_silent_but_logged() {
        let guard = ServerErrorLayer::new().layer(failing());
        let notification = JsonRpcRequest::notification("post", None);

        assert!(guard.handle(&notification, &mut Context::new()).is_none());
        assert!(logs_contain("Uncaught fault"));
    }
}
