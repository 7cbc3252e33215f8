//! Request tracing stage

use std::time::Instant;

use tower::Layer;
use tracing::{debug, debug_span};

use crate::context::Context;
use crate::handler::{HandlerResult, JsonRpcHandler, SharedHandler};
use crate::request::JsonRpcRequest;

/// Runs the inner stage inside a `jsonrpc.request` span and logs how the
/// request ended, with its duration.
pub struct TracingMiddleware {
    inner: SharedHandler,
}

impl JsonRpcHandler for TracingMiddleware {
    fn call(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        let span = debug_span!(
            "jsonrpc.request",
            method = %request.method,
            id = ?request.id,
            notification = request.is_notification()
        );
        let _entered = span.enter();

        let started = Instant::now();
        let outcome = self.inner.call(request, context);
        let elapsed_us = started.elapsed().as_micros() as u64;

        match &outcome {
            Ok(Some(response)) => match response.error_object() {
                Some(error) => debug!(elapsed_us, code = error.code, "Request answered with error"),
                None => debug!(elapsed_us, "Request succeeded"),
            },
            Ok(None) => debug!(elapsed_us, "Request completed without response"),
            Err(fault) => debug!(elapsed_us, error = %fault, "Request raised a fault"),
        }

        outcome
    }
}

/// Constructor for [`TracingMiddleware`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl Layer<SharedHandler> for TracingLayer {
    type Service = TracingMiddleware;

    fn layer(&self, inner: SharedHandler) -> Self::Service {
        TracingMiddleware { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::MethodDispatcher;
    use crate::fault::Fault;
    use crate::types::RequestId;
    use serde_json::json;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn traced() -> TracingMiddleware {
        let mut dispatcher = MethodDispatcher::new();
        dispatcher.register("ping", |_: ()| Ok::<_, Fault>("pong"));
        TracingLayer::new().layer(Arc::new(dispatcher))
    }

    #[traced_test]
    #[test]
    fn test_success_is_logged() {
        let request = JsonRpcRequest::new_no_params(RequestId::Number(1), "ping");
        let response = traced().call(&request, &mut Context::new()).unwrap().unwrap();

        assert_eq!(response.result(), Some(&json!("pong")));
        assert!(logs_contain("Request succeeded"));
        assert!(logs_contain("jsonrpc.request"));
    }

    #[traced_test]
    #[test]
    fn test_fault_passes_through_and_is_logged() {
        let request = JsonRpcRequest::new_no_params(RequestId::Number(2), "missing");
        let fault = traced().call(&request, &mut Context::new()).unwrap_err();

        assert_eq!(fault.code(), Some(-32601));
        assert!(logs_contain("Request raised a fault"));
    }
}
