//! The stage contract shared by methods, the dispatcher, middleware and
//! assembled pipelines.

use std::sync::Arc;

use crate::context::Context;
use crate::fault::Fault;
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcResponse;

/// Outcome of a stage: a response, no response (notification), or a fault
/// for an outer stage to translate.
pub type HandlerResult = Result<Option<JsonRpcResponse>, Fault>;

/// A callable from request and context to response-or-nothing.
///
/// Stages never convert faults they do not own; they return them so that the
/// enclosing stage can decide.
pub trait JsonRpcHandler: Send + Sync {
    fn call(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult;
}

/// Type-erased, shareable stage
pub type SharedHandler = Arc<dyn JsonRpcHandler>;

/// Stage built from a closure, see [`handler_fn`]
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Turn a closure into a stage.
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&JsonRpcRequest, &mut Context) -> HandlerResult + Send + Sync,
{
    HandlerFn { f }
}

impl<F> JsonRpcHandler for HandlerFn<F>
where
    F: Fn(&JsonRpcRequest, &mut Context) -> HandlerResult + Send + Sync,
{
    fn call(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        (self.f)(request, context)
    }
}

impl<H: JsonRpcHandler + ?Sized> JsonRpcHandler for Arc<H> {
    fn call(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        (**self).call(request, context)
    }
}

impl<H: JsonRpcHandler + ?Sized> JsonRpcHandler for Box<H> {
    fn call(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        (**self).call(request, context)
    }
}
