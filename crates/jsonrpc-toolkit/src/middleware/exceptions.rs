//! Exception-to-error translation stage.
//!
//! Faults raised by the inner stage are matched against a registry of
//! handlers, first by protocol code, then by walking the fault's
//! [`ErrorClass`] lineage from most to least specific. A matched fault becomes
//! an error response (or nothing for notifications); an unmatched one is
//! returned unchanged to the enclosing stage.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tower::Layer;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{JsonRpcErrorObject, JsonRpcException};
use crate::fault::{ErrorClass, Fault};
use crate::handler::{HandlerResult, JsonRpcHandler, SharedHandler};
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcResponse;

/// Translates a fault into the error object sent back to the caller
pub type ExceptionHandler =
    Arc<dyn Fn(&JsonRpcRequest, &mut Context, &Fault) -> JsonRpcErrorObject + Send + Sync>;

/// What an exception handler is registered for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    /// A protocol fault carrying exactly this code
    Code(i64),
    /// Any fault whose class is, or descends from, this class
    Class(ErrorClass),
}

impl From<i64> for HandlerKey {
    fn from(code: i64) -> Self {
        HandlerKey::Code(code)
    }
}

impl From<ErrorClass> for HandlerKey {
    fn from(class: ErrorClass) -> Self {
        HandlerKey::Class(class)
    }
}

impl From<&'static str> for HandlerKey {
    fn from(class: &'static str) -> Self {
        HandlerKey::Class(ErrorClass::from_static(class))
    }
}

/// Registry of exception handlers.
///
/// A handler for [`ErrorClass::JSON_RPC`] is registered from the start; it
/// passes protocol faults through with their code, message and data intact.
#[derive(Clone)]
pub struct ExceptionHandlers {
    by_code: HashMap<i64, ExceptionHandler>,
    by_class: HashMap<ErrorClass, ExceptionHandler>,
}

impl ExceptionHandlers {
    pub fn new() -> Self {
        let mut handlers = Self {
            by_code: HashMap::new(),
            by_class: HashMap::new(),
        };
        handlers.add_handler(ErrorClass::JSON_RPC, protocol_error);
        handlers
    }

    /// Register `handler` for `key`, replacing any previous one
    pub fn add_handler<F>(&mut self, key: impl Into<HandlerKey>, handler: F) -> &mut Self
    where
        F: Fn(&JsonRpcRequest, &mut Context, &Fault) -> JsonRpcErrorObject + Send + Sync + 'static,
    {
        self.insert(key.into(), Arc::new(handler));
        self
    }

    pub fn insert(&mut self, key: HandlerKey, handler: ExceptionHandler) {
        match key {
            HandlerKey::Code(code) => {
                self.by_code.insert(code, handler);
            }
            HandlerKey::Class(class) => {
                self.by_class.insert(class, handler);
            }
        }
    }

    /// Resolve the handler for `fault`: code match, then lineage, then none
    pub fn get_handler(&self, fault: &Fault) -> Option<&ExceptionHandler> {
        if let Some(code) = fault.code()
            && let Some(handler) = self.by_code.get(&code)
        {
            return Some(handler);
        }
        fault
            .lineage()
            .iter()
            .find_map(|class| self.by_class.get(class))
    }

    pub fn len(&self) -> usize {
        self.by_code.len() + self.by_class.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ExceptionHandlers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExceptionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<&i64> = self.by_code.keys().collect();
        codes.sort();
        let mut classes: Vec<&ErrorClass> = self.by_class.keys().collect();
        classes.sort();
        f.debug_struct("ExceptionHandlers")
            .field("codes", &codes)
            .field("classes", &classes)
            .finish()
    }
}

/// Identity translation for the library's own protocol faults
fn protocol_error(_request: &JsonRpcRequest, _ctx: &mut Context, fault: &Fault) -> JsonRpcErrorObject {
    match fault.as_protocol() {
        Some(exception) => exception.to_error_object(),
        None => JsonRpcException::internal_error(Some(fault.to_string())).into(),
    }
}

/// Stage that turns matched faults from its inner stage into error responses
#[derive(Clone)]
pub struct ExceptionMiddleware {
    inner: SharedHandler,
    handlers: Arc<ExceptionHandlers>,
}

impl ExceptionMiddleware {
    pub fn new(inner: SharedHandler, handlers: Arc<ExceptionHandlers>) -> Self {
        Self { inner, handlers }
    }

    pub fn handlers(&self) -> &ExceptionHandlers {
        &self.handlers
    }

    fn translate(&self, request: &JsonRpcRequest, context: &mut Context, fault: Fault) -> HandlerResult {
        let Some(handler) = self.handlers.get_handler(&fault) else {
            debug!(method = %request.method, error = %fault, "No exception handler matched");
            return Err(fault);
        };

        let error = handler(request, context, &fault);

        if request.is_notification() {
            warn!(
                method = %request.method,
                code = error.code,
                error = %fault,
                "Notification failed, no response sent"
            );
            return Ok(None);
        }

        Ok(Some(JsonRpcResponse::error(request.id.clone(), error)))
    }
}

impl JsonRpcHandler for ExceptionMiddleware {
    fn call(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        match self.inner.call(request, context) {
            Err(fault) => self.translate(request, context, fault),
            outcome => outcome,
        }
    }
}

/// Constructor for [`ExceptionMiddleware`] stages sharing one registry
#[derive(Clone, Default)]
pub struct ExceptionLayer {
    handlers: Arc<ExceptionHandlers>,
}

impl ExceptionLayer {
    pub fn new(handlers: ExceptionHandlers) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }
}

impl Layer<SharedHandler> for ExceptionLayer {
    type Service = ExceptionMiddleware;

    fn layer(&self, inner: SharedHandler) -> Self::Service {
        ExceptionMiddleware::new(inner, Arc::clone(&self.handlers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::MethodDispatcher;
    use crate::fault::{ApplicationError, Classified};
    use crate::types::RequestId;
    use serde_json::json;
    use tracing_test::traced_test;

    #[derive(Debug, thiserror::Error)]
    #[error("insufficient funds: {0}")]
    struct InsufficientFunds(u64);

    impl Classified for InsufficientFunds {
        fn class(&self) -> ErrorClass {
            ErrorClass::from_static("bank.funds.insufficient")
        }
    }

    fn withdraw(params: (u64,)) -> Result<u64, InsufficientFunds> {
        Err(InsufficientFunds(params.0))
    }

    fn stage(handlers: ExceptionHandlers) -> ExceptionMiddleware {
        let mut dispatcher = MethodDispatcher::new();
        dispatcher.register("withdraw", withdraw);
        ExceptionLayer::new(handlers).layer(Arc::new(dispatcher))
    }

    fn call(id: i64, method: &str) -> JsonRpcRequest {
        JsonRpcRequest::new(RequestId::Number(id), method, Some(vec![json!(10)].into()))
    }

    fn fixed(
        code: i64,
        message: &'static str,
    ) -> impl Fn(&JsonRpcRequest, &mut Context, &Fault) -> JsonRpcErrorObject + Send + Sync + 'static {
        move |_, _, _| JsonRpcErrorObject::new(code, message, None)
    }

    #[test]
    fn test_default_handler_passes_protocol_faults_through() {
        let middleware = stage(ExceptionHandlers::new());
        let response = middleware
            .call(&call(7, "ghost"), &mut Context::new())
            .unwrap()
            .unwrap();

        assert_eq!(response.id(), Some(&RequestId::Number(7)));
        let error = response.error_object().unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "Method 'ghost' not found.");
    }

    #[test]
    fn test_exact_class_handler() {
        let mut handlers = ExceptionHandlers::new();
        handlers.add_handler("bank.funds.insufficient", fixed(-32001, "exact"));
        handlers.add_handler("bank", fixed(-32002, "base"));

        let response = stage(handlers)
            .call(&call(1, "withdraw"), &mut Context::new())
            .unwrap()
            .unwrap();
        assert_eq!(response.error_object().unwrap().message, "exact");
    }

    #[test]
    fn test_superclass_handler() {
        let mut handlers = ExceptionHandlers::new();
        handlers.add_handler("bank", fixed(-32002, "base"));

        let response = stage(handlers)
            .call(&call(1, "withdraw"), &mut Context::new())
            .unwrap()
            .unwrap();
        assert_eq!(response.error_object().unwrap().code, -32002);
    }

    #[test]
    fn test_handler_sees_fault_details() {
        let mut handlers = ExceptionHandlers::new();
        handlers.add_handler("bank.funds", |_: &JsonRpcRequest, _: &mut Context, fault: &Fault| {
            let amount = match fault {
                Fault::Application(error) => error
                    .downcast_ref::<InsufficientFunds>()
                    .map(|funds| funds.0),
                _ => None,
            };
            JsonRpcErrorObject::new(-32010, fault.to_string(), Some(json!({ "amount": amount })))
        });

        let response = stage(handlers)
            .call(&call(1, "withdraw"), &mut Context::new())
            .unwrap()
            .unwrap();
        let error = response.error_object().unwrap();
        assert_eq!(error.message, "insufficient funds: 10");
        assert_eq!(error.data, Some(json!({"amount": 10})));
    }

    #[test]
    fn test_unmatched_fault_is_returned() {
        let fault = stage(ExceptionHandlers::new())
            .call(&call(1, "withdraw"), &mut Context::new())
            .unwrap_err();
        assert_eq!(fault.class(), Some(ErrorClass::from_static("bank.funds.insufficient")));
    }

    #[test]
    fn test_code_handler_wins_over_class_handler() {
        let mut handlers = ExceptionHandlers::new();
        handlers.add_handler(-32601, fixed(-32601, "by code"));
        handlers.add_handler(ErrorClass::METHOD_NOT_FOUND, fixed(-32601, "by class"));

        let response = stage(handlers)
            .call(&call(1, "ghost"), &mut Context::new())
            .unwrap()
            .unwrap();
        assert_eq!(response.error_object().unwrap().message, "by code");
    }

    #[test]
    fn test_get_handler_ignores_panics() {
        let handlers = ExceptionHandlers::new();
        assert!(handlers.get_handler(&Fault::Panic("boom".into())).is_none());
        assert!(
            handlers
                .get_handler(&Fault::from(ApplicationError::msg("app", "nope")))
                .is_none()
        );
    }

    #[traced_test]
    #[test]
    fn test_notification_failure_is_swallowed_and_logged() {
        let mut handlers = ExceptionHandlers::new();
        handlers.add_handler("bank", fixed(-32002, "base"));

        let request = JsonRpcRequest::notification("withdraw", Some(vec![json!(5)].into()));
        let outcome = stage(handlers).call(&request, &mut Context::new()).unwrap();

        assert!(outcome.is_none());
        assert!(logs_contain("Notification failed, no response sent"));
    }
}
