//! Parameter validation ahead of the dispatcher

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tower::Layer;
use tracing::debug;

use crate::context::Context;
use crate::fault::Fault;
use crate::handler::{HandlerResult, JsonRpcHandler, SharedHandler};
use crate::request::JsonRpcRequest;

/// Check run against a request before it reaches its method. `Err` carries
/// the message of the resulting `InvalidParams` fault.
pub type ParamsValidator = Arc<dyn Fn(&JsonRpcRequest) -> Result<(), String> + Send + Sync>;

/// Raises `InvalidParams` when a method's validator rejects the request.
/// Methods without a validator pass straight through.
pub struct ParamsValidationMiddleware {
    inner: SharedHandler,
    validators: Arc<HashMap<String, ParamsValidator>>,
}

impl JsonRpcHandler for ParamsValidationMiddleware {
    fn call(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        if let Some(validate) = self.validators.get(&request.method)
            && let Err(message) = validate(request)
        {
            debug!(method = %request.method, %message, "Parameters rejected");
            return Err(Fault::invalid_params(message));
        }
        self.inner.call(request, context)
    }
}

/// Constructor for [`ParamsValidationMiddleware`]
#[derive(Clone, Default)]
pub struct ParamsValidationLayer {
    validators: HashMap<String, ParamsValidator>,
}

impl ParamsValidationLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate requests for `method` with `validator`
    pub fn validator<F>(mut self, method: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&JsonRpcRequest) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators.insert(method.into(), Arc::new(validator));
        self
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl fmt::Debug for ParamsValidationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&String> = self.validators.keys().collect();
        methods.sort();
        f.debug_struct("ParamsValidationLayer")
            .field("methods", &methods)
            .finish()
    }
}

impl Layer<SharedHandler> for ParamsValidationLayer {
    type Service = ParamsValidationMiddleware;

    fn layer(&self, inner: SharedHandler) -> Self::Service {
        ParamsValidationMiddleware {
            inner,
            validators: Arc::new(self.validators.clone()),
        }
    }
}
