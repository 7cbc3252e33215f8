//! A single named callable bound to a parameter contract

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::Context;
use crate::error::JsonRpcException;
use crate::fault::Fault;
use crate::handler::{HandlerResult, JsonRpcHandler};
use crate::params::{Signature, bind_params};
use crate::request::{JsonRpcRequest, RequestParams};
use crate::response::JsonRpcResponse;

type Invoke = dyn Fn(Option<&RequestParams>, &mut Context) -> Result<Value, Fault> + Send + Sync;

/// A named handler whose parameters are bound from the request before it runs.
///
/// The contract is derived from the argument type `P`: a struct for named
/// parameters, a tuple for positional ones, `()` for none.
///
/// ```rust
/// use jsonrpc_toolkit::{Context, Fault, JsonRpcRequest, Method, RequestId};
/// use serde_json::json;
///
/// fn add(params: (i64, i64)) -> Result<i64, Fault> {
///     Ok(params.0 + params.1)
/// }
///
/// let method = Method::new("add", add);
/// let request = JsonRpcRequest::new(RequestId::Number(1), "add", Some(vec![json!(2), json!(3)].into()));
/// let response = method.handle(&request, &mut Context::new()).unwrap().unwrap();
/// assert_eq!(response.result(), Some(&json!(5)));
/// ```
#[derive(Clone)]
pub struct Method {
    name: String,
    signature: Signature,
    invoke: Arc<Invoke>,
}

impl Method {
    /// Method from a function of its arguments alone
    pub fn new<F, P, R, E>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(P) -> Result<R, E> + Send + Sync + 'static,
        P: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
        E: Into<Fault> + 'static,
    {
        Self::with_context(name, move |params: P, _ctx: &mut Context| f(params))
    }

    /// Method from a function that also receives the per-call context
    pub fn with_context<F, P, R, E>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(P, &mut Context) -> Result<R, E> + Send + Sync + 'static,
        P: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
        E: Into<Fault> + 'static,
    {
        let signature = Signature::of::<P>();
        let contract = signature.clone();
        let invoke = move |params: Option<&RequestParams>, ctx: &mut Context| -> Result<Value, Fault> {
            let args: P = bind_params(&contract, params)?;
            let result = f(args, ctx).map_err(Into::<Fault>::into)?;
            serde_json::to_value(result).map_err(|e| {
                Fault::Protocol(JsonRpcException::internal_error(Some(format!(
                    "Failed to serialize result: {}",
                    e
                ))))
            })
        };

        Self {
            name: name.into(),
            signature,
            invoke: Arc::new(invoke),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Same callable under another name
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Bind and run. Protocol and business faults propagate to the caller.
    pub fn call(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        if request.method != self.name {
            return Err(Fault::method_not_found(&request.method));
        }

        let result = (self.invoke)(request.params.as_ref(), context)?;

        Ok(request
            .id
            .clone()
            .map(|id| JsonRpcResponse::success(id, result)))
    }

    /// Run as a standalone boundary: protocol faults become error responses
    /// (nothing for notifications), other faults still propagate.
    pub fn handle(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        context.claim_boundary("method");
        match self.call(request, context) {
            Err(Fault::Protocol(exception)) => Ok(error_response(request, exception)),
            other => other,
        }
    }
}

impl JsonRpcHandler for Method {
    fn call(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        Method::call(self, request, context)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Error response for `request`, or nothing when it is a notification
pub(crate) fn error_response(
    request: &JsonRpcRequest,
    error: impl Into<crate::error::JsonRpcErrorObject>,
) -> Option<JsonRpcResponse> {
    if request.is_notification() {
        return None;
    }
    Some(JsonRpcResponse::error(request.id.clone(), error.into()))
}
