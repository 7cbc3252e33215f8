//! # JSON-RPC Toolkit Prelude
//!
//! Convenient re-exports of the types needed to register methods and run a
//! server.
//!
//! ```rust
//! use jsonrpc_toolkit::prelude::*;
//! ```

// Message model
pub use crate::error::{JsonRpcErrorCode, JsonRpcErrorObject, JsonRpcException};
pub use crate::request::{JsonRpcRequest, RequestParams};
pub use crate::response::{JsonRpcResponse, ResponsePayload};
pub use crate::types::{JsonRpcVersion, RequestId};

// Methods and dispatch
pub use crate::context::Context;
pub use crate::dispatcher::{MethodDispatcher, Namespace};
pub use crate::fault::{ApplicationError, Classified, ErrorClass, Fault};
pub use crate::handler::{HandlerResult, JsonRpcHandler, SharedHandler, handler_fn};
pub use crate::method;
pub use crate::method::Method;

// Pipeline
pub use crate::config::{ConfigError, ServerConfig};
pub use crate::middleware::{ExceptionHandlers, HandlerKey, MiddlewareStack};
pub use crate::server::{JsonRpcServer, JsonRpcServerBuilder};

// Standard error codes
pub use crate::error_codes::*;
