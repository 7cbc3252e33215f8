//! # JSON-RPC 2.0 Toolkit
//!
//! A transport-agnostic JSON-RPC 2.0 message model and dispatch engine.
//! The crate takes a decoded request plus a per-call [`Context`], routes it to a
//! registered [`Method`] and hands back a response, or nothing for notifications.
//!
//! ## Features
//! - Immutable request/response envelopes validated at construction time
//! - Parameter binding derived from the handler's argument type
//! - Exception-to-error translation keyed by code or [`ErrorClass`] lineage
//! - Ordered middleware pipeline with a total server-error guard at the edge
//!
//! ```rust
//! use jsonrpc_toolkit::prelude::*;
//! use serde_json::json;
//!
//! fn add(params: (i64, i64)) -> Result<i64, Fault> {
//!     Ok(params.0 + params.1)
//! }
//!
//! let server = JsonRpcServer::builder()
//!     .method(method!(add))
//!     .build()
//!     .expect("default configuration is valid");
//!
//! let request = JsonRpcRequest::new(RequestId::Number(1), "add", Some(vec![json!(2), json!(3)].into()));
//! let response = server.handle(&request).unwrap();
//! assert_eq!(response.result(), Some(&json!(5)));
//! ```

pub mod config;
pub mod context;
pub mod decode;
pub mod dispatcher;
pub mod error;
pub mod fault;
pub mod handler;
pub mod method;
pub mod middleware;
pub mod params;
pub mod prelude;
pub mod request;
pub mod response;
pub mod server;
pub mod types;

// Re-export main types
pub use config::{ConfigError, ServerConfig};
pub use context::Context;
pub use decode::{DecodeError, parse_request, parse_request_value};
pub use dispatcher::{MethodDispatcher, Namespace};
pub use error::{JsonRpcErrorCode, JsonRpcErrorObject, JsonRpcException};
pub use fault::{ApplicationError, Classified, ErrorClass, Fault};
pub use handler::{HandlerFn, HandlerResult, JsonRpcHandler, SharedHandler, handler_fn};
pub use method::Method;
pub use params::Signature;
pub use request::{JsonRpcRequest, RequestParams};
pub use response::{JsonRpcResponse, ResponseError, ResponsePayload};
pub use server::{JsonRpcServer, JsonRpcServerBuilder};
pub use types::{JsonRpcVersion, RequestId};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Server error range: -32099 to -32000
    pub const SERVER_ERROR_START: i64 = -32099;
    pub const SERVER_ERROR_END: i64 = -32000;
}

/// Build a [`Method`] from a function, naming it after the function itself.
///
/// `method!(add)` registers `add` under `"add"`; `method!("math.sum", add)`
/// picks an explicit name. Use `method!(ctx add)` for handlers that also
/// take `&mut Context`.
#[macro_export]
macro_rules! method {
    (ctx $func:ident) => {
        $crate::Method::with_context(stringify!($func), $func)
    };
    ($func:ident) => {
        $crate::Method::new(stringify!($func), $func)
    };
    ($name:expr, $func:expr) => {
        $crate::Method::new($name, $func)
    };
}
