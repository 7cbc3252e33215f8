//! Built-in middleware stages
//!
//! - **Tracing**: wraps each request in a `jsonrpc.request` span and logs the outcome
//! - **Parameter validation**: per-method checks run ahead of the dispatcher
//!
//! # Examples
//!
//! ```rust
//! use jsonrpc_toolkit::middleware::builtins::{ParamsValidationLayer, TracingLayer};
//! use jsonrpc_toolkit::prelude::*;
//!
//! let validation = ParamsValidationLayer::new().validator("divide", |request: &JsonRpcRequest| {
//!     match request.get_param_index(1).and_then(|d| d.as_i64()) {
//!         Some(0) => Err("divisor must not be zero".to_string()),
//!         _ => Ok(()),
//!     }
//! });
//!
//! let server = JsonRpcServer::builder()
//!     .middleware(TracingLayer::new())
//!     .middleware(validation)
//!     .build()
//!     .expect("default configuration is valid");
//! # let _ = server;
//! ```

mod logging;
mod validation;

pub use logging::{TracingLayer, TracingMiddleware};
pub use validation::{ParamsValidationLayer, ParamsValidationMiddleware, ParamsValidator};
