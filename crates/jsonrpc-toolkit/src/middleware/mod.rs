//! Middleware pipeline for JSON-RPC servers
//!
//! Every stage is a [`JsonRpcHandler`](crate::JsonRpcHandler) that wraps the
//! next inner handler. Stage constructors are [`tower::Layer`]s over
//! [`SharedHandler`](crate::SharedHandler), collected in a [`MiddlewareStack`]
//! and folded around the dispatcher:
//!
//! ```text
//! ServerErrorMiddleware → user layers → ExceptionMiddleware → MethodDispatcher
//! ```
//!
//! - [`ServerErrorMiddleware`] - Outermost guard, answers every escaping fault
//! - [`ExceptionMiddleware`] - Translates registered faults into error responses
//! - [`MiddlewareStack`] - Ordered composition of stage constructors
//! - [`builtins`] - Ready-made tracing and parameter validation stages

pub mod builtins;
pub mod exceptions;
pub mod server_errors;
pub mod stack;

pub use exceptions::{ExceptionHandler, ExceptionHandlers, ExceptionLayer, ExceptionMiddleware, HandlerKey};
pub use server_errors::{ServerErrorHandler, ServerErrorLayer, ServerErrorMiddleware};
pub use stack::{BoxLayer, MiddlewareStack};
