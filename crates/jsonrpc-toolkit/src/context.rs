//! Per-call context threaded through every pipeline stage

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Mutable state for a single request.
///
/// A fresh context is created for every incoming request and dropped once the
/// response is produced. Stages and methods use it to pass values along the
/// chain (authenticated user, timings, request-scoped flags).
///
/// # Examples
///
/// ```rust
/// use jsonrpc_toolkit::Context;
/// use serde_json::json;
///
/// let mut ctx = Context::new();
/// ctx.insert("user", json!("alice"));
///
/// assert_eq!(ctx.get("user"), Some(&json!("alice")));
/// assert_eq!(ctx.get_typed::<String>("user").as_deref(), Some("alice"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: Map<String, Value>,

    /// Stage that converts escaping faults into responses for this call
    boundary: Option<&'static str>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a value deserialized into `T`; `None` if absent or of another shape
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.values.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Record `stage` as the boundary for this call unless an outer stage
    /// already did. Returns true if `stage` owns the boundary afterwards.
    pub fn claim_boundary(&mut self, stage: &'static str) -> bool {
        *self.boundary.get_or_insert(stage) == stage
    }

    /// Name of the stage that owns fault conversion, once claimed
    pub fn boundary(&self) -> Option<&'static str> {
        self.boundary
    }
}
