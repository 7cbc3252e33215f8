//! Method lookup and routing

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::context::Context;
use crate::fault::Fault;
use crate::handler::{HandlerResult, JsonRpcHandler};
use crate::method::{Method, error_response};
use crate::request::JsonRpcRequest;

/// Default separator between a namespace and its method names
pub const DEFAULT_NAMESPACE_SEPARATOR: &str = ".";

/// Routes requests to registered [`Method`]s by name.
///
/// Registration happens while the dispatcher is being set up (`&mut self`);
/// once it is shared into a pipeline the method table is only read.
#[derive(Debug, Clone)]
pub struct MethodDispatcher {
    methods: HashMap<String, Method>,
    separator: String,
}

impl MethodDispatcher {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
            separator: DEFAULT_NAMESPACE_SEPARATOR.to_string(),
        }
    }

    pub fn from_methods(methods: impl IntoIterator<Item = Method>) -> Self {
        let mut dispatcher = Self::new();
        for method in methods {
            dispatcher.add_method(method);
        }
        dispatcher
    }

    /// Separator used when mounting namespaces
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Register a function under `name`; an existing entry is replaced
    pub fn register<F, P, R, E>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(P) -> Result<R, E> + Send + Sync + 'static,
        P: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
        E: Into<Fault> + 'static,
    {
        self.add_method(Method::new(name, f))
    }

    /// Register a context-aware function under `name`
    pub fn register_with_context<F, P, R, E>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(P, &mut Context) -> Result<R, E> + Send + Sync + 'static,
        P: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
        E: Into<Fault> + 'static,
    {
        self.add_method(Method::with_context(name, f))
    }

    /// Add a prepared method under its own name
    pub fn add_method(&mut self, method: Method) -> &mut Self {
        if self.methods.contains_key(method.name()) {
            debug!(method = method.name(), "Replacing registered method");
        }
        self.methods.insert(method.name().to_string(), method);
        self
    }

    /// Merge a namespace, prefixing each of its methods with the namespace name
    pub fn mount(&mut self, namespace: Namespace) -> &mut Self {
        for method in namespace.into_methods(&self.separator) {
            self.add_method(method);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered method names, sorted
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Route `request` to its method. Lookup and binding failures are raised,
    /// not answered; an enclosing stage turns them into responses.
    pub fn dispatch(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        let Some(method) = self.methods.get(&request.method) else {
            debug!(method = %request.method, "Method not found");
            return Err(Fault::method_not_found(&request.method));
        };

        debug!(
            method = %request.method,
            notification = request.is_notification(),
            "Dispatching request"
        );
        method.call(request, context)
    }

    /// Dispatch as a standalone boundary: protocol faults become error
    /// responses (nothing for notifications), other faults propagate.
    pub fn handle(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        context.claim_boundary("dispatcher");
        match self.dispatch(request, context) {
            Err(Fault::Protocol(exception)) => Ok(error_response(request, exception)),
            other => other,
        }
    }
}

impl Default for MethodDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonRpcHandler for MethodDispatcher {
    fn call(&self, request: &JsonRpcRequest, context: &mut Context) -> HandlerResult {
        self.dispatch(request, context)
    }
}

/// A named group of methods, mounted into a dispatcher as
/// `namespace + separator + method`.
///
/// ```rust
/// use jsonrpc_toolkit::{Fault, MethodDispatcher, Namespace};
///
/// let mut math = Namespace::new("math");
/// math.register("add", |(a, b): (i64, i64)| Ok::<_, Fault>(a + b));
///
/// let mut dispatcher = MethodDispatcher::new();
/// dispatcher.mount(math);
/// assert!(dispatcher.contains("math.add"));
/// ```
#[derive(Debug, Clone)]
pub struct Namespace {
    name: String,
    methods: Vec<Method>,
    children: Vec<Namespace>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register<F, P, R, E>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(P) -> Result<R, E> + Send + Sync + 'static,
        P: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
        E: Into<Fault> + 'static,
    {
        self.add_method(Method::new(name, f))
    }

    pub fn register_with_context<F, P, R, E>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(P, &mut Context) -> Result<R, E> + Send + Sync + 'static,
        P: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
        E: Into<Fault> + 'static,
    {
        self.add_method(Method::with_context(name, f))
    }

    pub fn add_method(&mut self, method: Method) -> &mut Self {
        self.methods.push(method);
        self
    }

    /// Nest another namespace below this one
    pub fn nest(&mut self, namespace: Namespace) -> &mut Self {
        self.children.push(namespace);
        self
    }

    /// Methods renamed to their fully qualified names
    pub fn into_methods(self, separator: &str) -> Vec<Method> {
        let prefix = format!("{}{}", self.name, separator);
        let mut methods: Vec<Method> = self
            .methods
            .into_iter()
            .map(|method| {
                let qualified = format!("{}{}", prefix, method.name());
                method.renamed(qualified)
            })
            .collect();
        for child in self.children {
            methods.extend(
                child
                    .into_methods(separator)
                    .into_iter()
                    .map(|method| {
                        let qualified = format!("{}{}", prefix, method.name());
                        method.renamed(qualified)
                    }),
            );
        }
        methods
    }
}
