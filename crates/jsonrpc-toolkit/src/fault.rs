//! Failures raised while a request travels through the pipeline.
//!
//! A [`Fault`] is either a protocol exception with a numeric code, an
//! application error tagged with an [`ErrorClass`], or a panic that the
//! server-error guard caught on its way out. Exception handlers are resolved
//! against the class lineage, most specific first.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

use crate::error::{JsonRpcErrorCode, JsonRpcException};

/// A hierarchical error discriminant written as a dotted path.
///
/// `"storage.not_found"` is a subclass of `"storage"`. The empty root that
/// every class descends from never takes part in handler resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorClass(Cow<'static, str>);

impl ErrorClass {
    /// Class of every [`JsonRpcException`].
    pub const JSON_RPC: ErrorClass = ErrorClass(Cow::Borrowed("jsonrpc"));
    pub const PARSE_ERROR: ErrorClass = ErrorClass(Cow::Borrowed("jsonrpc.parse_error"));
    pub const INVALID_REQUEST: ErrorClass = ErrorClass(Cow::Borrowed("jsonrpc.invalid_request"));
    pub const METHOD_NOT_FOUND: ErrorClass = ErrorClass(Cow::Borrowed("jsonrpc.method_not_found"));
    pub const INVALID_PARAMS: ErrorClass = ErrorClass(Cow::Borrowed("jsonrpc.invalid_params"));
    pub const INTERNAL_ERROR: ErrorClass = ErrorClass(Cow::Borrowed("jsonrpc.internal_error"));

    pub const fn from_static(path: &'static str) -> Self {
        ErrorClass(Cow::Borrowed(path))
    }

    pub fn new(path: impl Into<String>) -> Self {
        ErrorClass(Cow::Owned(path.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Direct superclass, `None` for a top-level class.
    pub fn parent(&self) -> Option<ErrorClass> {
        self.0
            .rsplit_once('.')
            .map(|(parent, _)| ErrorClass::new(parent))
    }

    /// This class followed by each ancestor, most specific first.
    pub fn lineage(&self) -> Vec<ErrorClass> {
        let mut lineage = vec![self.clone()];
        let mut current = self.parent();
        while let Some(class) = current {
            current = class.parent();
            lineage.push(class);
        }
        lineage
    }

    pub fn is_subclass_of(&self, other: &ErrorClass) -> bool {
        self == other
            || self
                .0
                .strip_prefix(other.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ErrorClass {
    fn from(path: &'static str) -> Self {
        ErrorClass::from_static(path)
    }
}

/// Business error types that can be raised from a method with `?`.
///
/// ```rust
/// use jsonrpc_toolkit::{Classified, ErrorClass, Fault};
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("account {0} is frozen")]
/// struct Frozen(u32);
///
/// impl Classified for Frozen {
///     fn class(&self) -> ErrorClass {
///         ErrorClass::from_static("accounts.frozen")
///     }
/// }
///
/// fn withdraw(account: u32) -> Result<(), Fault> {
///     if account > 2 {
///         return Err(Frozen(account).into());
///     }
///     Ok(())
/// }
///
/// assert!(matches!(withdraw(3), Err(Fault::Application(_))));
/// ```
pub trait Classified: std::error::Error + Send + Sync + 'static {
    fn class(&self) -> ErrorClass;
}

/// An application failure: a class plus the underlying source error.
#[derive(Debug)]
pub struct ApplicationError {
    class: ErrorClass,
    source: anyhow::Error,
}

impl ApplicationError {
    pub fn new<E>(class: impl Into<ErrorClass>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            class: class.into(),
            source: anyhow::Error::new(error),
        }
    }

    /// Wrap an already type-erased error.
    pub fn from_anyhow(class: impl Into<ErrorClass>, error: anyhow::Error) -> Self {
        Self {
            class: class.into(),
            source: error,
        }
    }

    /// Application error that only has a message.
    pub fn msg(class: impl Into<ErrorClass>, message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::from_anyhow(class, anyhow::Error::msg(message))
    }

    pub fn class(&self) -> &ErrorClass {
        &self.class
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.source.downcast_ref::<E>()
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.source
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.source()
    }
}

/// Anything raised by a pipeline stage or a method.
#[derive(Debug, Error)]
pub enum Fault {
    #[error(transparent)]
    Protocol(#[from] JsonRpcException),

    #[error(transparent)]
    Application(ApplicationError),

    #[error("panic: {0}")]
    Panic(String),
}

impl Fault {
    pub fn application<E>(class: impl Into<ErrorClass>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Fault::Application(ApplicationError::new(class, error))
    }

    pub fn method_not_found(method: &str) -> Self {
        Fault::Protocol(JsonRpcException::method_not_found(method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Fault::Protocol(JsonRpcException::invalid_params(message))
    }

    /// Numeric code, for protocol faults only.
    pub fn code(&self) -> Option<i64> {
        match self {
            Fault::Protocol(exception) => Some(exception.code),
            _ => None,
        }
    }

    pub fn as_protocol(&self) -> Option<&JsonRpcException> {
        match self {
            Fault::Protocol(exception) => Some(exception),
            _ => None,
        }
    }

    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Fault::Protocol(exception) => Some(match exception.error_code() {
                Some(JsonRpcErrorCode::ParseError) => ErrorClass::PARSE_ERROR,
                Some(JsonRpcErrorCode::InvalidRequest) => ErrorClass::INVALID_REQUEST,
                Some(JsonRpcErrorCode::MethodNotFound) => ErrorClass::METHOD_NOT_FOUND,
                Some(JsonRpcErrorCode::InvalidParams) => ErrorClass::INVALID_PARAMS,
                Some(JsonRpcErrorCode::InternalError) => ErrorClass::INTERNAL_ERROR,
                Some(JsonRpcErrorCode::ServerError(_)) | None => ErrorClass::JSON_RPC,
            }),
            Fault::Application(error) => Some(error.class().clone()),
            Fault::Panic(_) => None,
        }
    }

    /// Classes to try during handler resolution, most specific first.
    /// Panics have no lineage and are never matched by a class handler.
    pub fn lineage(&self) -> Vec<ErrorClass> {
        self.class().map(|class| class.lineage()).unwrap_or_default()
    }

    /// Error chain plus stack backtrace, for debug responses.
    pub fn traceback(&self) -> String {
        let mut out = match self {
            Fault::Application(error) => format!("{:?}", error.inner()),
            other => other.to_string(),
        };
        let captured = match self {
            Fault::Application(error) => {
                error.inner().backtrace().status() == std::backtrace::BacktraceStatus::Captured
            }
            _ => false,
        };
        if !captured {
            out.push_str("\n\nStack backtrace:\n");
            out.push_str(&std::backtrace::Backtrace::force_capture().to_string());
        }
        out
    }
}

impl<E: Classified> From<E> for Fault {
    fn from(error: E) -> Self {
        Fault::Application(ApplicationError::new(error.class(), error))
    }
}

impl From<ApplicationError> for Fault {
    fn from(error: ApplicationError) -> Self {
        Fault::Application(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("no such key: {0}")]
    struct NotFound(String);

    impl Classified for NotFound {
        fn class(&self) -> ErrorClass {
            ErrorClass::from_static("storage.lookup.not_found")
        }
    }

    #[test]
    fn test_lineage_is_most_specific_first() {
        let class = ErrorClass::from_static("storage.lookup.not_found");
        let lineage: Vec<String> = class.lineage().iter().map(ToString::to_string).collect();
        assert_eq!(lineage, vec!["storage.lookup.not_found", "storage.lookup", "storage"]);
    }

    #[test]
    fn test_subclass_relation() {
        let child = ErrorClass::from_static("storage.lookup");
        assert!(child.is_subclass_of(&ErrorClass::from_static("storage")));
        assert!(child.is_subclass_of(&child));
        assert!(!child.is_subclass_of(&ErrorClass::from_static("stor")));
        assert!(!ErrorClass::from_static("storage").is_subclass_of(&child));
    }

    #[test]
    fn test_protocol_fault_classes() {
        let fault = Fault::method_not_found("ghost");
        assert_eq!(fault.code(), Some(-32601));
        assert_eq!(fault.lineage(), vec![ErrorClass::METHOD_NOT_FOUND, ErrorClass::JSON_RPC]);

        let server = Fault::from(JsonRpcException::server_error(-32001, "busy", None).unwrap());
        assert_eq!(server.lineage(), vec![ErrorClass::JSON_RPC]);
    }

    #[test]
    fn test_classified_error_converts_with_question_mark() {
        fn find(key: &str) -> Result<u32, NotFound> {
            Err(NotFound(key.to_string()))
        }

        fn lookup() -> Result<u32, Fault> {
            let value = find("k")?;
            Ok(value)
        }

        let fault = lookup().unwrap_err();
        assert_eq!(fault.code(), None);
        assert_eq!(fault.to_string(), "no such key: k");
        match fault {
            Fault::Application(error) => {
                assert_eq!(error.downcast_ref::<NotFound>().unwrap().0, "k");
            }
            other => panic!("unexpected fault: {other:?}"),
        }
    }

    #[test]
    fn test_panic_has_no_lineage() {
        assert!(Fault::Panic("boom".into()).lineage().is_empty());
    }

    #[test]
    fn test_traceback_mentions_error() {
        let fault = Fault::from(NotFound("k".into()));
        let traceback = fault.traceback();
        assert!(traceback.contains("no such key: k"));
    }
}
