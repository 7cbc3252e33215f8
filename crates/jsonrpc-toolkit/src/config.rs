//! Server configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatcher::DEFAULT_NAMESPACE_SEPARATOR;

/// Configuration problems detected when a server is built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Namespace separator cannot be empty")]
    EmptySeparator,
}

/// Settings for a [`JsonRpcServer`](crate::JsonRpcServer).
///
/// Deserializable from any serde format; missing fields take their defaults.
///
/// ```rust
/// use jsonrpc_toolkit::ServerConfig;
///
/// let config: ServerConfig = serde_json::from_str(r#"{"debug": true}"#).unwrap();
/// assert!(config.debug);
/// assert_eq!(config.namespace_separator, ".");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Expose fault details and backtraces in internal error responses.
    /// Never enable in production.
    pub debug: bool,
    /// Joins namespace and method names when namespaces are mounted
    pub namespace_separator: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            debug: false,
            namespace_separator: DEFAULT_NAMESPACE_SEPARATOR.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace_separator.is_empty() {
            return Err(ConfigError::EmptySeparator);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert!(!config.debug);
        assert_eq!(config.namespace_separator, ".");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_separator_rejected() {
        let config: ServerConfig = serde_json::from_str(r#"{"namespace_separator": ""}"#).unwrap();
        assert_eq!(config.validate(), Err(ConfigError::EmptySeparator));
    }
}
