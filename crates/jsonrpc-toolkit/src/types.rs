use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier correlating a call with its response.
///
/// Integer ids are limited to the `i64` range. Larger integers are rejected
/// by the decoder as an invalid request; clients needing wider ids can send
/// them as strings. Notifications have no id, which the envelopes model as
/// `Option<RequestId>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl RequestId {
    /// Id carried by a raw `id` member. `None` for null, fractional,
    /// out-of-range or non-scalar values.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self::String(text.clone())),
            Value::Number(number) => number.as_i64().map(Self::Number),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(number: i64) -> Self {
        Self::Number(number)
    }
}

impl From<&str> for RequestId {
    fn from(text: &str) -> Self {
        Self::String(text.to_owned())
    }
}

impl From<String> for RequestId {
    fn from(text: String) -> Self {
        Self::String(text)
    }
}

/// The `jsonrpc` member. `"2.0"` is the only accepted value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum JsonRpcVersion {
    #[default]
    V2_0,
}

impl From<JsonRpcVersion> for &'static str {
    fn from(_: JsonRpcVersion) -> Self {
        crate::JSONRPC_VERSION
    }
}

impl TryFrom<String> for JsonRpcVersion {
    type Error = String;

    fn try_from(version: String) -> Result<Self, Self::Error> {
        if version == crate::JSONRPC_VERSION {
            Ok(Self::V2_0)
        } else {
            Err(format!("unsupported jsonrpc version {version:?}"))
        }
    }
}

impl fmt::Display for JsonRpcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str((*self).into())
    }
}
