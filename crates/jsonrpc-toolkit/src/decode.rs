//! Wire decoding of incoming requests

use serde_json::{Map, Value};
use thiserror::Error;

use crate::JSONRPC_VERSION;
use crate::error::JsonRpcException;
use crate::request::{JsonRpcRequest, RequestParams};
use crate::response::JsonRpcResponse;
use crate::types::{JsonRpcVersion, RequestId};

/// Input that could not be turned into a request.
///
/// Carries the id when one could be recovered so the error response can be
/// correlated by the client; otherwise the response id is `null`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{exception}")]
pub struct DecodeError {
    pub id: Option<RequestId>,
    pub exception: JsonRpcException,
}

impl DecodeError {
    fn parse_error() -> Self {
        Self {
            id: None,
            exception: JsonRpcException::parse_error(None),
        }
    }

    fn invalid_request(id: Option<RequestId>, reason: &str) -> Self {
        Self {
            id,
            exception: JsonRpcException::invalid_request(Some(Value::String(reason.to_string()))),
        }
    }

    /// Error response for this rejection. Rejected input is always answered.
    pub fn into_response(self) -> JsonRpcResponse {
        JsonRpcResponse::error(self.id, self.exception.into())
    }
}

/// Parse a JSON-RPC request from text
pub fn parse_request(json_str: &str) -> Result<JsonRpcRequest, DecodeError> {
    let value: Value = serde_json::from_str(json_str).map_err(|_| DecodeError::parse_error())?;
    parse_request_value(value)
}

/// Validate an already-parsed JSON value as a JSON-RPC request
pub fn parse_request_value(value: Value) -> Result<JsonRpcRequest, DecodeError> {
    let Value::Object(mut obj) = value else {
        return Err(DecodeError::invalid_request(None, "request must be an object"));
    };

    let id = take_id(&mut obj)?;

    match obj.get("jsonrpc") {
        Some(Value::String(version)) if version.as_str() == JSONRPC_VERSION => {}
        _ => {
            return Err(DecodeError::invalid_request(
                id,
                "jsonrpc must be exactly \"2.0\"",
            ));
        }
    }

    let method = match obj.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => method,
        _ => {
            return Err(DecodeError::invalid_request(
                id,
                "method must be a non-empty string",
            ));
        }
    };

    let params = match obj.remove("params") {
        None => None,
        Some(Value::Array(values)) => Some(RequestParams::Array(values)),
        Some(Value::Object(map)) => Some(RequestParams::Object(map)),
        Some(_) => {
            return Err(DecodeError::invalid_request(
                id,
                "params must be an array or an object",
            ));
        }
    };

    Ok(JsonRpcRequest {
        version: JsonRpcVersion::V2_0,
        method,
        params,
        id,
    })
}

/// Absent id means notification; present ids must be a string or an integer.
fn take_id(obj: &mut Map<String, Value>) -> Result<Option<RequestId>, DecodeError> {
    match obj.remove("id") {
        None => Ok(None),
        Some(value) => match RequestId::from_value(&value) {
            Some(id) => Ok(Some(id)),
            None => Err(DecodeError::invalid_request(
                None,
                "id must be a string or a 64-bit signed integer",
            )),
        },
    }
}
