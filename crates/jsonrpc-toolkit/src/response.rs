use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::JsonRpcErrorObject;
use crate::types::{JsonRpcVersion, RequestId};

/// Reasons a response envelope cannot be built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("Must specify a result or an error.")]
    Missing,
    #[error("Cannot specify both a result and an error.")]
    Both,
    #[error("A success response requires a request id.")]
    MissingId,
}

/// The mutually exclusive body of a response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ResponsePayload {
    #[serde(rename = "result")]
    Result(Value),
    #[serde(rename = "error")]
    Error(JsonRpcErrorObject),
}

/// A JSON-RPC response, either a success carrying `result` or a failure
/// carrying `error`, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResponse")]
pub struct JsonRpcResponse {
    #[serde(rename = "jsonrpc")]
    version: JsonRpcVersion,
    id: Option<RequestId>,
    #[serde(flatten)]
    payload: ResponsePayload,
}

impl JsonRpcResponse {
    /// Build a response from optional parts, validating the result/error
    /// exclusivity up front.
    pub fn try_new(
        id: Option<RequestId>,
        result: Option<Value>,
        error: Option<JsonRpcErrorObject>,
    ) -> Result<Self, ResponseError> {
        let payload = match (result, error) {
            (Some(_), Some(_)) => return Err(ResponseError::Both),
            (None, None) => return Err(ResponseError::Missing),
            (Some(result), None) => {
                if id.is_none() {
                    return Err(ResponseError::MissingId);
                }
                ResponsePayload::Result(result)
            }
            (None, Some(error)) => ResponsePayload::Error(error),
        };
        Ok(Self {
            version: JsonRpcVersion::V2_0,
            id,
            payload,
        })
    }

    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id: Some(id),
            payload: ResponsePayload::Result(result),
        }
    }

    /// Error response; `id` is `None` when the failure happened before an
    /// id could be read.
    pub fn error(id: Option<RequestId>, error: JsonRpcErrorObject) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    pub fn version(&self) -> JsonRpcVersion {
        self.version
    }

    pub fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }

    pub fn payload(&self) -> &ResponsePayload {
        &self.payload
    }

    pub fn into_payload(self) -> ResponsePayload {
        self.payload
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(value) => Some(value),
            ResponsePayload::Error(_) => None,
        }
    }

    pub fn error_object(&self) -> Option<&JsonRpcErrorObject> {
        match &self.payload {
            ResponsePayload::Error(error) => Some(error),
            ResponsePayload::Result(_) => None,
        }
    }
}

/// Wire shape accepted on deserialization, before validation
#[derive(Deserialize)]
struct RawResponse {
    jsonrpc: JsonRpcVersion,
    #[serde(default)]
    id: Option<RequestId>,
    // `Some(Value::Null)` for `"result": null`, `None` when the key is absent
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl TryFrom<RawResponse> for JsonRpcResponse {
    type Error = ResponseError;

    fn try_from(raw: RawResponse) -> Result<Self, Self::Error> {
        let mut response = JsonRpcResponse::try_new(raw.id, raw.result, raw.error)?;
        response.version = raw.jsonrpc;
        Ok(response)
    }
}
