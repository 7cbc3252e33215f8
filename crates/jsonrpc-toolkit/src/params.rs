//! Parameter contracts and binding.
//!
//! A method's contract is derived from the JSON schema of its argument type:
//!
//! - a struct becomes a named contract (fields in declaration order, fields
//!   without a default are required); positional params bind to the fields in
//!   order, keyed params bind by name;
//! - a tuple becomes a positional contract of fixed arity;
//! - a scalar (`i64`, `String`, `bool`, ...) is a single positional argument,
//!   optional when the type is nullable;
//! - `()` accepts no parameters at all.
//!
//! Named contracts reject keys they do not declare, unless the struct has a
//! catch-all (`#[serde(flatten)]` map).
//!
//! Any mismatch surfaces as an `InvalidParams` fault.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::JsonRpcException;
use crate::request::RequestParams;

/// The shape of arguments a method accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    /// No arguments
    Nullary,
    /// Positional-only arguments, between `min` and `max` of them
    Positional { min: usize, max: usize },
    /// One positional argument of a scalar type
    Single { required: bool },
    /// Named arguments, bindable positionally in declaration order
    Named {
        names: Vec<String>,
        required: Vec<String>,
        allow_unknown: bool,
    },
    /// Contract that could not be derived; params are passed through as-is
    Any,
}

impl Signature {
    /// Derive the contract of `P` from its JSON schema.
    pub fn of<P: JsonSchema>() -> Self {
        let schema = schemars::schema_for!(P);
        match serde_json::to_value(&schema) {
            Ok(value) => Self::from_schema(&value),
            Err(_) => Signature::Any,
        }
    }

    /// Interpret a schemars-generated schema document.
    pub fn from_schema(schema: &Value) -> Self {
        let Some(obj) = schema.as_object() else {
            return Signature::Any;
        };

        match obj.get("type").and_then(Value::as_str) {
            Some("null") => Signature::Nullary,
            Some("object") => {
                let names: Vec<String> = obj
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| props.keys().cloned().collect())
                    .unwrap_or_default();
                let required: Vec<String> = obj
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|req| {
                        req.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                let allow_unknown = !matches!(
                    obj.get("additionalProperties"),
                    None | Some(Value::Bool(false))
                );
                Signature::Named {
                    names,
                    required,
                    allow_unknown,
                }
            }
            Some("array") => {
                let items = obj
                    .get("prefixItems")
                    .or_else(|| obj.get("items"))
                    .and_then(Value::as_array)
                    .map(Vec::len);
                let min = obj
                    .get("minItems")
                    .and_then(Value::as_u64)
                    .map(|n| n as usize)
                    .or(items)
                    .unwrap_or(0);
                let max = obj
                    .get("maxItems")
                    .and_then(Value::as_u64)
                    .map(|n| n as usize)
                    .or(items)
                    .unwrap_or(usize::MAX);
                Signature::Positional { min, max }
            }
            Some(kind) if is_scalar(kind) => Signature::Single { required: true },
            _ => match obj.get("type").and_then(Value::as_array) {
                // Option<T> of a scalar: ["integer", "null"]
                Some(kinds)
                    if kinds.iter().filter_map(Value::as_str).any(is_scalar)
                        && kinds
                            .iter()
                            .filter_map(Value::as_str)
                            .all(|kind| kind == "null" || is_scalar(kind)) =>
                {
                    Signature::Single {
                        required: !kinds.iter().any(|kind| kind == "null"),
                    }
                }
                _ => Signature::Any,
            },
        }
    }

    /// Check `params` against this contract and produce the JSON value the
    /// argument type is deserialized from.
    pub fn bind(&self, params: Option<&RequestParams>) -> Result<Value, JsonRpcException> {
        match self {
            Signature::Any => Ok(params.map(RequestParams::to_value).unwrap_or(Value::Null)),
            Signature::Nullary => match params {
                Some(params) if !params.is_empty() => Err(JsonRpcException::invalid_params(
                    format!("takes 0 arguments but {} were given", params.len()),
                )),
                _ => Ok(Value::Null),
            },
            Signature::Positional { min, max } => {
                let args = match params {
                    None => Vec::new(),
                    Some(RequestParams::Array(values)) => values.clone(),
                    Some(RequestParams::Object(map)) => match map.keys().next() {
                        Some(key) => {
                            return Err(JsonRpcException::invalid_params(format!(
                                "got an unexpected keyword argument '{}'",
                                key
                            )));
                        }
                        None => Vec::new(),
                    },
                };
                if args.len() < *min || args.len() > *max {
                    return Err(JsonRpcException::invalid_params(arity_message(
                        *min,
                        *max,
                        args.len(),
                    )));
                }
                Ok(Value::Array(args))
            }
            Signature::Single { required } => {
                let mut args = match params {
                    None => Vec::new(),
                    Some(RequestParams::Array(values)) => values.clone(),
                    Some(RequestParams::Object(map)) => match map.keys().next() {
                        Some(key) => {
                            return Err(JsonRpcException::invalid_params(format!(
                                "got an unexpected keyword argument '{}'",
                                key
                            )));
                        }
                        None => Vec::new(),
                    },
                };
                let min = usize::from(*required);
                if args.len() < min || args.len() > 1 {
                    return Err(JsonRpcException::invalid_params(arity_message(
                        min,
                        1,
                        args.len(),
                    )));
                }
                Ok(args.pop().unwrap_or(Value::Null))
            }
            Signature::Named {
                names,
                required,
                allow_unknown,
            } => {
                let mut bound = Map::new();
                match params {
                    None => {}
                    Some(RequestParams::Array(values)) => {
                        if values.len() > names.len() {
                            return Err(JsonRpcException::invalid_params(format!(
                                "takes {} positional arguments but {} were given",
                                names.len(),
                                values.len()
                            )));
                        }
                        for (name, value) in names.iter().zip(values) {
                            bound.insert(name.clone(), value.clone());
                        }
                    }
                    Some(RequestParams::Object(map)) => {
                        if !allow_unknown
                            && let Some(key) = map.keys().find(|key| !names.contains(*key))
                        {
                            return Err(JsonRpcException::invalid_params(format!(
                                "got an unexpected keyword argument '{}'",
                                key
                            )));
                        }
                        bound = map.clone();
                    }
                }
                let missing: Vec<&str> = required
                    .iter()
                    .filter(|name| !bound.contains_key(name.as_str()))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() {
                    return Err(JsonRpcException::invalid_params(missing_message(&missing)));
                }
                Ok(Value::Object(bound))
            }
        }
    }
}

/// Bind `params` against the contract of `P` and deserialize them.
pub fn bind_params<P: DeserializeOwned>(
    signature: &Signature,
    params: Option<&RequestParams>,
) -> Result<P, JsonRpcException> {
    let bound = signature.bind(params)?;
    serde_json::from_value(bound).map_err(|e| JsonRpcException::invalid_params(e.to_string()))
}

fn is_scalar(kind: &str) -> bool {
    matches!(kind, "integer" | "number" | "string" | "boolean")
}

fn arity_message(min: usize, max: usize, given: usize) -> String {
    if min == max {
        format!("takes {} positional arguments but {} were given", min, given)
    } else if max == usize::MAX {
        format!("takes at least {} positional arguments but {} were given", min, given)
    } else {
        format!(
            "takes from {} to {} positional arguments but {} were given",
            min, max, given
        )
    }
}

fn missing_message(missing: &[&str]) -> String {
    let quoted: Vec<String> = missing.iter().map(|name| format!("'{}'", name)).collect();
    if quoted.len() == 1 {
        format!("missing a required argument: {}", quoted[0])
    } else {
        format!("missing required arguments: {}", quoted.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Transfer {
        from: String,
        to: String,
        #[serde(default)]
        memo: Option<String>,
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct Strict {
        level: u8,
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Tagged {
        name: String,
        #[serde(flatten)]
        labels: std::collections::BTreeMap<String, String>,
    }

    fn array(values: Vec<Value>) -> RequestParams {
        RequestParams::Array(values)
    }

    fn object(value: Value) -> RequestParams {
        match value {
            Value::Object(map) => RequestParams::Object(map),
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_struct_signature_keeps_field_order() {
        match Signature::of::<Transfer>() {
            Signature::Named { names, required, .. } => {
                assert_eq!(names, vec!["from", "to", "memo"]);
                assert_eq!(required, vec!["from", "to"]);
            }
            other => panic!("unexpected signature: {other:?}"),
        }
    }

    #[test]
    fn test_tuple_and_unit_signatures() {
        assert_eq!(
            Signature::of::<(i64, i64)>(),
            Signature::Positional { min: 2, max: 2 }
        );
        assert_eq!(Signature::of::<()>(), Signature::Nullary);
    }

    #[test]
    fn test_positional_binds_to_struct_fields() {
        let signature = Signature::of::<Transfer>();
        let params = array(vec![json!("alice"), json!("bob")]);
        let transfer: Transfer = bind_params(&signature, Some(&params)).unwrap();
        assert_eq!(
            transfer,
            Transfer {
                from: "alice".into(),
                to: "bob".into(),
                memo: None
            }
        );
    }

    #[test]
    fn test_named_binding() {
        let signature = Signature::of::<Transfer>();
        let params = object(json!({"to": "bob", "from": "alice", "memo": "rent"}));
        let transfer: Transfer = bind_params(&signature, Some(&params)).unwrap();
        assert_eq!(transfer.memo.as_deref(), Some("rent"));
    }

    #[test]
    fn test_missing_required_argument() {
        let signature = Signature::of::<Transfer>();
        let params = object(json!({"from": "alice"}));
        let err = bind_params::<Transfer>(&signature, Some(&params)).unwrap_err();
        assert_eq!(err.code, -32602);
        assert_eq!(err.message, "missing a required argument: 'to'");

        let err = bind_params::<Transfer>(&signature, None).unwrap_err();
        assert_eq!(err.message, "missing required arguments: 'from', 'to'");
    }

    #[test]
    fn test_too_many_positional_arguments() {
        let signature = Signature::of::<(i64, i64)>();
        let params = array(vec![json!(1), json!(2), json!(3)]);
        let err = bind_params::<(i64, i64)>(&signature, Some(&params)).unwrap_err();
        assert_eq!(err.code, -32602);
        assert_eq!(err.message, "takes 2 positional arguments but 3 were given");
    }

    #[test]
    fn test_keyword_for_positional_only() {
        let signature = Signature::of::<(i64, i64)>();
        let params = object(json!({"a": 1}));
        let err = bind_params::<(i64, i64)>(&signature, Some(&params)).unwrap_err();
        assert_eq!(err.message, "got an unexpected keyword argument 'a'");
    }

    #[test]
    fn test_unknown_keyword_rejected_by_strict_struct() {
        let signature = Signature::of::<Strict>();
        let params = object(json!({"level": 1, "colour": "red"}));
        let err = bind_params::<Strict>(&signature, Some(&params)).unwrap_err();
        assert_eq!(err.message, "got an unexpected keyword argument 'colour'");
    }

    #[test]
    fn test_unknown_keyword_rejected_by_plain_struct() {
        let signature = Signature::of::<Transfer>();
        let params = object(json!({"from": "alice", "to": "bob", "amount": 5}));
        let err = bind_params::<Transfer>(&signature, Some(&params)).unwrap_err();
        assert_eq!(err.code, -32602);
        assert_eq!(err.message, "got an unexpected keyword argument 'amount'");
    }

    #[test]
    fn test_flattened_map_collects_extra_keywords() {
        let signature = Signature::of::<Tagged>();
        let params = object(json!({"name": "db", "env": "prod"}));
        let tagged: Tagged = bind_params(&signature, Some(&params)).unwrap();
        assert_eq!(tagged.name, "db");
        assert_eq!(tagged.labels.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn test_scalar_is_single_positional_argument() {
        let signature = Signature::of::<i64>();
        assert_eq!(signature, Signature::Single { required: true });

        let value: i64 = bind_params(&signature, Some(&array(vec![json!(4)]))).unwrap();
        assert_eq!(value, 4);

        let err = bind_params::<i64>(&signature, None).unwrap_err();
        assert_eq!(err.message, "takes 1 positional arguments but 0 were given");

        let err = bind_params::<i64>(&signature, Some(&array(vec![json!(4), json!(5)]))).unwrap_err();
        assert_eq!(err.message, "takes 1 positional arguments but 2 were given");

        let err = bind_params::<i64>(&signature, Some(&object(json!({"x": 4})))).unwrap_err();
        assert_eq!(err.message, "got an unexpected keyword argument 'x'");

        assert_eq!(Signature::of::<String>(), Signature::Single { required: true });
    }

    #[test]
    fn test_optional_scalar_may_be_omitted() {
        let signature = Signature::of::<Option<u32>>();
        assert_eq!(signature, Signature::Single { required: false });

        let absent: Option<u32> = bind_params(&signature, None).unwrap();
        assert_eq!(absent, None);
        let present: Option<u32> = bind_params(&signature, Some(&array(vec![json!(3)]))).unwrap();
        assert_eq!(present, Some(3));
    }

    #[test]
    fn test_type_mismatch_is_invalid_params() {
        let signature = Signature::of::<(i64, i64)>();
        let params = array(vec![json!("two"), json!(3)]);
        let err = bind_params::<(i64, i64)>(&signature, Some(&params)).unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[test]
    fn test_nullary_accepts_absent_or_empty() {
        let signature = Signature::of::<()>();
        assert!(bind_params::<()>(&signature, None).is_ok());
        assert!(bind_params::<()>(&signature, Some(&array(vec![]))).is_ok());
        let err = bind_params::<()>(&signature, Some(&array(vec![json!(1)]))).unwrap_err();
        assert_eq!(err.message, "takes 0 arguments but 1 were given");
    }
}
