//! Payload codec (component C).
//!
//! Invocation arguments and return values travel as bencode byte strings
//! that themselves hold an encoded payload format — EDN for real babashka
//! pods, but this runtime only ever speaks JSON, since that is the format
//! a Rust pod's vars actually want to exchange with callers.

use serde_json::Value;
use thiserror::Error;

use crate::scheduler::PendingInvocation;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),
}

pub trait PayloadCodec: Send + Sync {
    fn format(&self) -> &'static str;
    fn encode(&self, value: &Value) -> String;
    fn decode(&self, raw: &str) -> Result<Value, PayloadError>;
}

/// The only payload format this runtime speaks.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPayloadCodec;

impl PayloadCodec for JsonPayloadCodec {
    fn format(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &Value) -> String {
        // A `Value` is always representable as JSON; serialization cannot fail.
        serde_json::to_string(value).expect("Value always serializes")
    }

    fn decode(&self, raw: &str) -> Result<Value, PayloadError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Decodes a `raw` array-of-arguments payload, defaulting to an empty
/// argument list when `raw` is `None` (describe-less invocations of
/// zero-arg vars still send an empty array, but this keeps callers honest).
pub fn decode_args(codec: &dyn PayloadCodec, raw: Option<&str>) -> Result<Vec<Value>, PayloadError> {
    let raw = match raw {
        Some(r) => r,
        None => return Ok(Vec::new()),
    };
    match codec.decode(raw)? {
        Value::Array(items) => Ok(items),
        other => Ok(vec![other]),
    }
}

pub fn empty_dict() -> Value {
    Value::Object(serde_json::Map::new())
}

pub fn empty_list() -> Value {
    Value::Array(Vec::new())
}

/// A single-key JSON object, the common case when a dict is built one
/// field at a time.
pub fn make_dict(key: impl Into<String>, value: Value) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(key.into(), value);
    Value::Object(map)
}

/// Encodes in-flight invocations as the mapping `id -> {args, start-ts}`
/// the built-in `pendings` var reports.
pub fn encode_pendings(pendings: &[PendingInvocation]) -> Value {
    let mut map = serde_json::Map::new();
    for p in pendings {
        map.insert(
            p.invoke_id.clone(),
            serde_json::json!({ "args": p.args, "start-ts": p.started_at_ms }),
        );
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roundtrips_json_values() {
        let codec = JsonPayloadCodec;
        let value = json!({"a": 1, "b": [true, null, "x"]});
        let encoded = codec.encode(&value);
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn decode_args_defaults_to_empty_list() {
        let codec = JsonPayloadCodec;
        assert_eq!(decode_args(&codec, None).unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn decode_args_unwraps_array_payload() {
        let codec = JsonPayloadCodec;
        let decoded = decode_args(&codec, Some("[1,2,3]")).unwrap();
        assert_eq!(decoded, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn decode_args_wraps_non_array_payload() {
        let codec = JsonPayloadCodec;
        let decoded = decode_args(&codec, Some("42")).unwrap();
        assert_eq!(decoded, vec![json!(42)]);
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let codec = JsonPayloadCodec;
        assert!(codec.decode("{not json").is_err());
    }

    #[test]
    fn empty_dict_and_list_encode_as_expected() {
        assert_eq!(empty_dict(), json!({}));
        assert_eq!(empty_list(), json!([]));
    }

    #[test]
    fn make_dict_builds_a_single_key_object() {
        assert_eq!(make_dict("shutdown", empty_dict()), json!({"shutdown": {}}));
    }

    #[test]
    fn encode_pendings_maps_id_to_args_and_start_ts() {
        let pendings = vec![PendingInvocation {
            invoke_id: "1".to_string(),
            var: "test-pod/slow".to_string(),
            args: vec![json!(1), json!(2)],
            started_at_ms: 1000,
        }];
        let encoded = encode_pendings(&pendings);
        assert_eq!(encoded, json!({"1": {"args": [1, 2], "start-ts": 1000}}));
    }
}
