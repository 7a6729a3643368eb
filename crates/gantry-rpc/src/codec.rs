//! Request/reply codecs.

use serde_json::{Value, json};

use crate::{RpcError, RpcResult};

/// Encodes requests and decodes replies on the client, and the reverse on
/// the server. Implementations are stateless.
pub trait Codec: Send + Sync {
    fn content_type(&self) -> &'static str;

    /// Encode a call. Fails if the arguments cannot be serialized.
    fn encode_request(&self, method: &str, params: &Value) -> RpcResult<Vec<u8>>;

    /// Decode a reply into the result value. Fails on a malformed payload
    /// or a remote-reported fault.
    fn decode_response(&self, body: &[u8]) -> RpcResult<Value>;

    /// Decode an incoming call into (method, args, id).
    fn decode_request(&self, body: &[u8]) -> RpcResult<(String, Value, Value)>;

    /// Encode a reply for the given call id.
    fn encode_response(&self, result: Result<Value, String>, id: Value) -> Vec<u8>;
}

/// JSON envelope codec: `{"method", "params": [args], "id"}` requests and
/// `{"result", "error", "id"}` replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode_request(&self, method: &str, params: &Value) -> RpcResult<Vec<u8>> {
        let envelope = json!({
            "method": method,
            "params": [params],
            "id": 1,
        });
        serde_json::to_vec(&envelope).map_err(RpcError::Encode)
    }

    fn decode_response(&self, body: &[u8]) -> RpcResult<Value> {
        let envelope: Value = serde_json::from_slice(body).map_err(RpcError::Decode)?;
        match envelope.get("error") {
            None | Some(Value::Null) => {}
            Some(Value::String(msg)) => return Err(RpcError::Remote(msg.clone())),
            Some(other) => return Err(RpcError::Remote(other.to_string())),
        }
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    fn decode_request(&self, body: &[u8]) -> RpcResult<(String, Value, Value)> {
        let envelope: Value = serde_json::from_slice(body).map_err(RpcError::Decode)?;
        let method = envelope
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::Envelope("missing method".to_string()))?
            .to_string();
        let args = match envelope.get("params") {
            Some(Value::Array(params)) => params.first().cloned().unwrap_or(Value::Null),
            Some(other) => other.clone(),
            None => Value::Null,
        };
        let id = envelope.get("id").cloned().unwrap_or(Value::Null);
        Ok((method, args, id))
    }

    fn encode_response(&self, result: Result<Value, String>, id: Value) -> Vec<u8> {
        let envelope = match result {
            Ok(value) => json!({ "result": value, "error": Value::Null, "id": id }),
            Err(msg) => json!({ "result": Value::Null, "error": msg, "id": id }),
        };
        // A Value envelope always serializes.
        serde_json::to_vec(&envelope).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_request() {
        let codec = JsonCodec;
        let body = codec
            .encode_request("Tracker.Ping", &json!({"key": "abc"}))
            .unwrap();
        let (method, args, id) = codec.decode_request(&body).unwrap();
        assert_eq!(method, "Tracker.Ping");
        assert_eq!(args, json!({"key": "abc"}));
        assert_eq!(id, json!(1));
    }

    #[test]
    fn test_remote_fault_surfaces() {
        let codec = JsonCodec;
        let body = codec.encode_response(Err("boom".to_string()), json!(1));
        let err = codec.decode_response(&body).unwrap_err();
        assert!(matches!(err, RpcError::Remote(msg) if msg == "boom"));
    }

    #[test]
    fn test_malformed_payload_fails() {
        let codec = JsonCodec;
        assert!(codec.decode_response(b"not json").is_err());
        assert!(codec.decode_request(b"{}").is_err());
    }
}
