//! The RPC envelope (§3) and error code vocabulary (§4.6/§7).

use serde::{Deserialize, Serialize};

/// Error codes an RPC response may carry. Reported inline in the response
/// envelope — never raised as a transport-level error (§7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MethodNotFound,
    AccessDenied,
    RateLimited,
    InvalidArguments,
    InternalError,
}

/// A request or response, correlated by `call_id` (a UUID string).
///
/// Invariant: every `Response.call_id` equals some prior `Request.call_id`
/// on the same socket — enforced by the dispatcher (server side) and the
/// pending-call table (client side), not by this type itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcEnvelope {
    Request {
        call_id: String,
        method: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
        #[serde(default)]
        kwargs: serde_json::Map<String, serde_json::Value>,
    },
    Response {
        call_id: String,
        response: serde_json::Value,
        error: Option<ErrorCode>,
    },
}

impl RpcEnvelope {
    pub fn call_id(&self) -> &str {
        match self {
            RpcEnvelope::Request { call_id, .. } => call_id,
            RpcEnvelope::Response { call_id, .. } => call_id,
        }
    }

    /// Build a successful response. `response` may be `Value::Null` — a
    /// falsy return value is still a success, never dropped (§8).
    pub fn success(call_id: impl Into<String>, response: serde_json::Value) -> Self {
        RpcEnvelope::Response {
            call_id: call_id.into(),
            response,
            error: None,
        }
    }

    /// Build an error response. `response` is `Value::Null` by convention.
    pub fn failure(call_id: impl Into<String>, error: ErrorCode) -> Self {
        RpcEnvelope::Response {
            call_id: call_id.into(),
            response: serde_json::Value::Null,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_to_wire_shape() {
        let env = RpcEnvelope::Request {
            call_id: "abc".into(),
            method: "add".into(),
            args: vec![serde_json::json!(10), serde_json::json!(20)],
            kwargs: serde_json::Map::new(),
        };
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["type"], "request");
        assert_eq!(v["call_id"], "abc");
        assert_eq!(v["method"], "add");
        assert_eq!(v["args"], serde_json::json!([10, 20]));
    }

    #[test]
    fn falsy_success_response_keeps_null_response_distinct_from_error() {
        let env = RpcEnvelope::success("abc", serde_json::Value::Null);
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["response"], serde_json::Value::Null);
        assert_eq!(v["error"], serde_json::Value::Null);
    }

    #[test]
    fn failure_response_carries_error_code() {
        let env = RpcEnvelope::failure("abc", ErrorCode::RateLimited);
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["error"], "RATE_LIMITED");
    }

    #[test]
    fn call_id_is_shared_accessor_for_both_variants() {
        let req = RpcEnvelope::Request {
            call_id: "x".into(),
            method: "m".into(),
            args: vec![],
            kwargs: serde_json::Map::new(),
        };
        let resp = RpcEnvelope::success("x", serde_json::Value::Null);
        assert_eq!(req.call_id(), "x");
        assert_eq!(resp.call_id(), "x");
    }
}
