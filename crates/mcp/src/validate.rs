//! Structural validation of raw JSON-RPC 2.0 messages.
//!
//! Every inbound message on both the server and the client goes through
//! [`classify`] before it is deserialized, so downstream code can assume
//! well-formed input.

use serde_json::{Map, Value};

use crate::types::JSONRPC_VERSION;

/// Shape of a raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Error,
    Invalid,
}

/// Whether `raw` is a well-formed JSON-RPC 2.0 message of any kind.
pub fn validate(raw: &Value) -> bool {
    classify(raw) != MessageKind::Invalid
}

/// Same as [`validate`], starting from text.
pub fn validate_str(raw: &str) -> bool {
    serde_json::from_str::<Value>(raw)
        .map(|value| validate(&value))
        .unwrap_or(false)
}

/// Classify a raw message.
///
/// - `jsonrpc` must be exactly `"2.0"`.
/// - A message with `method` is a request when it carries an `id`, a
///   notification otherwise; it must not carry `result` or `error`.
/// - Anything else must carry exactly one of `result` or `error`.
/// - Ids are integers, strings or booleans. `null` is only allowed on an
///   error response (the id of the offending message was unreadable).
pub fn classify(raw: &Value) -> MessageKind {
    let Some(obj) = raw.as_object() else {
        return MessageKind::Invalid;
    };
    if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return MessageKind::Invalid;
    }

    if let Some(method) = obj.get("method") {
        return classify_call(obj, method);
    }

    match (obj.get("result"), obj.get("error")) {
        (Some(_), None) => match obj.get("id") {
            Some(id) if is_valid_id(id) => MessageKind::Response,
            _ => MessageKind::Invalid,
        },
        (None, Some(error)) => {
            let id_ok = matches!(obj.get("id"), Some(id) if id.is_null() || is_valid_id(id));
            if id_ok && is_valid_error_object(error) {
                MessageKind::Error
            } else {
                MessageKind::Invalid
            }
        }
        _ => MessageKind::Invalid,
    }
}

fn classify_call(obj: &Map<String, Value>, method: &Value) -> MessageKind {
    let method_ok = method.as_str().is_some_and(|m| !m.is_empty());
    let params_ok = match obj.get("params") {
        None => true,
        Some(params) => params.is_object() || params.is_array(),
    };
    if !method_ok || !params_ok || obj.contains_key("result") || obj.contains_key("error") {
        return MessageKind::Invalid;
    }

    match obj.get("id") {
        None => MessageKind::Notification,
        Some(id) if is_valid_id(id) => MessageKind::Request,
        Some(_) => MessageKind::Invalid,
    }
}

fn is_valid_id(id: &Value) -> bool {
    match id {
        Value::String(_) | Value::Bool(_) => true,
        Value::Number(n) => n.is_i64(),
        _ => false,
    }
}

fn is_valid_error_object(error: &Value) -> bool {
    let Some(obj) = error.as_object() else {
        return false;
    };
    obj.get("code").is_some_and(Value::is_i64) && obj.get("message").is_some_and(Value::is_string)
}

/// Best-effort id extraction from a message that failed validation, so an
/// error response can still be paired with it.
pub fn salvage_id(raw: &Value) -> Option<crate::types::RpcId> {
    let id = raw.get("id")?;
    if is_valid_id(id) {
        serde_json::from_value(id.clone()).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_well_formed_messages() {
        let cases = [
            (json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}), MessageKind::Request),
            (json!({"jsonrpc": "2.0", "id": "abc", "method": "tools/list", "params": {}}), MessageKind::Request),
            (json!({"jsonrpc": "2.0", "id": true, "method": "ping", "params": []}), MessageKind::Request),
            (json!({"jsonrpc": "2.0", "method": "notifications/initialized"}), MessageKind::Notification),
            (json!({"jsonrpc": "2.0", "id": 1, "result": null}), MessageKind::Response),
            (json!({"jsonrpc": "2.0", "id": 1, "result": {"tools": []}}), MessageKind::Response),
            (
                json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error"}}),
                MessageKind::Error,
            ),
            (
                json!({"jsonrpc": "2.0", "id": 9, "error": {"code": -32601, "message": "nope", "data": {"x": 1}}}),
                MessageKind::Error,
            ),
        ];
        for (raw, expected) in cases {
            assert_eq!(classify(&raw), expected, "{raw}");
            assert!(validate(&raw));
        }
    }

    #[test]
    fn test_rejects_invariant_violations() {
        let cases = [
            json!([1, 2, 3]),
            json!("ping"),
            json!({"id": 1, "method": "ping"}),
            json!({"jsonrpc": "1.0", "id": 1, "method": "ping"}),
            json!({"jsonrpc": 2.0, "id": 1, "method": "ping"}),
            json!({"jsonrpc": "2.0", "id": null, "method": "ping"}),
            json!({"jsonrpc": "2.0", "id": {"a": 1}, "method": "ping"}),
            json!({"jsonrpc": "2.0", "id": [1], "method": "ping"}),
            json!({"jsonrpc": "2.0", "id": 1.5, "method": "ping"}),
            json!({"jsonrpc": "2.0", "id": 1, "method": ""}),
            json!({"jsonrpc": "2.0", "id": 1, "method": 7}),
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping", "params": "x"}),
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping", "result": {}}),
            json!({"jsonrpc": "2.0", "id": 1}),
            json!({"jsonrpc": "2.0", "id": 1, "result": {}, "error": {"code": 1, "message": "x"}}),
            json!({"jsonrpc": "2.0", "result": {}}),
            json!({"jsonrpc": "2.0", "id": null, "result": {}}),
            json!({"jsonrpc": "2.0", "id": 1, "error": "boom"}),
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": "x", "message": "boom"}}),
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -1}}),
        ];
        for raw in cases {
            assert_eq!(classify(&raw), MessageKind::Invalid, "{raw}");
            assert!(!validate(&raw));
        }
    }

    #[test]
    fn test_validate_str() {
        assert!(validate_str(r#"{"jsonrpc":"2.0","method":"notifications/cancelled"}"#));
        assert!(!validate_str("not json at all"));
        assert!(!validate_str(""));
    }

    #[test]
    fn test_salvage_id() {
        let raw = json!({"jsonrpc": "1.0", "id": 5, "method": "ping"});
        assert_eq!(salvage_id(&raw), Some(crate::types::RpcId::Number(5)));
        assert_eq!(salvage_id(&json!({"id": 1.5})), None);
        assert_eq!(salvage_id(&json!({})), None);
    }
}
