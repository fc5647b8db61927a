//! Id, timestamp, and response-envelope helpers
//!
//! Every public engine operation answers with the same JSON shape:
//! `{"status": "ok"|"error", "message": ..., ...data}`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::MnemonError;

/// Generate a new UUID4 identifier (hyphenated lowercase)
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current wall-clock time
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as an ISO-8601 / RFC 3339 string (second precision, UTC)
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format a timestamp the way the service persists them
pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Success envelope with no extra data
pub fn ok(message: impl Into<String>) -> Value {
    json!({
        "status": "ok",
        "message": message.into(),
    })
}

/// Success envelope with additional data fields merged at the top level
pub fn ok_with(message: impl Into<String>, data: Value) -> Value {
    let mut map = Map::new();
    map.insert("status".to_string(), json!("ok"));
    map.insert("message".to_string(), json!(message.into()));
    if let Value::Object(extra) = data {
        for (k, v) in extra {
            if k == "status" {
                continue;
            }
            map.insert(k, v);
        }
    }
    Value::Object(map)
}

/// Error envelope carrying the semantic error kind under `error_details`
pub fn error(err: &MnemonError) -> Value {
    json!({
        "status": "error",
        "message": err.to_string(),
        "error_details": {
            "kind": err.kind(),
        },
    })
}

/// Error envelope from an explicit kind and message
pub fn error_parts(kind: &str, message: impl Into<String>) -> Value {
    json!({
        "status": "error",
        "message": message.into(),
        "error_details": {
            "kind": kind,
        },
    })
}

/// Whether an envelope reports success
pub fn is_ok(envelope: &Value) -> bool {
    envelope.get("status").and_then(Value::as_str) == Some("ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_id_is_uuid4() {
        let id = new_id();
        assert_eq!(id.len(), 36);
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn test_now_iso_round_trips() {
        let ts = now_iso();
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn test_ok_envelope_shape() {
        let env = ok("done");
        assert_eq!(env["status"], "ok");
        assert_eq!(env["message"], "done");
    }

    #[test]
    fn test_ok_with_merges_data() {
        let env = ok_with("stored", json!({"memory_id": "abc", "version": 2}));
        assert_eq!(env["status"], "ok");
        assert_eq!(env["memory_id"], "abc");
        assert_eq!(env["version"], 2);
    }

    #[test]
    fn test_error_envelope_carries_kind() {
        let env = error(&MnemonError::NotFound("m-1".into()));
        assert_eq!(env["status"], "error");
        assert_eq!(env["error_details"]["kind"], "not_found");
        assert!(!is_ok(&env));
    }
}
