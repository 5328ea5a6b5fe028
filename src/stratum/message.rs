// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/stratum/message.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Wire model for line-delimited stratum JSON-RPC. One JSON object per line;
// responses carry an id, notifications do not (or carry id 0). The method
// field is polymorphic: classic pools send strings, the VEO dialect sends
// integer message ids, so dispatch keys are a sum type and every numeric
// JSON form is normalized to an integer on ingress.
//
// Tree Location:
// - src/stratum/message.rs (JSON-RPC wire model)
// - Depends on: serde, serde_json

use serde::Serialize;
use serde_json::Value;

/// Dispatch key for server-originated notifications
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodKey {
    Name(String),
    Id(i64),
}

impl MethodKey {
    /// Normalize a raw method field; any numeric form becomes Id
    pub fn from_value(v: &Value) -> Option<MethodKey> {
        match v {
            Value::String(s) => Some(MethodKey::Name(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(MethodKey::Id),
            _ => None,
        }
    }

    /// The form written on the wire for outgoing calls
    pub fn to_value(&self) -> Value {
        match self {
            MethodKey::Name(s) => Value::String(s.clone()),
            MethodKey::Id(i) => Value::Number((*i).into()),
        }
    }
}

impl From<&str> for MethodKey {
    fn from(s: &str) -> Self {
        MethodKey::Name(s.to_string())
    }
}

impl From<i64> for MethodKey {
    fn from(i: i64) -> Self {
        MethodKey::Id(i)
    }
}

/// An outgoing remote call
#[derive(Debug, Serialize)]
pub struct Request {
    pub method: Value,
    pub params: Value,
    pub id: u64,
}

impl Request {
    pub fn new(method: &MethodKey, params: Value, id: u64) -> Request {
        Request {
            method: method.to_value(),
            params,
            id,
        }
    }

    /// Serialized line, newline terminated
    pub fn to_line(&self) -> serde_json::Result<String> {
        Ok(format!("{}\n", serde_json::to_string(self)?))
    }
}

/// Any inbound line: a response to a pending call, or a notification
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Inbound {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub method: Option<Value>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Inbound {
    /// The pending-call id; 0 means "this is a notification"
    pub fn call_id(&self) -> u64 {
        match &self.id {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn method_key(&self) -> Option<MethodKey> {
        self.method.as_ref().and_then(MethodKey::from_value)
    }

    /// Positional notification params; object payloads (VEO) ride in result
    pub fn params_list(&self) -> Vec<Value> {
        match &self.params {
            Some(Value::Array(a)) => a.clone(),
            Some(v) => vec![v.clone()],
            None => Vec::new(),
        }
    }

    /// Best-effort human message out of a server error field
    pub fn error_message(&self) -> Option<String> {
        let err = self.error.as_ref()?;
        if err.is_null() {
            return None;
        }
        Some(match err {
            Value::String(s) => s.clone(),
            Value::Object(o) => o
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string()),
            Value::Array(a) => a
                .get(1)
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string()),
            other => other.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_key_normalizes_numbers() {
        assert_eq!(
            MethodKey::from_value(&json!("mining.notify")),
            Some(MethodKey::Name("mining.notify".into()))
        );
        assert_eq!(MethodKey::from_value(&json!(2)), Some(MethodKey::Id(2)));
        assert_eq!(MethodKey::from_value(&json!(2.0)), Some(MethodKey::Id(2)));
        assert_eq!(MethodKey::from_value(&json!(null)), None);
    }

    #[test]
    fn test_request_line_shape() {
        let req = Request::new(&MethodKey::from("mining.subscribe"), json!(["thyrox"]), 7);
        let line = req.to_line().unwrap();
        assert!(line.ends_with('\n'));
        let v: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(v["method"], "mining.subscribe");
        assert_eq!(v["id"], 7);
    }

    #[test]
    fn test_inbound_classification() {
        let resp: Inbound =
            serde_json::from_str(r#"{"id":3,"result":[null,"abcd",4],"error":null}"#).unwrap();
        assert_eq!(resp.call_id(), 3);
        assert!(resp.error_message().is_none());

        let notif: Inbound =
            serde_json::from_str(r#"{"method":"mining.set_difficulty","params":[512.0]}"#)
                .unwrap();
        assert_eq!(notif.call_id(), 0);
        assert_eq!(
            notif.method_key(),
            Some(MethodKey::Name("mining.set_difficulty".into()))
        );
        assert_eq!(notif.params_list(), vec![json!(512.0)]);
    }

    #[test]
    fn test_error_message_forms() {
        let s: Inbound = serde_json::from_str(r#"{"id":1,"error":"low difficulty"}"#).unwrap();
        assert_eq!(s.error_message().as_deref(), Some("low difficulty"));

        let o: Inbound =
            serde_json::from_str(r#"{"id":1,"error":{"code":23,"message":"stale"}}"#).unwrap();
        assert_eq!(o.error_message().as_deref(), Some("stale"));

        let a: Inbound = serde_json::from_str(r#"{"id":1,"error":[21,"job not found",null]}"#)
            .unwrap();
        assert_eq!(a.error_message().as_deref(), Some("job not found"));
    }
}

// Changelog:
// - v0.2.0: Sum-type dispatch keys; numeric method ids normalized on ingress.
// - v0.1.0: Plain string-keyed request/response/notification model.
