//! Host scheduler (Unix socket) messages
//!
//! Requests carry the shared-secret token in plaintext. That is acceptable
//! only because the socket file is permission-scoped to the local user; a
//! transport without equivalent access control must not reuse this format
//! unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Parameter key identifying the conversation that owns a request
pub const CONVERSATION_ID_KEY: &str = "conversation_id";

/// RPC methods exposed by the host scheduler service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulerMethod {
    #[serde(rename = "scheduler.create")]
    Create,
    #[serde(rename = "scheduler.list")]
    List,
    #[serde(rename = "scheduler.cancel")]
    Cancel,
}

impl SchedulerMethod {
    /// Wire name of this method
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "scheduler.create",
            Self::List => "scheduler.list",
            Self::Cancel => "scheduler.cancel",
        }
    }
}

impl std::fmt::Display for SchedulerMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request line written to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub id: u64,
    pub method: SchedulerMethod,
    pub token: String,
    pub params: JsonValue,
}

/// One response line read from the host: `{id, result}` or `{id, error}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonValue>,
}

impl BridgeResponse {
    /// Successful reply for `id`
    pub fn ok(id: u64, result: JsonValue) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Rejection of `id` with a message
    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            result: None,
            error: Some(JsonValue::String(message.into())),
        }
    }

    /// Settle the response into the value the caller sees.
    ///
    /// A present error wins over any result. Hosts are expected to send a
    /// string; anything else is rendered as compact JSON. A missing result
    /// resolves to `null`.
    pub fn into_outcome(self) -> Result<JsonValue, String> {
        match self.error {
            Some(JsonValue::Null) | None => Ok(self.result.unwrap_or(JsonValue::Null)),
            Some(JsonValue::String(message)) => Err(message),
            Some(JsonValue::Object(map)) => match map.get("message").and_then(JsonValue::as_str) {
                Some(message) => Err(message.to_string()),
                None => Err(JsonValue::Object(map).to_string()),
            },
            Some(other) => Err(other.to_string()),
        }
    }
}

/// Unit of a recurring interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    /// Accepted spellings, as listed in the tool schema
    pub const ALL: [&'static str; 3] = ["minutes", "hours", "days"];

    /// Parse a wire spelling
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "minutes" => Some(Self::Minutes),
            "hours" => Some(Self::Hours),
            "days" => Some(Self::Days),
            _ => None,
        }
    }

    /// Wire spelling
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }
}

/// Normalized `scheduler.create` parameters.
///
/// `schedule_time` is always serialized (as `null` when unset) so the host
/// sees the same shape for both trigger kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskParams {
    pub name: String,
    pub prompt: String,
    pub interval_value: u64,
    pub interval_unit: IntervalUnit,
    pub one_shot: bool,
    pub schedule_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request = BridgeRequest {
            id: 4,
            method: SchedulerMethod::Cancel,
            token: "secret".to_string(),
            params: json!({"task_id": 9, "conversation_id": 12}),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 4,
                "method": "scheduler.cancel",
                "token": "secret",
                "params": {"task_id": 9, "conversation_id": 12}
            })
        );
    }

    #[test]
    fn test_response_outcomes() {
        let ok: BridgeResponse = serde_json::from_str(r#"{"id":1,"result":{"id":5}}"#).unwrap();
        assert_eq!(ok.id, Some(1));
        assert_eq!(ok.into_outcome(), Ok(json!({"id": 5})));

        let err: BridgeResponse =
            serde_json::from_str(r#"{"id":2,"error":"Task 7 not found"}"#).unwrap();
        assert_eq!(err.into_outcome(), Err("Task 7 not found".to_string()));

        let empty: BridgeResponse = serde_json::from_str(r#"{"id":3}"#).unwrap();
        assert_eq!(empty.into_outcome(), Ok(JsonValue::Null));

        let structured: BridgeResponse =
            serde_json::from_str(r#"{"id":4,"error":{"code":1,"message":"denied"}}"#).unwrap();
        assert_eq!(structured.into_outcome(), Err("denied".to_string()));
    }

    #[test]
    fn test_create_params_keep_null_schedule_time() {
        let params = CreateTaskParams {
            name: "t".to_string(),
            prompt: "p".to_string(),
            interval_value: 10,
            interval_unit: IntervalUnit::Minutes,
            one_shot: true,
            schedule_time: None,
        };

        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "t",
                "prompt": "p",
                "interval_value": 10,
                "interval_unit": "minutes",
                "one_shot": true,
                "schedule_time": null
            })
        );
    }

    #[test]
    fn test_interval_unit_spellings() {
        for name in IntervalUnit::ALL {
            let unit = IntervalUnit::parse(name).unwrap();
            assert_eq!(unit.as_str(), name);
        }
        assert_eq!(IntervalUnit::parse("weeks"), None);
        assert_eq!(SchedulerMethod::List.to_string(), "scheduler.list");
    }
}
