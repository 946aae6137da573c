//! JSON response envelope shared by every operation.
//!
//! Success: `{"type": .., "status": "success", "data": ..}`.
//! Anything else: `{"type": .., "status": <label>, "info": <message>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;

pub const TYPE_PING: &str = "ping";
pub const TYPE_CARD: &str = "sndcard";
pub const TYPE_CARD_LIST: &str = "sndlist";
pub const TYPE_CONTROLS: &str = "ctrls";
pub const TYPE_SESSION: &str = "session";
pub const TYPE_SESSION_LIST: &str = "sessions";
pub const TYPE_SESSION_INFO: &str = "session_info";
pub const TYPE_MESSAGE: &str = "message";

/// Status label, declared in logging severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    False,
    True,
    Fatal,
    Fail,
    Warning,
    Empty,
    Success,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::False => "false",
            Self::True => "true",
            Self::Fatal => "fatal",
            Self::Fail => "fail",
            Self::Warning => "warning",
            Self::Empty => "empty",
            Self::Success => "success",
        }
    }

    /// Whether a caller should treat the response as an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Fatal | Self::Fail)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl Response {
    pub fn success(kind: &str, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            status: Status::Success,
            data: Some(data),
            info: None,
        }
    }

    /// Status message without payload. Logged at a level matching `status`.
    pub fn message(kind: &str, status: Status, info: impl Into<String>) -> Self {
        let info = info.into();
        match status {
            Status::Fatal => error!(kind, %status, "{info}"),
            Status::Fail | Status::Warning => warn!(kind, %status, "{info}"),
            Status::Empty => info!(kind, %status, "{info}"),
            _ => debug!(kind, %status, "{info}"),
        }
        Self {
            kind: kind.to_string(),
            status,
            data: None,
            info: Some(info),
        }
    }

    pub fn from_error(kind: &str, err: &EngineError) -> Self {
        Self::message(kind, err.status(), err.to_string())
    }

    /// Wrap an operation result: `Ok` becomes a success envelope.
    pub fn from_result(kind: &str, result: Result<Value, EngineError>) -> Self {
        match result {
            Ok(data) => Self::success(kind, data),
            Err(err) => Self::from_error(kind, &err),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_shape() {
        let resp = Response::success(TYPE_PING, json!({"ping": 1}));
        assert_eq!(
            resp.to_json(),
            json!({"type": "ping", "status": "success", "data": {"ping": 1}})
        );
    }

    #[test]
    fn test_message_envelope_shape() {
        let resp = Response::message(TYPE_MESSAGE, Status::Empty, "no sound card found");
        assert_eq!(
            resp.to_json(),
            json!({"type": "message", "status": "empty", "info": "no sound card found"})
        );
    }

    #[test]
    fn test_severity_order() {
        let mut labels = vec![
            Status::Success,
            Status::Fatal,
            Status::Empty,
            Status::False,
            Status::Warning,
            Status::Fail,
            Status::True,
        ];
        labels.sort();
        let names: Vec<_> = labels.iter().map(Status::as_str).collect();
        assert_eq!(
            names,
            ["false", "true", "fatal", "fail", "warning", "empty", "success"]
        );
    }

    #[test]
    fn test_from_error_uses_error_status() {
        let err = EngineError::ReadOnly { numid: 3 };
        let resp = Response::from_error(TYPE_CONTROLS, &err);
        assert_eq!(resp.status, Status::Fail);
        assert!(resp.info.unwrap().contains("read-only"));
        assert!(resp.status.is_error());
    }
}
