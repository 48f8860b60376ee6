use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{DomainError, Result, RpcError, UNKNOWN_PATTERN};

/// Token linking a request envelope to its reply.
///
/// Serialized as the hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Request published on a worker's channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub pattern: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub correlation_id: CorrelationId,
}

impl RequestEnvelope {
    pub fn new(
        pattern: impl Into<String>,
        payload: serde_json::Value,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            payload,
            correlation_id,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Error descriptor carried by a failed reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: String,
    pub message: String,
}

impl From<DomainError> for ErrorDescriptor {
    fn from(err: DomainError) -> Self {
        Self {
            kind: err.kind,
            message: err.message,
        }
    }
}

/// Either the handler's payload or its error descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplyBody {
    Payload(serde_json::Value),
    Error(ErrorDescriptor),
}

/// Reply published to the caller's reply queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    pub correlation_id: CorrelationId,
    #[serde(flatten)]
    pub body: ReplyBody,
}

impl ReplyEnvelope {
    pub fn success(correlation_id: CorrelationId, payload: serde_json::Value) -> Self {
        Self {
            correlation_id,
            body: ReplyBody::Payload(payload),
        }
    }

    pub fn failure(
        correlation_id: CorrelationId,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id,
            body: ReplyBody::Error(ErrorDescriptor {
                kind: kind.into(),
                message: message.into(),
            }),
        }
    }

    pub fn unknown_pattern(correlation_id: CorrelationId, pattern: &str) -> Self {
        Self::failure(
            correlation_id,
            UNKNOWN_PATTERN,
            format!("No handler registered for pattern: {}", pattern),
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self.body, ReplyBody::Payload(_))
    }

    /// Turn the reply into the caller-facing outcome.
    ///
    /// `UnknownPattern` is a deployment fault and surfaces as a transport
    /// error; every other error kind is the worker's domain error.
    pub fn into_outcome(self, pattern: &str) -> std::result::Result<serde_json::Value, RpcError> {
        match self.body {
            ReplyBody::Payload(payload) => Ok(payload),
            ReplyBody::Error(err) if err.kind == UNKNOWN_PATTERN => Err(RpcError::UnknownPattern {
                pattern: pattern.to_string(),
            }),
            ReplyBody::Error(err) => Err(RpcError::Domain(DomainError::new(err.kind, err.message))),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let id = CorrelationId::new();
        let request = RequestEnvelope::new("center.create", json!({"name": "north"}), id);
        let wire: serde_json::Value = serde_json::from_slice(&request.to_bytes().unwrap()).unwrap();

        assert_eq!(wire["pattern"], "center.create");
        assert_eq!(wire["payload"]["name"], "north");
        assert_eq!(wire["correlationId"], id.to_string());
    }

    #[test]
    fn test_reply_wire_format() {
        let id = CorrelationId::new();
        let ok = serde_json::to_value(ReplyEnvelope::success(id, json!({"id": 1}))).unwrap();
        assert_eq!(ok, json!({"correlationId": id.to_string(), "payload": {"id": 1}}));

        let failed = serde_json::to_value(ReplyEnvelope::failure(id, "NotFound", "User not found")).unwrap();
        assert_eq!(
            failed,
            json!({
                "correlationId": id.to_string(),
                "error": {"kind": "NotFound", "message": "User not found"}
            })
        );
    }

    #[test]
    fn test_reply_parses_from_worker_json() {
        let id = CorrelationId::new();
        let raw = format!(r#"{{"correlationId":"{}","error":{{"kind":"Conflict","message":"dup"}}}}"#, id);
        let reply = ReplyEnvelope::from_bytes(raw.as_bytes()).unwrap();

        assert_eq!(reply.correlation_id, id);
        assert!(!reply.is_success());
        assert_eq!(
            reply.into_outcome("user.create"),
            Err(RpcError::Domain(DomainError::conflict("dup")))
        );
    }

    #[test]
    fn test_unknown_pattern_outcome_is_transport_error() {
        let reply = ReplyEnvelope::unknown_pattern(CorrelationId::new(), "center.explode");
        let outcome = reply.into_outcome("center.explode");

        assert_eq!(
            outcome,
            Err(RpcError::UnknownPattern {
                pattern: "center.explode".to_string()
            })
        );
    }

    #[test]
    fn test_request_without_payload_defaults_to_null() {
        let id = CorrelationId::new();
        let raw = format!(r#"{{"pattern":"user.getAll","correlationId":"{}"}}"#, id);
        let request = RequestEnvelope::from_bytes(raw.as_bytes()).unwrap();
        assert_eq!(request.payload, serde_json::Value::Null);
    }
}
