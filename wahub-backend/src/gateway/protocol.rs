use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event types pushed to dashboard clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    // Instance events
    InstanceStatus,
    InstanceQr,
    // Message events
    MessageReceived,
    MessageSent,
    MessageStatus,
    // Bulk send events
    BulkProgress,
    BulkCompleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InstanceStatus => "instance.status",
            Self::InstanceQr => "instance.qr",
            Self::MessageReceived => "message.received",
            Self::MessageSent => "message.sent",
            Self::MessageStatus => "message.status",
            Self::BulkProgress => "bulk.progress",
            Self::BulkCompleted => "bulk.completed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_string()
    }
}

/// JSON-RPC request from client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: String, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: String, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    pub fn method_not_found() -> Self {
        Self::new(-32601, "Method not found")
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(-32602, message)
    }
}

/// Server-push event to a user's connected clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    #[serde(rename = "type")]
    pub type_: String,
    pub event: String,
    pub data: Value,
}

impl GatewayEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            type_: "event".to_string(),
            event: event.into(),
            data,
        }
    }

    pub fn instance_status(instance_id: &str, status: &str, phone_number: Option<&str>) -> Self {
        Self::new(
            EventType::InstanceStatus,
            serde_json::json!({
                "instance_id": instance_id,
                "status": status,
                "phone_number": phone_number
            }),
        )
    }

    pub fn instance_qr(instance_id: &str, qr: &str) -> Self {
        Self::new(
            EventType::InstanceQr,
            serde_json::json!({
                "instance_id": instance_id,
                "qr": qr
            }),
        )
    }

    pub fn message_received(instance_id: &str, from: &str, push_name: Option<&str>, body: Option<&str>) -> Self {
        Self::new(
            EventType::MessageReceived,
            serde_json::json!({
                "instance_id": instance_id,
                "from": from,
                "push_name": push_name,
                "body": body,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }),
        )
    }

    /// Outbound message seen by the backend, including ones typed on the phone
    pub fn message_sent(instance_id: &str, to: &str, message_id: Option<&str>, body: Option<&str>) -> Self {
        Self::new(
            EventType::MessageSent,
            serde_json::json!({
                "instance_id": instance_id,
                "to": to,
                "message_id": message_id,
                "body": body,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }),
        )
    }

    pub fn message_status(instance_id: &str, message_id: &str, status: &str) -> Self {
        Self::new(
            EventType::MessageStatus,
            serde_json::json!({
                "instance_id": instance_id,
                "message_id": message_id,
                "status": status
            }),
        )
    }

    pub fn bulk_progress(job_id: &str, current: usize, total: usize, succeeded: usize, failed: usize) -> Self {
        Self::new(
            EventType::BulkProgress,
            serde_json::json!({
                "job_id": job_id,
                "current": current,
                "total": total,
                "succeeded": succeeded,
                "failed": failed
            }),
        )
    }

    pub fn bulk_completed(job_id: &str, stopped: bool, succeeded: usize, failed: usize) -> Self {
        Self::new(
            EventType::BulkCompleted,
            serde_json::json!({
                "job_id": job_id,
                "stopped": stopped,
                "succeeded": succeeded,
                "failed": failed
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = GatewayEvent::instance_qr("inst-1", "2@qr");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["event"], "instance.qr");
        assert_eq!(json["data"]["qr"], "2@qr");
    }

    #[test]
    fn test_rpc_request_defaults_params() {
        let req: RpcRequest = serde_json::from_str(r#"{"id": "1", "method": "ping"}"#).unwrap();
        assert!(req.params.is_null());
    }
}
