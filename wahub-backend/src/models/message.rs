use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// Delivery status, ordered by progress
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageStatus {
    Failed,
    Pending,
    Sent,
    Delivered,
    Read,
    Received,
}

impl MessageStatus {
    /// Map a backend ack value. Numeric acks follow the WhatsApp Web convention
    /// (0 pending, 1 server, 2 device, 3 read, 4 played).
    pub fn from_ack(ack: &serde_json::Value) -> Option<Self> {
        if let Some(n) = ack.as_i64() {
            return match n {
                i64::MIN..=-1 => Some(Self::Failed),
                0 => Some(Self::Pending),
                1 => Some(Self::Sent),
                2 => Some(Self::Delivered),
                _ => Some(Self::Read),
            };
        }
        match ack.as_str()?.to_lowercase().as_str() {
            "error" | "failed" => Some(Self::Failed),
            "pending" => Some(Self::Pending),
            "server_ack" | "sent" => Some(Self::Sent),
            "delivery_ack" | "delivered" => Some(Self::Delivered),
            "read" | "played" => Some(Self::Read),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub instance_id: String,
    pub direction: MessageDirection,
    pub remote_jid: String,
    pub message_type: String,
    pub body: Option<String>,
    pub external_id: Option<String>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

/// Row to insert into the message log
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub instance_id: &'a str,
    pub direction: MessageDirection,
    pub remote_jid: &'a str,
    pub message_type: &'a str,
    pub body: Option<&'a str>,
    pub external_id: Option<&'a str>,
    pub status: MessageStatus,
}

/// Conversation list entry for the chat UI
#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
    pub remote_jid: String,
    pub last_body: Option<String>,
    pub last_direction: MessageDirection,
    pub last_message_at: DateTime<Utc>,
    pub message_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_ack() {
        assert_eq!(MessageStatus::from_ack(&json!(2)), Some(MessageStatus::Delivered));
        assert_eq!(MessageStatus::from_ack(&json!(4)), Some(MessageStatus::Read));
        assert_eq!(MessageStatus::from_ack(&json!(-1)), Some(MessageStatus::Failed));
        assert_eq!(MessageStatus::from_ack(&json!("SERVER_ACK")), Some(MessageStatus::Sent));
        assert_eq!(MessageStatus::from_ack(&json!("nope")), None);
        assert_eq!(MessageStatus::from_ack(&json!(null)), None);
    }
}
