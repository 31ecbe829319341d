use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a WhatsApp session as last reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InstanceStatus {
    Created,
    Connecting,
    Qr,
    Connected,
    Disconnected,
    LoggedOut,
}

impl InstanceStatus {
    /// Map a backend connection state onto our status.
    /// Accepts both Baileys-style (`open`/`close`) and descriptive names.
    pub fn from_backend_state(state: &str) -> Option<Self> {
        match state.trim().to_lowercase().as_str() {
            "open" | "connected" | "ready" => Some(Self::Connected),
            "connecting" | "opening" | "starting" => Some(Self::Connecting),
            "qr" | "qrcode" | "scan_qr" | "pairing" => Some(Self::Qr),
            "close" | "closed" | "disconnected" => Some(Self::Disconnected),
            "logged_out" | "loggedout" | "logout" => Some(Self::LoggedOut),
            "created" | "idle" => Some(Self::Created),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub status: InstanceStatus,
    pub phone_number: Option<String>,
    pub proxy_url: Option<String>,
    pub webhook_url: Option<String>,
    pub messages_sent: i64,
    pub messages_received: i64,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInstanceRequest {
    pub name: String,
}

/// Instance names become part of backend URLs, so keep them URL-safe
pub fn validate_instance_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 64 {
        return Err("Instance name must be between 1 and 64 characters".to_string());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err("Instance name may only contain letters, digits, '-' and '_'".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_backend_state() {
        assert_eq!(InstanceStatus::from_backend_state("open"), Some(InstanceStatus::Connected));
        assert_eq!(InstanceStatus::from_backend_state("CLOSE"), Some(InstanceStatus::Disconnected));
        assert_eq!(InstanceStatus::from_backend_state("logged_out"), Some(InstanceStatus::LoggedOut));
        assert_eq!(InstanceStatus::from_backend_state("weird"), None);
    }

    #[test]
    fn test_status_round_trips_through_text() {
        use std::str::FromStr;
        assert_eq!(InstanceStatus::LoggedOut.to_string(), "logged_out");
        assert_eq!(InstanceStatus::from_str("qr").unwrap(), InstanceStatus::Qr);
    }

    #[test]
    fn test_validate_instance_name() {
        assert!(validate_instance_name("sales-team_1").is_ok());
        assert!(validate_instance_name("").is_err());
        assert!(validate_instance_name("has space").is_err());
        assert!(validate_instance_name(&"x".repeat(65)).is_err());
    }
}
