use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    #[default]
    Contains,
    StartsWith,
    Regex,
}

/// A single keyword → reply rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatbotRule {
    #[serde(default)]
    pub id: String,
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
    pub reply: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Chatbot configuration of one instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceChatbot {
    pub instance_id: String,
    pub enabled: bool,
    pub rules: Vec<ChatbotRule>,
    pub fallback_reply: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl InstanceChatbot {
    pub fn disabled(instance_id: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            enabled: false,
            rules: Vec::new(),
            fallback_reply: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateChatbotRequest {
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<ChatbotRule>,
    pub fallback_reply: Option<String>,
}
