use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApiKeyAction {
    Created,
    Regenerated,
    Revoked,
}

/// Audit entry. Only the masked key is ever stored here.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyHistoryEntry {
    pub id: i64,
    pub user_id: String,
    pub masked_key: String,
    pub action: ApiKeyAction,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageDay {
    pub day: NaiveDate,
    pub calls: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointUsage {
    pub endpoint: String,
    pub method: String,
    pub calls: i64,
    pub errors: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiUsageSummary {
    pub total_calls: i64,
    pub days: Vec<UsageDay>,
    pub endpoints: Vec<EndpointUsage>,
}
