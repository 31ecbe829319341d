use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Plan;

/// Login identity
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-user account data shown on the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub plan: Plan,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub api_key: Option<String>,
    pub api_key_created_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// The plan whose limits currently apply. Paid plans past their expiry
    /// fall back to free until cleanup rewrites the row.
    pub fn effective_plan(&self, now: DateTime<Utc>) -> Plan {
        match self.plan_expires_at {
            Some(expires_at) if self.plan != Plan::Free && expires_at <= now => Plan::Free,
            _ => self.plan,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
}
