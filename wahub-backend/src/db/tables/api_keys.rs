//! API key audit trail and usage log

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Result as SqliteResult;
use std::str::FromStr;

use super::super::sqlite::{parse_day, parse_timestamp};
use super::super::Database;
use crate::models::{ApiKeyAction, ApiKeyHistoryEntry, ApiUsageSummary, EndpointUsage, UsageDay};

impl Database {
    pub fn add_api_key_history(&self, user_id: &str, masked_key: &str, action: ApiKeyAction) -> SqliteResult<()> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO api_key_history (user_id, masked_key, action, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id, masked_key, action.to_string(), &now],
        )?;
        Ok(())
    }

    /// Newest first
    pub fn list_api_key_history(&self, user_id: &str, limit: usize) -> SqliteResult<Vec<ApiKeyHistoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, masked_key, action, created_at FROM api_key_history
             WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let entries = stmt
            .query_map(rusqlite::params![user_id, limit as i64], |row| {
                let action: String = row.get(3)?;
                let created_at: String = row.get(4)?;
                Ok(ApiKeyHistoryEntry {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    masked_key: row.get(2)?,
                    action: ApiKeyAction::from_str(&action).unwrap_or(ApiKeyAction::Created),
                    created_at: parse_timestamp(&created_at),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(entries)
    }

    pub fn record_api_usage(&self, user_id: &str, endpoint: &str, method: &str, status_code: u16) -> SqliteResult<()> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO api_key_usage (user_id, endpoint, method, status_code, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![user_id, endpoint, method, status_code, &now],
        )?;
        Ok(())
    }

    /// Usage since `since`: per-day counts (only days with calls) and per-endpoint totals
    pub fn api_usage_since(&self, user_id: &str, since: DateTime<Utc>) -> SqliteResult<ApiUsageSummary> {
        let conn = self.conn.lock();
        let since = since.to_rfc3339();

        let mut stmt = conn.prepare(
            "SELECT substr(created_at, 1, 10) AS day, COUNT(*)
             FROM api_key_usage WHERE user_id = ?1 AND created_at >= ?2
             GROUP BY day ORDER BY day",
        )?;
        let days: Vec<UsageDay> = stmt
            .query_map(rusqlite::params![user_id, &since], |row| {
                let day: String = row.get(0)?;
                Ok(UsageDay {
                    day: parse_day(&day),
                    calls: row.get(1)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        let mut stmt = conn.prepare(
            "SELECT endpoint, method, COUNT(*), SUM(CASE WHEN status_code >= 400 THEN 1 ELSE 0 END)
             FROM api_key_usage WHERE user_id = ?1 AND created_at >= ?2
             GROUP BY endpoint, method ORDER BY COUNT(*) DESC, endpoint",
        )?;
        let endpoints: Vec<EndpointUsage> = stmt
            .query_map(rusqlite::params![user_id, &since], |row| {
                Ok(EndpointUsage {
                    endpoint: row.get(0)?,
                    method: row.get(1)?,
                    calls: row.get(2)?,
                    errors: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(ApiUsageSummary {
            total_calls: endpoints.iter().map(|e| e.calls).sum(),
            days,
            endpoints,
        })
    }
}

/// Fill the per-day usage series so every day in `[first, last]` is present
pub fn fill_usage_days(days: Vec<UsageDay>, first: NaiveDate, last: NaiveDate) -> Vec<UsageDay> {
    let mut filled = Vec::new();
    let mut cursor = first;
    let mut iter = days.into_iter().peekable();

    while cursor <= last {
        // Skip stored days before the window
        while iter.peek().map(|d| d.day < cursor).unwrap_or(false) {
            iter.next();
        }
        match iter.peek() {
            Some(d) if d.day == cursor => {
                filled.push(UsageDay { day: cursor, calls: d.calls });
                iter.next();
            }
            _ => filled.push(UsageDay { day: cursor, calls: 0 }),
        }
        match cursor.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }

    filled
}
