//! Retention sweeps run by the cleanup scheduler

use chrono::{DateTime, Duration, Utc};
use rusqlite::Result as SqliteResult;
use serde::Serialize;

use super::super::sqlite::day_key;
use super::super::Database;

/// Daily counters are kept for a year
const DAILY_STATS_RETENTION_DAYS: i64 = 365;
const API_USAGE_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired_sessions: usize,
    pub old_messages: usize,
    pub old_daily_stats: usize,
    pub old_api_usage: usize,
    pub downgraded_plans: usize,
}

impl Database {
    pub fn run_cleanup(&self, now: DateTime<Utc>, message_retention_days: i64) -> SqliteResult<CleanupReport> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let now_str = now.to_rfc3339();

        let expired_sessions = tx.execute("DELETE FROM auth_sessions WHERE expires_at <= ?1", [&now_str])?;

        let message_cutoff = (now - Duration::days(message_retention_days)).to_rfc3339();
        let old_messages = tx.execute("DELETE FROM messages WHERE created_at < ?1", [&message_cutoff])?;

        let stats_cutoff = day_key((now - Duration::days(DAILY_STATS_RETENTION_DAYS)).date_naive());
        let old_daily_stats = tx.execute("DELETE FROM instance_daily_stats WHERE day < ?1", [&stats_cutoff])?
            + tx.execute("DELETE FROM user_daily_usage WHERE day < ?1", [&stats_cutoff])?;

        let usage_cutoff = (now - Duration::days(API_USAGE_RETENTION_DAYS)).to_rfc3339();
        let old_api_usage = tx.execute("DELETE FROM api_key_usage WHERE created_at < ?1", [&usage_cutoff])?;

        let downgraded_plans = tx.execute(
            "UPDATE profiles SET plan = 'free', plan_expires_at = NULL, updated_at = ?1
             WHERE plan != 'free' AND plan_expires_at IS NOT NULL AND plan_expires_at <= ?1",
            [&now_str],
        )?;

        tx.commit()?;

        Ok(CleanupReport {
            expired_sessions,
            old_messages,
            old_daily_stats,
            old_api_usage,
            downgraded_plans,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_db;
    use crate::models::Plan;

    #[test]
    fn test_cleanup_removes_stale_rows() {
        let db = test_db();
        let user = db.create_user("c@example.com", "hash", None).unwrap();
        db.create_session(&user.id, -1).unwrap();
        let live = db.create_session(&user.id, 24).unwrap();
        db.set_plan(&user.id, Plan::Pro, Some(Utc::now() - Duration::hours(1))).unwrap();

        let report = db.run_cleanup(Utc::now(), 30).unwrap();
        assert_eq!(report.expired_sessions, 1);
        assert_eq!(report.downgraded_plans, 1);
        assert!(db.validate_session(&live.token).unwrap().is_some());

        let profile = db.get_profile(&user.id).unwrap().unwrap();
        assert_eq!(profile.plan, Plan::Free);
        assert!(profile.plan_expires_at.is_none());
    }

    #[test]
    fn test_cleanup_respects_message_retention() {
        let db = test_db();
        let user = db.create_user("r@example.com", "hash", None).unwrap();
        let instance = db.create_instance(&user.id, "main").unwrap();
        db.insert_message(&crate::models::NewMessage {
            instance_id: &instance.id,
            direction: crate::models::MessageDirection::Inbound,
            remote_jid: "1@s.whatsapp.net",
            message_type: "text",
            body: Some("hi"),
            external_id: None,
            status: crate::models::MessageStatus::Received,
        })
        .unwrap();

        // Fresh message survives a normal sweep
        assert_eq!(db.run_cleanup(Utc::now(), 30).unwrap().old_messages, 0);
        // Running "in the future" ages it out
        let later = Utc::now() + Duration::days(31);
        assert_eq!(db.run_cleanup(later, 30).unwrap().old_messages, 1);
    }
}
