//! Daily counters, per instance and per user
//!
//! Instance rows go away with their instance. The per-user rows do not, so
//! quota checks and dashboard history survive instance deletion.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Result as SqliteResult;

use super::super::sqlite::{day_key, parse_day};
use super::super::Database;
use crate::models::{DailyQuota, DailyStat, Plan};

/// Increments applied to one instance for one day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatDelta {
    pub sent: i64,
    pub received: i64,
    pub chatbot_replies: i64,
}

impl StatDelta {
    pub fn sent(n: i64) -> Self {
        Self { sent: n, ..Default::default() }
    }

    pub fn received(n: i64) -> Self {
        Self { received: n, ..Default::default() }
    }

    pub fn chatbot_reply() -> Self {
        Self {
            sent: 1,
            chatbot_replies: 1,
            ..Default::default()
        }
    }
}

impl Database {
    /// Add to the day's counters and the instance's lifetime totals atomically
    pub fn record_stats(&self, instance_id: &str, day: NaiveDate, delta: StatDelta) -> SqliteResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO instance_daily_stats (instance_id, day, messages_sent, messages_received, chatbot_replies)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(instance_id, day) DO UPDATE SET
                messages_sent = messages_sent + excluded.messages_sent,
                messages_received = messages_received + excluded.messages_received,
                chatbot_replies = chatbot_replies + excluded.chatbot_replies",
            rusqlite::params![instance_id, day_key(day), delta.sent, delta.received, delta.chatbot_replies],
        )?;

        // WHERE keeps the upsert unambiguous for SQLite's parser
        tx.execute(
            "INSERT INTO user_daily_usage (user_id, day, messages_sent, messages_received, chatbot_replies)
             SELECT user_id, ?2, ?3, ?4, ?5 FROM instances WHERE id = ?1
             ON CONFLICT(user_id, day) DO UPDATE SET
                messages_sent = messages_sent + excluded.messages_sent,
                messages_received = messages_received + excluded.messages_received,
                chatbot_replies = chatbot_replies + excluded.chatbot_replies",
            rusqlite::params![instance_id, day_key(day), delta.sent, delta.received, delta.chatbot_replies],
        )?;

        tx.execute(
            "UPDATE instances SET
                messages_sent = messages_sent + ?1,
                messages_received = messages_received + ?2
             WHERE id = ?3",
            rusqlite::params![delta.sent, delta.received, instance_id],
        )?;

        tx.commit()
    }

    /// Stored rows for one instance in `[from, to]`, ascending
    pub fn get_daily_stats(&self, instance_id: &str, from: NaiveDate, to: NaiveDate) -> SqliteResult<Vec<DailyStat>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT day, messages_sent, messages_received, chatbot_replies
             FROM instance_daily_stats
             WHERE instance_id = ?1 AND day >= ?2 AND day <= ?3
             ORDER BY day",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![instance_id, day_key(from), day_key(to)], Self::row_to_daily_stat)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }

    /// A user's counters per day, including instances deleted since
    pub fn get_user_daily_stats(&self, user_id: &str, from: NaiveDate, to: NaiveDate) -> SqliteResult<Vec<DailyStat>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT day, messages_sent, messages_received, chatbot_replies
             FROM user_daily_usage
             WHERE user_id = ?1 AND day >= ?2 AND day <= ?3
             ORDER BY day",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![user_id, day_key(from), day_key(to)], Self::row_to_daily_stat)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }

    /// Messages a user sent on `day`, whichever instance sent them
    pub fn messages_sent_on(&self, user_id: &str, day: NaiveDate) -> SqliteResult<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COALESCE(SUM(messages_sent), 0) FROM user_daily_usage WHERE user_id = ?1 AND day = ?2",
            rusqlite::params![user_id, day_key(day)],
            |row| row.get(0),
        )
    }

    /// Today's allowance under the user's effective plan
    pub fn daily_quota(&self, user_id: &str, now: DateTime<Utc>) -> SqliteResult<DailyQuota> {
        let plan = self
            .get_profile(user_id)?
            .map(|p| p.effective_plan(now))
            .unwrap_or(Plan::Free);
        let sent_today = self.messages_sent_on(user_id, now.date_naive())?;
        Ok(DailyQuota {
            plan,
            limit: plan.limits().daily_message_limit,
            sent_today,
        })
    }

    fn row_to_daily_stat(row: &rusqlite::Row) -> rusqlite::Result<DailyStat> {
        let day: String = row.get(0)?;
        Ok(DailyStat {
            day: parse_day(&day),
            messages_sent: row.get(1)?,
            messages_received: row.get(2)?,
            chatbot_replies: row.get(3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_db;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_record_stats_accumulates() {
        let db = test_db();
        let user = db.create_user("st@example.com", "hash", None).unwrap();
        let a = db.create_instance(&user.id, "a").unwrap();
        let b = db.create_instance(&user.id, "b").unwrap();

        db.record_stats(&a.id, day("2024-05-01"), StatDelta::sent(2)).unwrap();
        db.record_stats(&a.id, day("2024-05-01"), StatDelta::received(3)).unwrap();
        db.record_stats(&a.id, day("2024-05-01"), StatDelta::chatbot_reply()).unwrap();
        db.record_stats(&b.id, day("2024-05-01"), StatDelta::sent(4)).unwrap();
        db.record_stats(&a.id, day("2024-05-02"), StatDelta::sent(1)).unwrap();

        let rows = db.get_daily_stats(&a.id, day("2024-05-01"), day("2024-05-02")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].messages_sent, 3);
        assert_eq!(rows[0].messages_received, 3);
        assert_eq!(rows[0].chatbot_replies, 1);

        assert_eq!(db.messages_sent_on(&user.id, day("2024-05-01")).unwrap(), 7);
        assert_eq!(db.messages_sent_on(&user.id, day("2024-05-03")).unwrap(), 0);

        let combined = db.get_user_daily_stats(&user.id, day("2024-05-01"), day("2024-05-01")).unwrap();
        assert_eq!(combined[0].messages_sent, 7);

        let instance = db.get_instance(&a.id).unwrap().unwrap();
        assert_eq!(instance.messages_sent, 4);
        assert_eq!(instance.messages_received, 3);
    }

    #[test]
    fn test_usage_survives_instance_deletion() {
        let db = test_db();
        let user = db.create_user("quota@example.com", "hash", None).unwrap();
        let now = Utc::now();
        let first = db.create_instance(&user.id, "main").unwrap();

        db.record_stats(&first.id, now.date_naive(), StatDelta::sent(100)).unwrap();
        assert!(!db.daily_quota(&user.id, now).unwrap().allows(1));

        assert!(db.delete_instance(&first.id).unwrap());
        let second = db.create_instance(&user.id, "main").unwrap();
        assert_ne!(first.id, second.id);

        let quota = db.daily_quota(&user.id, now).unwrap();
        assert_eq!(quota.sent_today, 100);
        assert!(!quota.allows(1));

        let history = db.get_user_daily_stats(&user.id, now.date_naive(), now.date_naive()).unwrap();
        assert_eq!(history[0].messages_sent, 100);
        assert!(db.get_daily_stats(&first.id, now.date_naive(), now.date_naive()).unwrap().is_empty());
    }
}
