//! Instance (WhatsApp session) database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult};
use std::str::FromStr;
use uuid::Uuid;

use super::super::sqlite::{parse_optional_timestamp, parse_timestamp};
use super::super::Database;
use crate::models::{Instance, InstanceStatus};

const INSTANCE_COLUMNS: &str = "id, user_id, name, status, phone_number, proxy_url, webhook_url,
     messages_sent, messages_received, last_seen_at, created_at, updated_at";

impl Database {
    fn row_to_instance(row: &rusqlite::Row) -> rusqlite::Result<Instance> {
        let status_str: String = row.get(3)?;
        let created_at: String = row.get(10)?;
        let updated_at: String = row.get(11)?;

        Ok(Instance {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            status: InstanceStatus::from_str(&status_str).unwrap_or(InstanceStatus::Disconnected),
            phone_number: row.get(4)?,
            proxy_url: row.get(5)?,
            webhook_url: row.get(6)?,
            messages_sent: row.get(7)?,
            messages_received: row.get(8)?,
            last_seen_at: parse_optional_timestamp(row.get(9)?),
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    pub fn create_instance(&self, user_id: &str, name: &str) -> SqliteResult<Instance> {
        let conn = self.conn.lock();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        conn.execute(
            "INSERT INTO instances (id, user_id, name, status, created_at, updated_at) VALUES (?1, ?2, ?3, 'created', ?4, ?4)",
            rusqlite::params![&id, user_id, name, &now_str],
        )?;

        Ok(Instance {
            id,
            user_id: user_id.to_string(),
            name: name.to_string(),
            status: InstanceStatus::Created,
            phone_number: None,
            proxy_url: None,
            webhook_url: None,
            messages_sent: 0,
            messages_received: 0,
            last_seen_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn list_instances(&self, user_id: &str) -> SqliteResult<Vec<Instance>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM instances WHERE user_id = ?1 ORDER BY created_at",
            INSTANCE_COLUMNS
        ))?;

        let instances = stmt
            .query_map([user_id], Self::row_to_instance)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(instances)
    }

    pub fn count_instances(&self, user_id: &str) -> SqliteResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM instances WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Get an instance by id regardless of owner (webhook path)
    pub fn get_instance(&self, instance_id: &str) -> SqliteResult<Option<Instance>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM instances WHERE id = ?1", INSTANCE_COLUMNS),
            [instance_id],
            Self::row_to_instance,
        )
        .optional()
    }

    /// Get an instance only if it belongs to `user_id`
    pub fn get_user_instance(&self, user_id: &str, instance_id: &str) -> SqliteResult<Option<Instance>> {
        Ok(self
            .get_instance(instance_id)?
            .filter(|instance| instance.user_id == user_id))
    }

    pub fn delete_instance(&self, instance_id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows_affected = conn.execute("DELETE FROM instances WHERE id = ?1", [instance_id])?;
        Ok(rows_affected > 0)
    }

    /// Record a status change; the phone number is only overwritten when known
    pub fn update_instance_status(
        &self,
        instance_id: &str,
        status: InstanceStatus,
        phone_number: Option<&str>,
    ) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let rows_affected = conn.execute(
            "UPDATE instances SET
                status = ?1,
                phone_number = COALESCE(?2, phone_number),
                last_seen_at = CASE WHEN ?1 = 'connected' THEN ?3 ELSE last_seen_at END,
                updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![status.to_string(), phone_number, &now, instance_id],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn set_instance_proxy(&self, instance_id: &str, proxy_url: Option<&str>) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let rows_affected = conn.execute(
            "UPDATE instances SET proxy_url = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![proxy_url, &now, instance_id],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn set_instance_webhook(&self, instance_id: &str, webhook_url: Option<&str>) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let rows_affected = conn.execute(
            "UPDATE instances SET webhook_url = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![webhook_url, &now, instance_id],
        )?;
        Ok(rows_affected > 0)
    }
}
