//! Message log database operations

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};
use std::str::FromStr;

use super::super::sqlite::parse_timestamp;
use super::super::Database;
use crate::models::{ChatSummary, Message, MessageDirection, MessageStatus, NewMessage};

impl Database {
    pub fn insert_message(&self, message: &NewMessage) -> SqliteResult<i64> {
        let conn = self.conn.lock();
        Self::insert_message_row(&conn, message)
    }

    /// Insert unless the backend id is already logged for the instance.
    /// Check and insert share one lock, so the send path and the webhook
    /// echo of the same message cannot both log it. Returns whether a row
    /// was written.
    pub fn insert_message_once(&self, message: &NewMessage) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        if let Some(external_id) = message.external_id {
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM messages WHERE instance_id = ?1 AND external_id = ?2 LIMIT 1",
                    [message.instance_id, external_id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if exists {
                return Ok(false);
            }
        }
        Self::insert_message_row(&conn, message)?;
        Ok(true)
    }

    fn insert_message_row(conn: &Connection, message: &NewMessage) -> SqliteResult<i64> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO messages (instance_id, direction, remote_jid, message_type, body, external_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                message.instance_id,
                message.direction.to_string(),
                message.remote_jid,
                message.message_type,
                message.body,
                message.external_id,
                message.status.to_string(),
                &now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Whether a backend message id is already logged for the instance
    pub fn message_exists(&self, instance_id: &str, external_id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE instance_id = ?1 AND external_id = ?2",
            [instance_id, external_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Most recent messages first, optionally restricted to one conversation
    pub fn list_messages(
        &self,
        instance_id: &str,
        remote_jid: Option<&str>,
        limit: usize,
    ) -> SqliteResult<Vec<Message>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, instance_id, direction, remote_jid, message_type, body, external_id, status, created_at
             FROM messages
             WHERE instance_id = ?1 AND (?2 IS NULL OR remote_jid = ?2)
             ORDER BY id DESC
             LIMIT ?3",
        )?;

        let messages = stmt
            .query_map(rusqlite::params![instance_id, remote_jid, limit as i64], |row| {
                let direction: String = row.get(2)?;
                let status: String = row.get(7)?;
                let created_at: String = row.get(8)?;
                Ok(Message {
                    id: row.get(0)?,
                    instance_id: row.get(1)?,
                    direction: MessageDirection::from_str(&direction).unwrap_or(MessageDirection::Inbound),
                    remote_jid: row.get(3)?,
                    message_type: row.get(4)?,
                    body: row.get(5)?,
                    external_id: row.get(6)?,
                    status: MessageStatus::from_str(&status).unwrap_or(MessageStatus::Pending),
                    created_at: parse_timestamp(&created_at),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(messages)
    }

    /// One entry per conversation, most recently active first
    pub fn list_chats(&self, instance_id: &str, limit: usize) -> SqliteResult<Vec<ChatSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT m.remote_jid, m.body, m.direction, m.created_at, c.total
             FROM messages m
             JOIN (
                SELECT remote_jid, MAX(id) AS last_id, COUNT(*) AS total
                FROM messages WHERE instance_id = ?1 GROUP BY remote_jid
             ) c ON c.last_id = m.id
             ORDER BY m.id DESC
             LIMIT ?2",
        )?;

        let chats = stmt
            .query_map(rusqlite::params![instance_id, limit as i64], |row| {
                let direction: String = row.get(2)?;
                let created_at: String = row.get(3)?;
                Ok(ChatSummary {
                    remote_jid: row.get(0)?,
                    last_body: row.get(1)?,
                    last_direction: MessageDirection::from_str(&direction).unwrap_or(MessageDirection::Inbound),
                    last_message_at: parse_timestamp(&created_at),
                    message_count: row.get(4)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(chats)
    }

    /// Apply a delivery ack. Acks may arrive out of order, so a status only
    /// moves forward, except `failed` which always applies.
    pub fn update_message_status(
        &self,
        instance_id: &str,
        external_id: &str,
        status: MessageStatus,
    ) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let current: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, status FROM messages WHERE instance_id = ?1 AND external_id = ?2 ORDER BY id DESC LIMIT 1",
                [instance_id, external_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, current_status)) = current else {
            return Ok(false);
        };

        let current_status = MessageStatus::from_str(&current_status).unwrap_or(MessageStatus::Pending);
        if status != MessageStatus::Failed && status <= current_status {
            return Ok(false);
        }

        conn.execute(
            "UPDATE messages SET status = ?1 WHERE id = ?2",
            rusqlite::params![status.to_string(), id],
        )?;
        Ok(true)
    }
}
