//! SQLite database - schema definitions and connection management
//!
//! This file contains:
//! - Database struct definition
//! - Connection management (new, init)
//! - Schema creation and migrations
//!
//! All table operations live in the tables/ subdirectory.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;

/// Main database wrapper, one connection serialised by a Mutex
pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    /// Create a new database connection and initialize schema
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        if database_url == ":memory:" {
            return Self::from_connection(Connection::open_in_memory()?);
        }

        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        Self::from_connection(Connection::open(database_url)?)
    }

    fn from_connection(conn: Connection) -> SqliteResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Initialize all database tables and run migrations
    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                name TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT UNIQUE NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                full_name TEXT,
                company TEXT,
                phone TEXT,
                plan TEXT NOT NULL DEFAULT 'free',
                plan_expires_at TEXT,
                api_key TEXT UNIQUE,
                api_key_created_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS instances (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'created',
                phone_number TEXT,
                proxy_url TEXT,
                webhook_url TEXT,
                messages_sent INTEGER NOT NULL DEFAULT 0,
                messages_received INTEGER NOT NULL DEFAULT 0,
                last_seen_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, name),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Historical daily counters, one row per instance and UTC day
        conn.execute(
            "CREATE TABLE IF NOT EXISTS instance_daily_stats (
                instance_id TEXT NOT NULL,
                day TEXT NOT NULL,
                messages_sent INTEGER NOT NULL DEFAULT 0,
                messages_received INTEGER NOT NULL DEFAULT 0,
                chatbot_replies INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (instance_id, day),
                FOREIGN KEY (instance_id) REFERENCES instances(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Per-user daily usage, outlives the instances that produced it
        conn.execute(
            "CREATE TABLE IF NOT EXISTS user_daily_usage (
                user_id TEXT NOT NULL,
                day TEXT NOT NULL,
                messages_sent INTEGER NOT NULL DEFAULT 0,
                messages_received INTEGER NOT NULL DEFAULT 0,
                chatbot_replies INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, day),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instance_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                remote_jid TEXT NOT NULL,
                message_type TEXT NOT NULL DEFAULT 'text',
                body TEXT,
                external_id TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (instance_id) REFERENCES instances(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_instance ON messages(instance_id, remote_jid, created_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_external ON messages(instance_id, external_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS instance_chatbots (
                instance_id TEXT PRIMARY KEY,
                enabled INTEGER NOT NULL DEFAULT 0,
                rules TEXT NOT NULL DEFAULT '[]',
                fallback_reply TEXT,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (instance_id) REFERENCES instances(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS api_key_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                masked_key TEXT NOT NULL,
                action TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS api_key_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                method TEXT NOT NULL,
                status_code INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_api_key_usage_user ON api_key_usage(user_id, created_at)",
            [],
        )?;

        // Migration: webhook forwarding was added after the first release
        let has_webhook_url: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('instances') WHERE name='webhook_url'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|c| c > 0)
            .unwrap_or(false);

        if !has_webhook_url {
            conn.execute("ALTER TABLE instances ADD COLUMN webhook_url TEXT", [])?;
        }

        // Migration: seed per-user usage from instance counters still on disk
        let usage_rows: i64 = conn.query_row("SELECT COUNT(*) FROM user_daily_usage", [], |row| row.get(0))?;
        if usage_rows == 0 {
            conn.execute(
                "INSERT INTO user_daily_usage (user_id, day, messages_sent, messages_received, chatbot_replies)
                 SELECT i.user_id, s.day, SUM(s.messages_sent), SUM(s.messages_received), SUM(s.chatbot_replies)
                 FROM instance_daily_stats s
                 JOIN instances i ON i.id = s.instance_id
                 GROUP BY i.user_id, s.day",
                [],
            )?;
        }

        Ok(())
    }
}

/// Parse an RFC 3339 column, falling back to the epoch for corrupt values
pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            log::warn!("Invalid timestamp in database: {}", value);
            DateTime::<Utc>::default()
        })
}

pub(crate) fn parse_optional_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value.as_deref().map(parse_timestamp)
}

/// UTC calendar day key used by the daily tables
pub(crate) fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_day(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap_or_default()
}

#[cfg(test)]
pub(crate) fn test_db() -> Database {
    Database::new(":memory:").expect("in-memory database")
}
