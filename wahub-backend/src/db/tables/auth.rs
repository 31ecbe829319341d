//! User and auth session database operations

use chrono::{Duration, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult};
use uuid::Uuid;

use super::super::sqlite::parse_timestamp;
use super::super::Database;
use crate::models::{Session, User};

impl Database {
    /// Create a user together with its free-plan profile
    pub fn create_user(&self, email: &str, password_hash: &str, name: Option<&str>) -> SqliteResult<User> {
        let mut conn = self.conn.lock();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO users (id, email, password_hash, name, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![&id, email, password_hash, name, &now_str],
        )?;
        tx.execute(
            "INSERT INTO profiles (user_id, full_name, plan, created_at, updated_at) VALUES (?1, ?2, 'free', ?3, ?3)",
            rusqlite::params![&id, name, &now_str],
        )?;
        tx.commit()?;

        Ok(User {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            name: name.map(|s| s.to_string()),
            created_at: now,
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> SqliteResult<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, email, password_hash, name, created_at FROM users WHERE email = ?1",
            [email],
            |row| {
                let created_at: String = row.get(4)?;
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                    name: row.get(3)?,
                    created_at: parse_timestamp(&created_at),
                })
            },
        )
        .optional()
    }

    /// Create a new session for a user
    pub fn create_session(&self, user_id: &str, ttl_hours: i64) -> SqliteResult<Session> {
        let conn = self.conn.lock();
        let token = Uuid::new_v4().simple().to_string();
        let created_at = Utc::now();
        let expires_at = created_at + Duration::hours(ttl_hours);

        conn.execute(
            "INSERT INTO auth_sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![&token, user_id, created_at.to_rfc3339(), expires_at.to_rfc3339()],
        )?;

        Ok(Session {
            id: conn.last_insert_rowid(),
            token,
            user_id: user_id.to_string(),
            created_at,
            expires_at,
        })
    }

    /// Return the session for a token if it exists and has not expired
    pub fn validate_session(&self, token: &str) -> SqliteResult<Option<Session>> {
        let conn = self.conn.lock();
        let session = conn
            .query_row(
                "SELECT id, token, user_id, created_at, expires_at FROM auth_sessions WHERE token = ?1",
                [token],
                |row| {
                    let created_at: String = row.get(3)?;
                    let expires_at: String = row.get(4)?;
                    Ok(Session {
                        id: row.get(0)?,
                        token: row.get(1)?,
                        user_id: row.get(2)?,
                        created_at: parse_timestamp(&created_at),
                        expires_at: parse_timestamp(&expires_at),
                    })
                },
            )
            .optional()?;

        Ok(session.filter(|s| s.expires_at > Utc::now()))
    }

    pub fn delete_session(&self, token: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows_affected = conn.execute("DELETE FROM auth_sessions WHERE token = ?1", [token])?;
        Ok(rows_affected > 0)
    }
}
