//! Profile database operations (plan, display fields, API key)

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult};
use std::str::FromStr;

use super::super::sqlite::{parse_optional_timestamp, parse_timestamp};
use super::super::Database;
use crate::models::{Plan, Profile};

const PROFILE_COLUMNS: &str = "p.user_id, u.email, p.full_name, p.company, p.phone, p.plan, p.plan_expires_at,
     p.api_key, p.api_key_created_at, p.created_at, p.updated_at";

impl Database {
    fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
        let plan_str: String = row.get(5)?;
        let created_at: String = row.get(9)?;
        let updated_at: String = row.get(10)?;

        Ok(Profile {
            user_id: row.get(0)?,
            email: row.get(1)?,
            full_name: row.get(2)?,
            company: row.get(3)?,
            phone: row.get(4)?,
            plan: Plan::from_str(&plan_str).unwrap_or(Plan::Free),
            plan_expires_at: parse_optional_timestamp(row.get(6)?),
            api_key: row.get(7)?,
            api_key_created_at: parse_optional_timestamp(row.get(8)?),
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    pub fn get_profile(&self, user_id: &str) -> SqliteResult<Option<Profile>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM profiles p JOIN users u ON u.id = p.user_id WHERE p.user_id = ?1",
                PROFILE_COLUMNS
            ),
            [user_id],
            Self::row_to_profile,
        )
        .optional()
    }

    /// Resolve the owner of an API key
    pub fn get_profile_by_api_key(&self, api_key: &str) -> SqliteResult<Option<Profile>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM profiles p JOIN users u ON u.id = p.user_id WHERE p.api_key = ?1",
                PROFILE_COLUMNS
            ),
            [api_key],
            Self::row_to_profile,
        )
        .optional()
    }

    /// Update display fields; `None` leaves a field untouched
    pub fn update_profile(
        &self,
        user_id: &str,
        full_name: Option<&str>,
        company: Option<&str>,
        phone: Option<&str>,
    ) -> SqliteResult<Option<Profile>> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE profiles SET
                full_name = COALESCE(?1, full_name),
                company = COALESCE(?2, company),
                phone = COALESCE(?3, phone),
                updated_at = ?4
             WHERE user_id = ?5",
            rusqlite::params![full_name, company, phone, &now, user_id],
        )?;
        drop(conn);
        self.get_profile(user_id)
    }

    pub fn set_plan(
        &self,
        user_id: &str,
        plan: Plan,
        expires_at: Option<DateTime<Utc>>,
    ) -> SqliteResult<Option<Profile>> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE profiles SET plan = ?1, plan_expires_at = ?2, updated_at = ?3 WHERE user_id = ?4",
            rusqlite::params![plan.to_string(), expires_at.map(|e| e.to_rfc3339()), &now, user_id],
        )?;
        drop(conn);
        self.get_profile(user_id)
    }

    /// Store (or clear, with `None`) the user's API key
    pub fn set_api_key(&self, user_id: &str, api_key: Option<&str>) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let created_at = api_key.map(|_| now.clone());
        let rows_affected = conn.execute(
            "UPDATE profiles SET api_key = ?1, api_key_created_at = ?2, updated_at = ?3 WHERE user_id = ?4",
            rusqlite::params![api_key, created_at, &now, user_id],
        )?;
        Ok(rows_affected > 0)
    }
}
