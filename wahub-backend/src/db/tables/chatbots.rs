//! Per-instance chatbot configuration

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::super::sqlite::parse_timestamp;
use super::super::Database;
use crate::models::{ChatbotRule, InstanceChatbot};

impl Database {
    /// Chatbot config for an instance; a disabled, empty bot when none is stored
    pub fn get_chatbot(&self, instance_id: &str) -> SqliteResult<InstanceChatbot> {
        let conn = self.conn.lock();
        let chatbot = conn
            .query_row(
                "SELECT enabled, rules, fallback_reply, updated_at FROM instance_chatbots WHERE instance_id = ?1",
                [instance_id],
                |row| {
                    let enabled: i64 = row.get(0)?;
                    let rules_json: String = row.get(1)?;
                    let updated_at: String = row.get(3)?;

                    let rules: Vec<ChatbotRule> = serde_json::from_str(&rules_json).unwrap_or_else(|e| {
                        log::warn!("Invalid chatbot rules for instance {}: {}", instance_id, e);
                        Vec::new()
                    });

                    Ok(InstanceChatbot {
                        instance_id: instance_id.to_string(),
                        enabled: enabled != 0,
                        rules,
                        fallback_reply: row.get(2)?,
                        updated_at: Some(parse_timestamp(&updated_at)),
                    })
                },
            )
            .optional()?;

        Ok(chatbot.unwrap_or_else(|| InstanceChatbot::disabled(instance_id)))
    }

    pub fn save_chatbot(
        &self,
        instance_id: &str,
        enabled: bool,
        rules: &[ChatbotRule],
        fallback_reply: Option<&str>,
    ) -> SqliteResult<InstanceChatbot> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let rules_json = serde_json::to_string(rules).unwrap_or_else(|_| "[]".to_string());

        conn.execute(
            "INSERT INTO instance_chatbots (instance_id, enabled, rules, fallback_reply, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(instance_id) DO UPDATE SET
                enabled = excluded.enabled,
                rules = excluded.rules,
                fallback_reply = excluded.fallback_reply,
                updated_at = excluded.updated_at",
            rusqlite::params![instance_id, if enabled { 1 } else { 0 }, &rules_json, fallback_reply, &now],
        )?;

        drop(conn);
        self.get_chatbot(instance_id)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::sqlite::test_db;
    use crate::models::{ChatbotRule, MatchType};

    #[test]
    fn test_save_and_load_chatbot() {
        let db = test_db();
        let user = db.create_user("cb@example.com", "hash", None).unwrap();
        let instance = db.create_instance(&user.id, "main").unwrap();

        let empty = db.get_chatbot(&instance.id).unwrap();
        assert!(!empty.enabled);
        assert!(empty.rules.is_empty());

        let rules = vec![ChatbotRule {
            id: "r1".to_string(),
            pattern: "price".to_string(),
            match_type: MatchType::Contains,
            reply: "It costs 10".to_string(),
            case_sensitive: false,
            enabled: true,
        }];
        db.save_chatbot(&instance.id, true, &rules, Some("Sorry?")).unwrap();
        let saved = db.save_chatbot(&instance.id, true, &rules, Some("Come again?")).unwrap();

        assert!(saved.enabled);
        assert_eq!(saved.rules.len(), 1);
        assert_eq!(saved.rules[0].reply, "It costs 10");
        assert_eq!(saved.fallback_reply.as_deref(), Some("Come again?"));
    }
}
