//! Processing of events posted by the WhatsApp backend

pub mod payload;

pub use payload::WebhookEnvelope;

use chrono::Utc;
use std::sync::Arc;

use crate::chatbot;
use crate::db::{Database, StatDelta};
use crate::gateway::protocol::GatewayEvent;
use crate::gateway::EventBroadcaster;
use crate::models::{Instance, InstanceStatus, MessageDirection, MessageStatus, NewMessage};
use crate::whatsapp::MessageSender;
use payload::{extract_connection, extract_messages, extract_qr, extract_status_updates, IncomingMessage};

#[derive(Debug)]
pub enum WebhookOutcome {
    /// Event was applied; carries the instance as it was before the event
    Processed(Instance),
    Ignored,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Unknown instance: {0}")]
    UnknownInstance(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub struct WebhookProcessor {
    db: Arc<Database>,
    sender: Arc<dyn MessageSender>,
    broadcaster: Arc<EventBroadcaster>,
}

impl WebhookProcessor {
    pub fn new(db: Arc<Database>, sender: Arc<dyn MessageSender>, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            db,
            sender,
            broadcaster,
        }
    }

    pub async fn process(&self, envelope: &WebhookEnvelope) -> Result<WebhookOutcome, WebhookError> {
        let instance = self
            .db
            .get_instance(&envelope.instance_id)?
            .ok_or_else(|| WebhookError::UnknownInstance(envelope.instance_id.clone()))?;

        log::debug!("[WEBHOOK] {} for instance {}", envelope.event, instance.id);

        match envelope.event.as_str() {
            "message" | "messages.upsert" => {
                for message in extract_messages(&envelope.data) {
                    self.handle_message(&instance, message).await?;
                }
            }
            "connection.update" => self.handle_connection(&instance, &envelope.data)?,
            "qr" | "qrcode.updated" => self.handle_qr(&instance, &envelope.data)?,
            "messages.update" | "message.ack" => self.handle_status_updates(&instance, &envelope.data)?,
            other => {
                log::debug!("[WEBHOOK] Ignoring event '{}'", other);
                return Ok(WebhookOutcome::Ignored);
            }
        }

        Ok(WebhookOutcome::Processed(instance))
    }

    async fn handle_message(&self, instance: &Instance, message: IncomingMessage) -> Result<(), WebhookError> {
        if message.is_broadcast() {
            return Ok(());
        }

        let today = Utc::now().date_naive();
        let (direction, status, delta) = if message.from_me {
            (MessageDirection::Outbound, MessageStatus::Sent, StatDelta::sent(1))
        } else {
            (MessageDirection::Inbound, MessageStatus::Received, StatDelta::received(1))
        };

        // Messages sent through this service come back as echoes
        let logged = self.db.insert_message_once(&NewMessage {
            instance_id: &instance.id,
            direction,
            remote_jid: &message.remote_jid,
            message_type: &message.message_type,
            body: message.text.as_deref(),
            external_id: message.external_id.as_deref(),
            status,
        })?;
        if !logged {
            return Ok(());
        }
        self.db.record_stats(&instance.id, today, delta)?;

        if message.from_me {
            self.broadcaster.send_to_user(
                &instance.user_id,
                GatewayEvent::message_sent(
                    &instance.id,
                    &message.remote_jid,
                    message.external_id.as_deref(),
                    message.text.as_deref(),
                ),
            );
            return Ok(());
        }

        self.broadcaster.send_to_user(
            &instance.user_id,
            GatewayEvent::message_received(
                &instance.id,
                &message.remote_jid,
                message.push_name.as_deref(),
                message.text.as_deref(),
            ),
        );

        if !message.is_group() {
            if let Some(text) = message.text.as_deref() {
                self.reply_with_chatbot(instance, &message.remote_jid, text).await?;
            }
        }

        Ok(())
    }

    async fn reply_with_chatbot(&self, instance: &Instance, remote_jid: &str, text: &str) -> Result<(), WebhookError> {
        let bot = self.db.get_chatbot(&instance.id)?;
        let Some(reply) = chatbot::find_reply(&bot, text) else {
            return Ok(());
        };

        let now = Utc::now();
        let quota = self.db.daily_quota(&instance.user_id, now)?;
        if !quota.allows(1) {
            log::warn!(
                "[CHATBOT] Daily limit reached for user {}, not replying on instance {}",
                instance.user_id,
                instance.id
            );
            return Ok(());
        }

        match self.sender.send_text(&instance.id, remote_jid, reply).await {
            Ok(sent) => {
                let logged = self.db.insert_message_once(&NewMessage {
                    instance_id: &instance.id,
                    direction: MessageDirection::Outbound,
                    remote_jid,
                    message_type: "text",
                    body: Some(reply),
                    external_id: sent.id.as_deref(),
                    status: MessageStatus::Sent,
                })?;
                // An echo that beat us here already counted the send
                let delta = if logged {
                    StatDelta::chatbot_reply()
                } else {
                    StatDelta {
                        chatbot_replies: 1,
                        ..Default::default()
                    }
                };
                self.db.record_stats(&instance.id, now.date_naive(), delta)?;
                log::info!("[CHATBOT] Replied to {} on instance {}", remote_jid, instance.id);
            }
            Err(e) => {
                log::error!("[CHATBOT] Failed to send reply on instance {}: {}", instance.id, e);
            }
        }

        Ok(())
    }

    fn handle_connection(&self, instance: &Instance, data: &serde_json::Value) -> Result<(), WebhookError> {
        let Some((state, phone)) = extract_connection(data) else {
            log::warn!("[WEBHOOK] connection.update without state for {}", instance.id);
            return Ok(());
        };
        let Some(status) = InstanceStatus::from_backend_state(&state) else {
            log::warn!("[WEBHOOK] Unknown connection state '{}' for {}", state, instance.id);
            return Ok(());
        };

        self.db.update_instance_status(&instance.id, status, phone.as_deref())?;
        log::info!("[WEBHOOK] Instance {} is now {}", instance.id, status);

        let phone = phone.or_else(|| instance.phone_number.clone());
        self.broadcaster.send_to_user(
            &instance.user_id,
            GatewayEvent::instance_status(&instance.id, &status.to_string(), phone.as_deref()),
        );
        Ok(())
    }

    fn handle_qr(&self, instance: &Instance, data: &serde_json::Value) -> Result<(), WebhookError> {
        let Some(qr) = extract_qr(data) else {
            log::warn!("[WEBHOOK] QR event without code for {}", instance.id);
            return Ok(());
        };

        self.db.update_instance_status(&instance.id, InstanceStatus::Qr, None)?;
        self.broadcaster
            .send_to_user(&instance.user_id, GatewayEvent::instance_qr(&instance.id, &qr));
        Ok(())
    }

    fn handle_status_updates(&self, instance: &Instance, data: &serde_json::Value) -> Result<(), WebhookError> {
        for (external_id, status) in extract_status_updates(data) {
            let applied = self.db.update_message_status(&instance.id, &external_id, status)?;
            // Unlogged ids are still relayed; stale acks for logged ones are not
            if applied || !self.db.message_exists(&instance.id, &external_id)? {
                self.broadcaster.send_to_user(
                    &instance.user_id,
                    GatewayEvent::message_status(&instance.id, &external_id, &status.to_string()),
                );
            }
        }
        Ok(())
    }
}
