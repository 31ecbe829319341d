//! Shapes of the events posted by the WhatsApp backend
//!
//! Backends differ in casing and nesting (Baileys-style `key.remoteJid` vs
//! flat `from`), so fields are read leniently from `serde_json::Value`.

use serde::Deserialize;
use serde_json::Value;

use crate::models::MessageStatus;
use crate::whatsapp::jid::to_jid;

#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    pub event: String,
    pub instance_id: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    event: Option<String>,
    #[serde(default, alias = "instanceId", alias = "instance")]
    instance_id: Option<String>,
    #[serde(default)]
    data: Value,
}

impl WebhookEnvelope {
    pub fn parse(body: &[u8]) -> Result<Self, String> {
        let raw: RawEnvelope =
            serde_json::from_slice(body).map_err(|e| format!("Invalid webhook payload: {}", e))?;

        let event = raw
            .event
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| "Missing event".to_string())?;
        let instance_id = raw
            .instance_id
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .ok_or_else(|| "Missing instance_id".to_string())?;

        Ok(Self {
            event,
            instance_id,
            data: raw.data,
        })
    }
}

/// One chat message carried by a `message` / `messages.upsert` event
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub remote_jid: String,
    pub from_me: bool,
    pub external_id: Option<String>,
    pub text: Option<String>,
    pub push_name: Option<String>,
    pub message_type: String,
}

impl IncomingMessage {
    pub fn is_group(&self) -> bool {
        self.remote_jid.ends_with("@g.us")
    }

    pub fn is_broadcast(&self) -> bool {
        self.remote_jid.ends_with("@broadcast")
    }
}

/// Items of an event payload: a bare array, `{messages: [...]}` or a single object
fn items(data: &Value) -> Vec<&Value> {
    match data {
        Value::Array(list) => list.iter().collect(),
        Value::Object(map) => match map.get("messages") {
            Some(Value::Array(list)) => list.iter().collect(),
            _ => vec![data],
        },
        _ => Vec::new(),
    }
}

fn str_at<'a>(value: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(value, |v, key| v.get(*key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    })
}

fn normalize_jid(raw: &str) -> Option<String> {
    if raw.contains('@') {
        Some(raw.to_string())
    } else {
        to_jid(raw).ok()
    }
}

pub fn extract_messages(data: &Value) -> Vec<IncomingMessage> {
    items(data).into_iter().filter_map(parse_message).collect()
}

fn parse_message(item: &Value) -> Option<IncomingMessage> {
    let remote_jid = str_at(
        item,
        &[&["key", "remoteJid"], &["remoteJid"], &["remote_jid"], &["from"], &["chatId"]],
    )
    .and_then(normalize_jid)?;

    let from_me = [item.pointer("/key/fromMe"), item.get("fromMe"), item.get("from_me")]
        .into_iter()
        .flatten()
        .find_map(Value::as_bool)
        .unwrap_or(false);

    let text = str_at(
        item,
        &[
            &["message", "conversation"],
            &["message", "extendedTextMessage", "text"],
            &["message", "imageMessage", "caption"],
            &["message", "videoMessage", "caption"],
            &["body"],
            &["text"],
            &["message"],
        ],
    )
    .map(String::from);

    let message_type = str_at(item, &[&["messageType"], &["type"]])
        .map(String::from)
        .or_else(|| {
            item.get("message")
                .and_then(Value::as_object)
                .and_then(|m| m.keys().next().cloned())
        })
        .unwrap_or_else(|| if text.is_some() { "text" } else { "unknown" }.to_string());

    Some(IncomingMessage {
        remote_jid,
        from_me,
        external_id: str_at(item, &[&["key", "id"], &["id"], &["messageId"]]).map(String::from),
        text,
        push_name: str_at(item, &[&["pushName"], &["push_name"], &["notifyName"]]).map(String::from),
        message_type,
    })
}

/// `(backend message id, new status)` pairs of a delivery update event
pub fn extract_status_updates(data: &Value) -> Vec<(String, MessageStatus)> {
    items(data)
        .into_iter()
        .filter_map(|item| {
            let id = str_at(item, &[&["key", "id"], &["id"], &["messageId"]])?;
            let ack = [item.pointer("/update/status"), item.get("status"), item.get("ack")]
                .into_iter()
                .flatten()
                .find_map(MessageStatus::from_ack)?;
            Some((id.to_string(), ack))
        })
        .collect()
}

/// Connection state and, when paired, the account's phone number
pub fn extract_connection(data: &Value) -> Option<(String, Option<String>)> {
    let state = str_at(data, &[&["state"], &["connection"], &["status"]])?;
    let phone = str_at(data, &[&["phone"], &["phoneNumber"], &["number"]])
        .map(String::from)
        .or_else(|| {
            str_at(data, &[&["me", "id"], &["jid"]]).and_then(crate::whatsapp::jid::phone_from_jid)
        });
    Some((state.to_string(), phone))
}

pub fn extract_qr(data: &Value) -> Option<String> {
    str_at(data, &[&["qr"], &["qrcode"], &["qrCode"], &["qrcode", "base64"], &["code"]])
        .map(String::from)
        .or_else(|| data.as_str().map(String::from))
}
