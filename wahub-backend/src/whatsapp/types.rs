//! Wire types exchanged with the WhatsApp backend

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest<'a> {
    pub instance_id: &'a str,
    pub webhook_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct SendTextRequest<'a> {
    pub to: &'a str,
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SetProxyRequest<'a> {
    pub proxy: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrCode {
    #[serde(default, alias = "qrCode", alias = "qrcode")]
    pub qr: Option<String>,
    #[serde(default, alias = "pairingCode")]
    pub pairing_code: Option<String>,
    #[serde(default, alias = "state")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    #[serde(alias = "status", alias = "connection")]
    pub state: String,
    #[serde(default, alias = "phoneNumber", alias = "number")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    #[serde(default, alias = "messageId", alias = "message_id")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    #[serde(alias = "id")]
    pub jid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "pushName", alias = "notify")]
    pub push_name: Option<String>,
}

/// Backends answer the contact list either bare or wrapped
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ContactsPayload {
    List(Vec<Contact>),
    Wrapped { contacts: Vec<Contact> },
}

impl ContactsPayload {
    pub(crate) fn into_contacts(self) -> Vec<Contact> {
        match self {
            Self::List(contacts) | Self::Wrapped { contacts } => contacts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberCheck {
    pub exists: bool,
    #[serde(default)]
    pub jid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contacts_payload_shapes() {
        let bare: ContactsPayload =
            serde_json::from_str(r#"[{"id": "1@s.whatsapp.net", "pushName": "Ana"}]"#).unwrap();
        let contacts = bare.into_contacts();
        assert_eq!(contacts[0].jid, "1@s.whatsapp.net");
        assert_eq!(contacts[0].push_name.as_deref(), Some("Ana"));

        let wrapped: ContactsPayload =
            serde_json::from_str(r#"{"contacts": [{"jid": "2@s.whatsapp.net", "name": "Bo"}]}"#).unwrap();
        assert_eq!(wrapped.into_contacts()[0].name.as_deref(), Some("Bo"));
    }

    #[test]
    fn test_status_aliases() {
        let status: SessionStatus =
            serde_json::from_str(r#"{"connection": "open", "phoneNumber": "5511"}"#).unwrap();
        assert_eq!(status.state, "open");
        assert_eq!(status.phone.as_deref(), Some("5511"));

        let sent: SendResult = serde_json::from_str(r#"{"messageId": "ABC"}"#).unwrap();
        assert_eq!(sent.id.as_deref(), Some("ABC"));
    }
}
