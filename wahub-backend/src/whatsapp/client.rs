//! HTTP client for the WhatsApp backend
//!
//! Every call carries the `x-api-key` header when configured. Idempotent GETs
//! are retried with per-endpoint exponential backoff; mutating calls are not.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use urlencoding::encode;

use super::retry::{is_reqwest_error_retryable, HttpRetryManager};
use super::types::{
    Contact, ContactsPayload, CreateSessionRequest, NumberCheck, QrCode, SendResult, SendTextRequest,
    SessionStatus, SetProxyRequest,
};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const FORWARD_TIMEOUT_SECS: u64 = 10;
const MAX_GET_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected backend response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => is_reqwest_error_retryable(e),
            Self::Status { status, .. } => HttpRetryManager::is_retryable_status(*status),
            Self::Decode(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Outbound text delivery, the seam used by the bulk sender and the chatbot
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, instance_id: &str, to: &str, text: &str) -> Result<SendResult, BackendError>;
}

pub struct BackendClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    retry: HttpRetryManager,
}

impl BackendClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: HttpRetryManager::new(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Value, BackendError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, retry_key: &str) -> Result<T, BackendError> {
        let mut attempt = 1;
        loop {
            match self.execute(self.request(Method::GET, path)).await {
                Ok(value) => {
                    self.retry.record_success(retry_key);
                    return decode(value);
                }
                Err(e) if e.is_retryable() && attempt < MAX_GET_ATTEMPTS => {
                    let delay = self.retry.record_error(retry_key);
                    log::warn!("[BACKEND] GET {} failed ({}), retrying in {:?}", path, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_body<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, BackendError> {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.execute(builder).await
    }

    /// Start (or resume) a session for an instance
    pub async fn create_session(
        &self,
        instance_id: &str,
        webhook_url: &str,
        proxy: Option<&str>,
    ) -> Result<Value, BackendError> {
        let body = CreateSessionRequest {
            instance_id,
            webhook_url,
            proxy,
        };
        self.send_body(Method::POST, "/instances", Some(&body)).await
    }

    pub async fn get_qr(&self, instance_id: &str) -> Result<QrCode, BackendError> {
        self.get(&format!("/instances/{}/qr", encode(instance_id)), "qr").await
    }

    pub async fn get_status(&self, instance_id: &str) -> Result<SessionStatus, BackendError> {
        self.get(&format!("/instances/{}/status", encode(instance_id)), "status").await
    }

    pub async fn logout(&self, instance_id: &str) -> Result<(), BackendError> {
        let path = format!("/instances/{}/logout", encode(instance_id));
        self.send_body::<Value>(Method::POST, &path, None).await.map(|_| ())
    }

    pub async fn restart(&self, instance_id: &str) -> Result<(), BackendError> {
        let path = format!("/instances/{}/restart", encode(instance_id));
        self.send_body::<Value>(Method::POST, &path, None).await.map(|_| ())
    }

    pub async fn delete_session(&self, instance_id: &str) -> Result<(), BackendError> {
        let path = format!("/instances/{}", encode(instance_id));
        self.send_body::<Value>(Method::DELETE, &path, None).await.map(|_| ())
    }

    pub async fn set_proxy(&self, instance_id: &str, proxy: Option<&str>) -> Result<(), BackendError> {
        let path = format!("/instances/{}/proxy", encode(instance_id));
        self.send_body(Method::PUT, &path, Some(&SetProxyRequest { proxy }))
            .await
            .map(|_| ())
    }

    pub async fn list_contacts(&self, instance_id: &str) -> Result<Vec<Contact>, BackendError> {
        let payload: ContactsPayload = self
            .get(&format!("/instances/{}/contacts", encode(instance_id)), "contacts")
            .await?;
        Ok(payload.into_contacts())
    }

    pub async fn check_number(&self, instance_id: &str, phone: &str) -> Result<NumberCheck, BackendError> {
        let path = format!("/instances/{}/contacts/{}/exists", encode(instance_id), encode(phone));
        self.get(&path, "contacts").await
    }

    /// Backend cache statistics, passed through untouched
    pub async fn cache_stats(&self) -> Result<Value, BackendError> {
        self.get("/cache/stats", "cache").await
    }

    /// POST an event to a user-configured URL (no backend credentials attached)
    pub async fn forward_event(&self, url: &str, payload: &Value) -> Result<(), BackendError> {
        let response = self
            .http
            .post(url)
            .timeout(Duration::from_secs(FORWARD_TIMEOUT_SECS))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(BackendError::Status {
                status: status.as_u16(),
                message: format!("webhook target answered {}", status),
            })
        }
    }
}

#[async_trait]
impl MessageSender for BackendClient {
    async fn send_text(&self, instance_id: &str, to: &str, text: &str) -> Result<SendResult, BackendError> {
        let path = format!("/instances/{}/messages/text", encode(instance_id));
        let value = self
            .send_body(Method::POST, &path, Some(&SendTextRequest { to, text }))
            .await?;
        decode(value)
    }
}

/// Decode a response, unwrapping a `{"data": ...}` envelope when present
fn decode<T: DeserializeOwned>(value: Value) -> Result<T, BackendError> {
    let value = match value {
        Value::Object(mut map) if map.contains_key("data") && map.len() <= 3 => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))
}

/// Pull a human-readable message out of an error body
fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message", "detail"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_unwraps_data_envelope() {
        let qr: QrCode = decode(json!({"success": true, "data": {"qr": "2@abc"}})).unwrap();
        assert_eq!(qr.qr.as_deref(), Some("2@abc"));

        let direct: QrCode = decode(json!({"qr": "2@def"})).unwrap();
        assert_eq!(direct.qr.as_deref(), Some("2@def"));
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"error": "instance not found"}"#, StatusCode::NOT_FOUND),
            "instance not found"
        );
        assert_eq!(error_message("", StatusCode::BAD_GATEWAY), "Bad Gateway");
        assert_eq!(error_message("plain failure", StatusCode::INTERNAL_SERVER_ERROR), "plain failure");
    }

    #[test]
    fn test_error_classification() {
        let unavailable = BackendError::Status {
            status: 503,
            message: "down".to_string(),
        };
        assert!(unavailable.is_retryable());
        let missing = BackendError::Status {
            status: 404,
            message: "gone".to_string(),
        };
        assert!(missing.is_not_found());
        assert!(!missing.is_retryable());
        assert!(!BackendError::Decode("x".to_string()).is_retryable());
    }

    #[actix_web::test]
    async fn test_get_retries_transient_failures() {
        let (url, stub) = crate::whatsapp::testing::spawn_stub_backend();
        stub.set_status(200, json!({"data": {"state": "open", "phoneNumber": "5511999990000"}}));
        stub.fail_next_gets(2);
        let client = BackendClient::new(&url, Some("backend-key".to_string())).unwrap();

        let status = client.get_status("inst-1").await.unwrap();
        assert_eq!(status.state, "open");
        assert_eq!(status.phone.as_deref(), Some("5511999990000"));

        let requests = stub.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.path == "/instances/inst-1/status"));
        assert!(requests.iter().all(|r| r.api_key.as_deref() == Some("backend-key")));
    }

    #[actix_web::test]
    async fn test_get_gives_up_after_bounded_attempts() {
        let (url, stub) = crate::whatsapp::testing::spawn_stub_backend();
        stub.fail_next_gets(10);
        let client = BackendClient::new(&url, None).unwrap();

        let err = client.get_qr("inst-1").await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 503, .. }));
        assert_eq!(stub.requests().len(), MAX_GET_ATTEMPTS as usize);
        assert!(stub.requests()[0].api_key.is_none());
    }

    #[actix_web::test]
    async fn test_status_errors_and_bad_bodies() {
        let (url, stub) = crate::whatsapp::testing::spawn_stub_backend();
        let client = BackendClient::new(&url, None).unwrap();

        stub.set_status(404, json!({"error": "instance not found"}));
        let err = client.get_status("gone").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "backend returned HTTP 404: instance not found");
        // Not retryable, one request only
        assert_eq!(stub.requests().len(), 1);

        stub.set_status(200, json!({"unexpected": true}));
        assert!(matches!(client.get_status("odd").await, Err(BackendError::Decode(_))));
    }

    #[actix_web::test]
    async fn test_send_text_and_session_calls() {
        let (url, stub) = crate::whatsapp::testing::spawn_stub_backend();
        let client = BackendClient::new(&format!("{}/", url), None).unwrap();

        let sent = client.send_text("inst-1", "1@s.whatsapp.net", "hi").await.unwrap();
        assert_eq!(sent.id.as_deref(), Some("STUB-1"));

        let qr = client.get_qr("inst-1").await.unwrap();
        assert_eq!(qr.qr.as_deref(), Some("2@stub-qr"));

        client.logout("inst-1").await.unwrap();
        client.delete_session("inst-1").await.unwrap();

        assert_eq!(
            stub.calls(),
            vec![
                "POST /instances/inst-1/messages/text",
                "GET /instances/inst-1/qr",
                "POST /instances/inst-1/logout",
                "DELETE /instances/inst-1",
            ]
        );
    }
}
