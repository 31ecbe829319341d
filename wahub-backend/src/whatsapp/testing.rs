//! Test doubles: a recording sender and a loopback WhatsApp backend

use actix_web::http::{Method, StatusCode};
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::TcpListener;

use super::types::SendResult;
use super::{BackendError, MessageSender};

/// Records every send; sends to `fail_for` are rejected by the "backend"
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, String, String)>>,
    pub fail_for: Option<String>,
}

impl RecordingSender {
    pub fn failing_for(to: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_for: Some(to.to_string()),
        }
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, to, _)| to.clone()).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, _, text)| text.clone()).collect()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_text(&self, instance_id: &str, to: &str, text: &str) -> Result<SendResult, BackendError> {
        if self.fail_for.as_deref() == Some(to) {
            return Err(BackendError::Status {
                status: 400,
                message: "number not on WhatsApp".to_string(),
            });
        }
        let mut sent = self.sent.lock();
        sent.push((instance_id.to_string(), to.to_string(), text.to_string()));
        Ok(SendResult {
            id: Some(format!("out-{}", sent.len())),
        })
    }
}

/// One request as seen by [`StubBackend`]
#[derive(Debug, Clone)]
pub struct StubRequest {
    pub method: String,
    pub path: String,
    pub api_key: Option<String>,
}

/// Scriptable stand-in for the WhatsApp backend, served over real HTTP.
///
/// `/status` answers with `status`. The first `get_failures` GETs answer 503.
/// `/qr` and `/messages/text` have fixed answers; everything else is
/// `{"success": true}`.
pub struct StubBackend {
    pub status: Mutex<(u16, Value)>,
    pub get_failures: Mutex<usize>,
    pub requests: Mutex<Vec<StubRequest>>,
}

impl StubBackend {
    pub fn set_status(&self, code: u16, body: Value) {
        *self.status.lock() = (code, body);
    }

    pub fn fail_next_gets(&self, n: usize) {
        *self.get_failures.lock() = n;
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        self.requests.lock().clone()
    }

    /// "METHOD /path" of every request so far
    pub fn calls(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }
}

async fn stub_respond(req: HttpRequest, stub: web::Data<StubBackend>) -> HttpResponse {
    let path = req.path().to_string();
    stub.requests.lock().push(StubRequest {
        method: req.method().to_string(),
        path: path.clone(),
        api_key: req
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    });

    if req.method() == Method::GET {
        let mut failures = stub.get_failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return HttpResponse::ServiceUnavailable().json(json!({"error": "warming up"}));
        }
    }

    if path.ends_with("/status") {
        let (code, body) = stub.status.lock().clone();
        let code = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return HttpResponse::build(code).json(body);
    }
    if path.ends_with("/qr") {
        return HttpResponse::Ok().json(json!({"success": true, "data": {"qr": "2@stub-qr"}}));
    }
    if path.ends_with("/messages/text") {
        return HttpResponse::Ok().json(json!({"data": {"messageId": "STUB-1"}}));
    }
    HttpResponse::Ok().json(json!({"success": true}))
}

/// Serve a [`StubBackend`] on a loopback port. Returns its base URL.
/// Must run inside an actix system (`#[actix_web::test]`).
pub fn spawn_stub_backend() -> (String, web::Data<StubBackend>) {
    let stub = web::Data::new(StubBackend {
        status: Mutex::new((200, json!({"state": "connecting"}))),
        get_failures: Mutex::new(0),
        requests: Mutex::new(Vec::new()),
    });

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub backend");
    let addr = listener.local_addr().expect("stub backend address");

    let data = stub.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .default_service(web::to(stub_respond))
    })
    .workers(1)
    .listen(listener)
    .expect("listen stub backend")
    .run();
    actix_web::rt::spawn(server);

    (format!("http://{}", addr), stub)
}
