use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{backend_error, error_response, internal_error, owned_instance};
use crate::db::StatDelta;
use crate::middleware::require_user;
use crate::models::{ChatSummary, Instance, Message, MessageDirection, MessageStatus, NewMessage};
use crate::whatsapp::jid::{normalize_phone, to_jid};
use crate::whatsapp::Contact;
use crate::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;
const MAX_TEXT_LEN: usize = 4096;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/instances/{id}/messages")
            .route(web::get().to(list_messages))
            .route(web::post().to(send_message)),
    );
    cfg.service(web::resource("/api/instances/{id}/chats").route(web::get().to(list_chats)));
    cfg.service(web::resource("/api/instances/{id}/contacts").route(web::get().to(list_contacts)));
    cfg.service(
        web::resource("/api/instances/{id}/contacts/{phone}/exists").route(web::get().to(check_number)),
    );
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub text: String,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message_id: Option<String>,
    pub to: String,
    pub remaining_today: Option<i64>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    remote_jid: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct MessagesResponse {
    success: bool,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct ChatsResponse {
    success: bool,
    chats: Vec<ChatSummary>,
}

#[derive(Serialize)]
struct ContactsResponse {
    success: bool,
    contacts: Vec<Contact>,
    total: usize,
}

/// Send one text through the backend on behalf of `instance`'s owner,
/// enforcing the daily limit and recording the message. Shared with the
/// public API.
pub(crate) async fn send_text_message(
    state: &AppState,
    instance: &Instance,
    to: &str,
    text: &str,
) -> Result<SendMessageResponse, HttpResponse> {
    let text = text.trim();
    if text.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Message text is required"));
    }
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(error_response(StatusCode::BAD_REQUEST, "Message text is too long"));
    }
    let jid = to_jid(to).map_err(|e| error_response(StatusCode::BAD_REQUEST, e))?;

    let now = Utc::now();
    let quota = state
        .db
        .daily_quota(&instance.user_id, now)
        .map_err(|e| internal_error("Failed to load daily usage", e))?;
    if !quota.allows(1) {
        return Err(error_response(
            StatusCode::TOO_MANY_REQUESTS,
            format!(
                "Daily message limit of {} reached for the {} plan",
                quota.limit.unwrap_or_default(),
                quota.plan.label()
            ),
        ));
    }

    let sent = state
        .sender
        .send_text(&instance.id, &jid, text)
        .await
        .map_err(|e| backend_error("Failed to send message", &e))?;

    let logged = state.db.insert_message_once(&NewMessage {
        instance_id: &instance.id,
        direction: MessageDirection::Outbound,
        remote_jid: &jid,
        message_type: "text",
        body: Some(text),
        external_id: sent.id.as_deref(),
        status: MessageStatus::Sent,
    });
    // false: the webhook echo got here first and already counted it
    let count_it = logged.unwrap_or_else(|e| {
        log::error!("Failed to log sent message: {}", e);
        true
    });
    if count_it {
        if let Err(e) = state.db.record_stats(&instance.id, now.date_naive(), StatDelta::sent(1)) {
            log::error!("Failed to record sent message: {}", e);
        }
    }

    Ok(SendMessageResponse {
        success: true,
        message_id: sent.id,
        to: jid,
        remaining_today: quota.remaining().map(|r| r - 1),
    })
}

async fn send_message(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<SendMessageRequest>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    match send_text_message(&state, &instance, &body.to, &body.text).await {
        Ok(sent) => HttpResponse::Ok().json(sent),
        Err(resp) => resp,
    }
}

async fn list_messages(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let remote_jid = match query.remote_jid.as_deref().map(str::trim).filter(|j| !j.is_empty()) {
        Some(raw) if raw.contains('@') => Some(raw.to_string()),
        Some(raw) => match to_jid(raw) {
            Ok(jid) => Some(jid),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        },
        None => None,
    };

    match state.db.list_messages(&instance.id, remote_jid.as_deref(), limit) {
        Ok(messages) => HttpResponse::Ok().json(MessagesResponse {
            success: true,
            messages,
        }),
        Err(e) => internal_error("Failed to list messages", e),
    }
}

async fn list_chats(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    match state.db.list_chats(&instance.id, limit) {
        Ok(chats) => HttpResponse::Ok().json(ChatsResponse { success: true, chats }),
        Err(e) => internal_error("Failed to list chats", e),
    }
}

async fn list_contacts(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    match state.backend.list_contacts(&instance.id).await {
        Ok(contacts) => HttpResponse::Ok().json(ContactsResponse {
            success: true,
            total: contacts.len(),
            contacts,
        }),
        Err(e) => backend_error("Failed to list contacts", &e),
    }
}

async fn check_number(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let (instance_id, phone) = path.into_inner();
    let instance = match owned_instance(&state, &user_id, &instance_id) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let phone = normalize_phone(&phone);
    if !(7..=15).contains(&phone.len()) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid phone number");
    }

    match state.backend.check_number(&instance.id, &phone).await {
        Ok(check) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "phone": phone,
            "exists": check.exists,
            "jid": check.jid
        })),
        Err(e) => backend_error("Failed to check number", &e),
    }
}
