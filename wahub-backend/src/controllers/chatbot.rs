use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{error_response, internal_error, owned_instance};
use crate::chatbot::{find_reply, prepare_rules};
use crate::middleware::require_user;
use crate::models::{InstanceChatbot, UpdateChatbotRequest};
use crate::AppState;

const MAX_FALLBACK_LEN: usize = 4096;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/instances/{id}/chatbot")
            .route(web::get().to(get_chatbot))
            .route(web::put().to(update_chatbot)),
    );
    cfg.service(web::resource("/api/instances/{id}/chatbot/test").route(web::post().to(test_chatbot)));
}

#[derive(Serialize)]
struct ChatbotResponse {
    success: bool,
    chatbot: InstanceChatbot,
    max_rules: usize,
}

#[derive(Deserialize)]
pub struct TestRequest {
    text: String,
}

async fn get_chatbot(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    let plan = match state.db.daily_quota(&user_id, Utc::now()) {
        Ok(q) => q.plan,
        Err(e) => return internal_error("Failed to load plan", e),
    };

    match state.db.get_chatbot(&instance.id) {
        Ok(chatbot) => HttpResponse::Ok().json(ChatbotResponse {
            success: true,
            chatbot,
            max_rules: plan.limits().max_chatbot_rules,
        }),
        Err(e) => internal_error("Failed to load chatbot", e),
    }
}

async fn update_chatbot(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpdateChatbotRequest>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let body = body.into_inner();
    let rules = match prepare_rules(body.rules) {
        Ok(rules) => rules,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let fallback = body
        .fallback_reply
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty());
    if fallback.map_or(false, |f| f.chars().count() > MAX_FALLBACK_LEN) {
        return error_response(StatusCode::BAD_REQUEST, "Fallback reply is too long");
    }

    let plan = match state.db.daily_quota(&user_id, Utc::now()) {
        Ok(q) => q.plan,
        Err(e) => return internal_error("Failed to load plan", e),
    };
    let max_rules = plan.limits().max_chatbot_rules;
    if rules.len() > max_rules {
        return error_response(
            StatusCode::FORBIDDEN,
            format!("The {} plan allows up to {} chatbot rules", plan.label(), max_rules),
        );
    }

    match state.db.save_chatbot(&instance.id, body.enabled, &rules, fallback) {
        Ok(chatbot) => {
            log::info!(
                "Chatbot for instance {} saved ({} rules, enabled: {})",
                instance.id,
                chatbot.rules.len(),
                chatbot.enabled
            );
            HttpResponse::Ok().json(ChatbotResponse {
                success: true,
                chatbot,
                max_rules,
            })
        }
        Err(e) => internal_error("Failed to save chatbot", e),
    }
}

/// Dry run: what would the bot answer to `text`
async fn test_chatbot(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<TestRequest>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    match state.db.get_chatbot(&instance.id) {
        Ok(chatbot) => {
            let reply = find_reply(&chatbot, &body.text);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "matched": reply.is_some(),
                "reply": reply
            }))
        }
        Err(e) => internal_error("Failed to load chatbot", e),
    }
}
