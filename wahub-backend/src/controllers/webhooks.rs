use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde_json::json;

use super::{error_response, internal_error};
use crate::auth::signature::{verify_webhook_signature, SIGNATURE_HEADER};
use crate::webhook::{WebhookEnvelope, WebhookError, WebhookOutcome};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/webhooks/whatsapp").route(web::post().to(receive)));
}

/// Entry point for events posted by the WhatsApp backend
async fn receive(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> impl Responder {
    if let Some(secret) = state.config.webhook_secret.as_deref() {
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();
        if !verify_webhook_signature(secret, &body, signature) {
            log::warn!("[WEBHOOK] Rejected event with missing or invalid signature");
            return error_response(StatusCode::UNAUTHORIZED, "Invalid webhook signature");
        }
    }

    let envelope = match WebhookEnvelope::parse(&body) {
        Ok(envelope) => envelope,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    match state.webhooks.process(&envelope).await {
        Ok(WebhookOutcome::Processed(instance)) => {
            if let Some(url) = instance.webhook_url.clone() {
                let backend = state.backend.clone();
                let payload = json!({
                    "event": envelope.event,
                    "instance_id": envelope.instance_id,
                    "instance_name": instance.name,
                    "data": envelope.data,
                });
                tokio::spawn(async move {
                    if let Err(e) = backend.forward_event(&url, &payload).await {
                        log::warn!("[WEBHOOK] Forward to {} failed: {}", url, e);
                    }
                });
            }
            HttpResponse::Ok().json(json!({"success": true}))
        }
        Ok(WebhookOutcome::Ignored) => HttpResponse::Ok().json(json!({"success": true, "ignored": true})),
        Err(WebhookError::UnknownInstance(id)) => {
            log::warn!("[WEBHOOK] Event for unknown instance {}", id);
            error_response(StatusCode::NOT_FOUND, "Instance not found")
        }
        Err(WebhookError::Database(e)) => internal_error("Failed to process webhook", e),
    }
}
