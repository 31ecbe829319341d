//! API-key authenticated endpoints for integrations
//!
//! Every call that resolves to a key owner is recorded in the usage log,
//! rejected ones included.

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::messages::send_text_message;
use super::{error_response, internal_error, owned_instance};
use crate::middleware::require_api_key;
use crate::models::{InstanceStatus, Plan, Profile};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/instances", web::get().to(list_instances))
            .route("/instances/{id}/status", web::get().to(instance_status))
            .route("/messages/send", web::post().to(send_message)),
    );
}

#[derive(Serialize)]
struct PublicInstance {
    id: String,
    name: String,
    status: InstanceStatus,
    phone_number: Option<String>,
}

#[derive(Deserialize)]
pub struct PublicSendRequest {
    instance_id: String,
    to: String,
    text: String,
}

/// Write the usage row for a finished call and hand the response back
fn track(state: &AppState, req: &HttpRequest, user_id: &str, response: HttpResponse) -> HttpResponse {
    let endpoint = req.match_pattern().unwrap_or_else(|| req.path().to_string());
    if let Err(e) = state
        .db
        .record_api_usage(user_id, &endpoint, req.method().as_str(), response.status().as_u16())
    {
        log::error!("Failed to record API usage: {}", e);
    }
    response
}

/// The public API is a paid-plan feature
fn check_plan(profile: &Profile) -> Result<(), HttpResponse> {
    if profile.effective_plan(Utc::now()) == Plan::Free {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "The public API is not included in the Free plan",
        ));
    }
    Ok(())
}

async fn list_instances(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let profile = match require_api_key(&state, &req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    if let Err(resp) = check_plan(&profile) {
        return track(&state, &req, &profile.user_id, resp);
    }

    let response = match state.db.list_instances(&profile.user_id) {
        Ok(instances) => {
            let instances: Vec<PublicInstance> = instances
                .into_iter()
                .map(|i| PublicInstance {
                    id: i.id,
                    name: i.name,
                    status: i.status,
                    phone_number: i.phone_number,
                })
                .collect();
            HttpResponse::Ok().json(serde_json::json!({"success": true, "instances": instances}))
        }
        Err(e) => internal_error("Failed to list instances", e),
    };
    track(&state, &req, &profile.user_id, response)
}

async fn instance_status(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let profile = match require_api_key(&state, &req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    if let Err(resp) = check_plan(&profile) {
        return track(&state, &req, &profile.user_id, resp);
    }

    let response = match owned_instance(&state, &profile.user_id, &path) {
        Ok(instance) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "instance_id": instance.id,
            "status": instance.status,
            "phone_number": instance.phone_number,
            "last_seen_at": instance.last_seen_at
        })),
        Err(resp) => resp,
    };
    track(&state, &req, &profile.user_id, response)
}

async fn send_message(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<PublicSendRequest>,
) -> impl Responder {
    let profile = match require_api_key(&state, &req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    if let Err(resp) = check_plan(&profile) {
        return track(&state, &req, &profile.user_id, resp);
    }

    let instance = match owned_instance(&state, &profile.user_id, &body.instance_id) {
        Ok(i) => i,
        Err(resp) => return track(&state, &req, &profile.user_id, resp),
    };
    if instance.status != InstanceStatus::Connected {
        let resp = error_response(StatusCode::CONFLICT, "Instance is not connected");
        return track(&state, &req, &profile.user_id, resp);
    }

    let response = match send_text_message(&state, &instance, &body.to, &body.text).await {
        Ok(sent) => HttpResponse::Ok().json(sent),
        Err(resp) => resp,
    };
    track(&state, &req, &profile.user_id, response)
}
