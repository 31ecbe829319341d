use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use super::{backend_error, error_response, internal_error, owned_instance};
use crate::gateway::protocol::GatewayEvent;
use crate::middleware::require_user;
use crate::models::instance::validate_instance_name;
use crate::models::{CreateInstanceRequest, Instance, InstanceStatus};
use crate::proxy::{redact, validate_proxy_url};
use crate::whatsapp::jid::{normalize_phone, phone_from_jid};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/instances")
            .route("", web::get().to(list_instances))
            .route("", web::post().to(create_instance))
            .route("/{id}", web::get().to(get_instance))
            .route("/{id}", web::delete().to(delete_instance))
            .route("/{id}/connect", web::post().to(connect))
            .route("/{id}/qr", web::get().to(get_qr))
            .route("/{id}/status", web::get().to(get_status))
            .route("/{id}/logout", web::post().to(logout))
            .route("/{id}/restart", web::post().to(restart))
            .route("/{id}/proxy", web::put().to(set_proxy))
            .route("/{id}/webhook", web::put().to(set_webhook)),
    );
}

#[derive(Serialize)]
struct InstanceResponse {
    success: bool,
    instance: Instance,
}

#[derive(Serialize)]
struct InstanceListResponse {
    success: bool,
    instances: Vec<Instance>,
    total: usize,
    max_instances: usize,
}

#[derive(Deserialize)]
pub struct ProxyRequest {
    proxy_url: Option<String>,
}

#[derive(Deserialize)]
pub struct WebhookRequest {
    webhook_url: Option<String>,
}

/// Treat blank strings in nullable fields as null
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Persist a status change and tell the owner's dashboards about it
fn apply_status(state: &AppState, instance: &Instance, status: InstanceStatus, phone: Option<&str>) -> Result<(), HttpResponse> {
    state
        .db
        .update_instance_status(&instance.id, status, phone)
        .map_err(|e| internal_error("Failed to update instance status", e))?;

    let phone = phone.or(instance.phone_number.as_deref());
    state.broadcaster.send_to_user(
        &instance.user_id,
        GatewayEvent::instance_status(&instance.id, &status.to_string(), phone),
    );
    Ok(())
}

fn reload(state: &AppState, instance_id: &str) -> HttpResponse {
    match state.db.get_instance(instance_id) {
        Ok(Some(instance)) => HttpResponse::Ok().json(InstanceResponse {
            success: true,
            instance,
        }),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Instance not found"),
        Err(e) => internal_error("Failed to load instance", e),
    }
}

async fn list_instances(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let quota = match state.db.daily_quota(&user_id, chrono::Utc::now()) {
        Ok(q) => q,
        Err(e) => return internal_error("Failed to load plan", e),
    };

    match state.db.list_instances(&user_id) {
        Ok(instances) => HttpResponse::Ok().json(InstanceListResponse {
            success: true,
            total: instances.len(),
            instances,
            max_instances: quota.plan.limits().max_instances,
        }),
        Err(e) => internal_error("Failed to list instances", e),
    }
}

async fn create_instance(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateInstanceRequest>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let name = body.name.trim();
    if let Err(e) = validate_instance_name(name) {
        return error_response(StatusCode::BAD_REQUEST, e);
    }

    let plan = match state.db.daily_quota(&user_id, chrono::Utc::now()) {
        Ok(q) => q.plan,
        Err(e) => return internal_error("Failed to load plan", e),
    };
    let count = match state.db.count_instances(&user_id) {
        Ok(n) => n,
        Err(e) => return internal_error("Failed to count instances", e),
    };
    if count >= plan.limits().max_instances {
        return error_response(
            StatusCode::FORBIDDEN,
            format!(
                "The {} plan allows {} instance(s); upgrade to add more",
                plan.label(),
                plan.limits().max_instances
            ),
        );
    }

    match state.db.create_instance(&user_id, name) {
        Ok(instance) => {
            log::info!("Created instance {} ({}) for user {}", instance.id, instance.name, user_id);
            HttpResponse::Created().json(InstanceResponse {
                success: true,
                instance,
            })
        }
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            error_response(StatusCode::CONFLICT, "An instance with this name already exists")
        }
        Err(e) => internal_error("Failed to create instance", e),
    }
}

async fn get_instance(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match owned_instance(&state, &user_id, &path) {
        Ok(instance) => HttpResponse::Ok().json(InstanceResponse {
            success: true,
            instance,
        }),
        Err(resp) => resp,
    }
}

async fn delete_instance(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let stopped = state.bulk.stop_instance_jobs(&instance.id);
    if stopped > 0 {
        log::info!("Stopped {} bulk job(s) of deleted instance {}", stopped, instance.id);
    }

    // The row goes regardless of what the backend says
    if let Err(e) = state.backend.delete_session(&instance.id).await {
        if !e.is_not_found() {
            log::warn!("Backend session delete for {} failed: {}", instance.id, e);
        }
    }

    match state.db.delete_instance(&instance.id) {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => internal_error("Failed to delete instance", e),
    }
}

async fn connect(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let webhook_url = state.config.webhook_url();
    let backend_response = match state
        .backend
        .create_session(&instance.id, &webhook_url, instance.proxy_url.as_deref())
        .await
    {
        Ok(value) => value,
        Err(e) => return backend_error("Failed to start session", &e),
    };

    if let Err(resp) = apply_status(&state, &instance, InstanceStatus::Connecting, None) {
        return resp;
    }

    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "status": InstanceStatus::Connecting,
        "backend": backend_response
    }))
}

async fn get_qr(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    match state.backend.get_qr(&instance.id).await {
        Ok(qr) => {
            if qr.qr.is_some() && instance.status != InstanceStatus::Qr {
                if let Err(resp) = apply_status(&state, &instance, InstanceStatus::Qr, None) {
                    return resp;
                }
            }
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "qr": qr.qr,
                "pairing_code": qr.pairing_code,
                "status": qr.status
            }))
        }
        Err(e) => backend_error("Failed to fetch QR code", &e),
    }
}

/// Fetch the live session state and sync it into the row
async fn get_status(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let live = match state.backend.get_status(&instance.id).await {
        Ok(s) => s,
        Err(e) if e.is_not_found() => {
            // No session on the backend: treat as disconnected unless never connected
            let status = match instance.status {
                InstanceStatus::Created | InstanceStatus::LoggedOut => instance.status,
                _ => InstanceStatus::Disconnected,
            };
            if status != instance.status {
                if let Err(resp) = apply_status(&state, &instance, status, None) {
                    return resp;
                }
            }
            return reload(&state, &instance.id);
        }
        Err(e) => return backend_error("Failed to fetch session status", &e),
    };

    let phone = live.phone.as_deref().map(|p| {
        if p.contains('@') {
            phone_from_jid(p).unwrap_or_else(|| normalize_phone(p))
        } else {
            normalize_phone(p)
        }
    });
    let phone = phone.filter(|p| !p.is_empty());

    match InstanceStatus::from_backend_state(&live.state) {
        Some(status) if status != instance.status || (phone.is_some() && phone != instance.phone_number) => {
            if let Err(resp) = apply_status(&state, &instance, status, phone.as_deref()) {
                return resp;
            }
        }
        Some(_) => {}
        None => log::warn!("Unknown backend state '{}' for instance {}", live.state, instance.id),
    }

    reload(&state, &instance.id)
}

async fn logout(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    if let Err(e) = state.backend.logout(&instance.id).await {
        if !e.is_not_found() {
            return backend_error("Failed to log out session", &e);
        }
    }

    if let Err(resp) = apply_status(&state, &instance, InstanceStatus::LoggedOut, None) {
        return resp;
    }
    reload(&state, &instance.id)
}

async fn restart(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    if let Err(e) = state.backend.restart(&instance.id).await {
        return backend_error("Failed to restart session", &e);
    }

    if let Err(resp) = apply_status(&state, &instance, InstanceStatus::Connecting, None) {
        return resp;
    }
    reload(&state, &instance.id)
}

async fn set_proxy(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<ProxyRequest>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let proxy_url = match non_blank(&body.proxy_url).map(validate_proxy_url).transpose() {
        Ok(p) => p.map(|u| u.to_string()),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    if let Err(e) = state.db.set_instance_proxy(&instance.id, proxy_url.as_deref()) {
        return internal_error("Failed to save proxy", e);
    }

    // A live session picks up the change right away; otherwise it applies on next connect
    let live = !matches!(instance.status, InstanceStatus::Created | InstanceStatus::LoggedOut);
    let mut applied = false;
    if live {
        match state.backend.set_proxy(&instance.id, proxy_url.as_deref()).await {
            Ok(()) => applied = true,
            Err(e) => log::warn!("Backend proxy update for {} failed: {}", instance.id, e),
        }
    }

    log::info!(
        "Proxy for instance {} set to {}",
        instance.id,
        proxy_url
            .as_deref()
            .and_then(|p| url::Url::parse(p).ok())
            .map(|u| redact(&u))
            .unwrap_or_else(|| "none".to_string())
    );

    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "proxy_url": proxy_url,
        "applied_to_session": applied
    }))
}

async fn set_webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<WebhookRequest>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let webhook_url = non_blank(&body.webhook_url);
    if let Some(raw) = webhook_url {
        match url::Url::parse(raw) {
            Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => {}
            _ => return error_response(StatusCode::BAD_REQUEST, "Webhook URL must be an http(s) URL"),
        }
    }

    match state.db.set_instance_webhook(&instance.id, webhook_url) {
        Ok(_) => reload(&state, &instance.id),
        Err(e) => internal_error("Failed to save webhook URL", e),
    }
}
