use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::{backend_error, error_response};
use crate::middleware::require_user;
use crate::proxy::{redact, test_proxy, validate_proxy_url};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/proxy/test").route(web::post().to(test)));
    cfg.service(web::resource("/api/cache/stats").route(web::get().to(cache_stats)));
}

#[derive(Deserialize)]
pub struct ProxyTestRequest {
    proxy_url: String,
}

async fn test(state: web::Data<AppState>, req: HttpRequest, body: web::Json<ProxyTestRequest>) -> impl Responder {
    if let Err(resp) = require_user(&state, &req) {
        return resp;
    }

    let proxy_url = match validate_proxy_url(&body.proxy_url) {
        Ok(url) => url,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    log::info!("[PROXY] Testing {}", redact(&proxy_url));
    let result = test_proxy(&proxy_url, &state.config.proxy_test_url).await;
    HttpResponse::Ok().json(result)
}

async fn cache_stats(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = require_user(&state, &req) {
        return resp;
    }

    match state.backend.cache_stats().await {
        Ok(stats) => HttpResponse::Ok().json(serde_json::json!({"success": true, "stats": stats})),
        Err(e) => backend_error("Failed to load cache stats", &e),
    }
}
