// Request authentication for dashboard routes (session bearer token) and
// the public API (x-api-key). Handlers call these at the top and return the
// error response as-is.

use actix_web::{HttpRequest, HttpResponse};

use crate::models::Profile;
use crate::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

pub fn extract_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the session of the request to its user id
pub fn require_user(state: &AppState, req: &HttpRequest) -> Result<String, HttpResponse> {
    let token = extract_token(req).ok_or_else(|| {
        HttpResponse::Unauthorized().json(serde_json::json!({
            "success": false,
            "error": "No authorization token provided"
        }))
    })?;

    match state.db.validate_session(&token) {
        Ok(Some(session)) => Ok(session.user_id),
        Ok(None) => Err(HttpResponse::Unauthorized().json(serde_json::json!({
            "success": false,
            "error": "Invalid or expired session"
        }))),
        Err(e) => {
            log::error!("Session validation error: {}", e);
            Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "success": false,
                "error": "Internal server error"
            })))
        }
    }
}

/// Resolve an `x-api-key` header to the owning profile
pub fn require_api_key(state: &AppState, req: &HttpRequest) -> Result<Profile, HttpResponse> {
    let key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            HttpResponse::Unauthorized().json(serde_json::json!({
                "success": false,
                "error": "Missing x-api-key header"
            }))
        })?;

    match state.db.get_profile_by_api_key(key) {
        Ok(Some(profile)) => Ok(profile),
        Ok(None) => Err(HttpResponse::Unauthorized().json(serde_json::json!({
            "success": false,
            "error": "Invalid API key"
        }))),
        Err(e) => {
            log::error!("API key lookup error: {}", e);
            Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "success": false,
                "error": "Internal server error"
            })))
        }
    }
}
