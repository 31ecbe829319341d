use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{error_response, internal_error, start_of_day, window_days};
use crate::auth::{generate_api_key, mask_api_key};
use crate::db::fill_usage_days;
use crate::middleware::require_user;
use crate::models::{ApiKeyAction, ApiKeyHistoryEntry, Plan, PlanLimits, Profile, UpdateProfileRequest};
use crate::AppState;

const HISTORY_LIMIT: usize = 50;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/profile")
            .route("", web::get().to(get_profile))
            .route("", web::put().to(update_profile))
            .route("/api-key", web::post().to(create_api_key))
            .route("/api-key", web::delete().to(revoke_api_key))
            .route("/api-key/history", web::get().to(api_key_history))
            .route("/api-key/usage", web::get().to(api_key_usage)),
    );
}

/// Profile as shown on the dashboard; the API key is only ever shown masked
#[derive(Serialize)]
pub struct ProfileView {
    user_id: String,
    email: String,
    full_name: Option<String>,
    company: Option<String>,
    phone: Option<String>,
    plan: Plan,
    plan_expires_at: Option<chrono::DateTime<Utc>>,
    limits: PlanLimits,
    api_key: Option<String>,
    api_key_created_at: Option<chrono::DateTime<Utc>>,
}

impl From<Profile> for ProfileView {
    fn from(profile: Profile) -> Self {
        let plan = profile.effective_plan(Utc::now());
        Self {
            user_id: profile.user_id,
            email: profile.email,
            full_name: profile.full_name,
            company: profile.company,
            phone: profile.phone,
            plan,
            plan_expires_at: profile.plan_expires_at.filter(|_| plan != Plan::Free),
            limits: plan.limits(),
            api_key: profile.api_key.as_deref().map(mask_api_key),
            api_key_created_at: profile.api_key_created_at,
        }
    }
}

#[derive(Serialize)]
struct ProfileResponse {
    success: bool,
    profile: ProfileView,
}

#[derive(Serialize)]
struct ApiKeyResponse {
    success: bool,
    api_key: String,
    action: ApiKeyAction,
}

#[derive(Serialize)]
struct HistoryResponse {
    success: bool,
    history: Vec<ApiKeyHistoryEntry>,
}

#[derive(Deserialize)]
pub struct UsageQuery {
    days: Option<u32>,
}

fn load_profile(state: &AppState, user_id: &str) -> Result<Profile, HttpResponse> {
    match state.db.get_profile(user_id) {
        Ok(Some(profile)) => Ok(profile),
        Ok(None) => Err(error_response(StatusCode::NOT_FOUND, "Profile not found")),
        Err(e) => Err(internal_error("Failed to load profile", e)),
    }
}

async fn get_profile(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match load_profile(&state, &user_id) {
        Ok(profile) => HttpResponse::Ok().json(ProfileResponse {
            success: true,
            profile: profile.into(),
        }),
        Err(resp) => resp,
    }
}

fn clean_field(value: &Option<String>, max_len: usize, name: &str) -> Result<Option<String>, String> {
    match value.as_deref().map(str::trim) {
        Some(v) if v.chars().count() > max_len => Err(format!("{} is too long", name)),
        Some(v) => Ok(Some(v.to_string())),
        None => Ok(None),
    }
}

async fn update_profile(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<UpdateProfileRequest>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let fields = clean_field(&body.full_name, 120, "full_name").and_then(|full_name| {
        let company = clean_field(&body.company, 120, "company")?;
        let phone = clean_field(&body.phone, 32, "phone")?;
        Ok((full_name, company, phone))
    });
    let (full_name, company, phone) = match fields {
        Ok(f) => f,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    match state
        .db
        .update_profile(&user_id, full_name.as_deref(), company.as_deref(), phone.as_deref())
    {
        Ok(Some(profile)) => HttpResponse::Ok().json(ProfileResponse {
            success: true,
            profile: profile.into(),
        }),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Profile not found"),
        Err(e) => internal_error("Failed to update profile", e),
    }
}

/// Create the user's API key, replacing any existing one.
/// This is the only response that carries the full key.
async fn create_api_key(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let profile = match load_profile(&state, &user_id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let action = if profile.api_key.is_some() {
        ApiKeyAction::Regenerated
    } else {
        ApiKeyAction::Created
    };

    let api_key = generate_api_key();
    if let Err(e) = state.db.set_api_key(&user_id, Some(&api_key)) {
        return internal_error("Failed to store API key", e);
    }
    if let Err(e) = state.db.add_api_key_history(&user_id, &mask_api_key(&api_key), action) {
        log::error!("Failed to record API key history: {}", e);
    }

    log::info!("API key {} for user {}", action, user_id);
    HttpResponse::Ok().json(ApiKeyResponse {
        success: true,
        api_key,
        action,
    })
}

async fn revoke_api_key(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let profile = match load_profile(&state, &user_id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let Some(current) = profile.api_key else {
        return error_response(StatusCode::NOT_FOUND, "No API key to revoke");
    };

    if let Err(e) = state.db.set_api_key(&user_id, None) {
        return internal_error("Failed to revoke API key", e);
    }
    if let Err(e) = state
        .db
        .add_api_key_history(&user_id, &mask_api_key(&current), ApiKeyAction::Revoked)
    {
        log::error!("Failed to record API key history: {}", e);
    }

    HttpResponse::Ok().json(serde_json::json!({ "success": true }))
}

async fn api_key_history(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.db.list_api_key_history(&user_id, HISTORY_LIMIT) {
        Ok(history) => HttpResponse::Ok().json(HistoryResponse {
            success: true,
            history,
        }),
        Err(e) => internal_error("Failed to load API key history", e),
    }
}

async fn api_key_usage(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<UsageQuery>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let days = match window_days(query.days) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let today = Utc::now().date_naive();
    let first = today - Duration::days(days as i64 - 1);

    match state.db.api_usage_since(&user_id, start_of_day(first)) {
        Ok(mut usage) => {
            usage.days = fill_usage_days(usage.days, first, today);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "days": days,
                "usage": usage
            }))
        }
        Err(e) => internal_error("Failed to load API usage", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sign_in, test_state};
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_api_key_lifecycle() {
        let state = test_state();
        let (user_id, token) = sign_in(&state, "keys@example.com");
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;
        let auth = ("Authorization", format!("Bearer {}", token));

        let req = test::TestRequest::post().uri("/api/profile/api-key").insert_header(auth.clone()).to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["action"], "created");
        let first_key = body["api_key"].as_str().unwrap().to_string();

        let req = test::TestRequest::post().uri("/api/profile/api-key").insert_header(auth.clone()).to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["action"], "regenerated");
        assert!(state.db.get_profile_by_api_key(&first_key).unwrap().is_none());

        let req = test::TestRequest::get().uri("/api/profile").insert_header(auth.clone()).to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["profile"]["api_key"].as_str().unwrap().contains('…'));

        let req = test::TestRequest::delete().uri("/api/profile/api-key").insert_header(auth.clone()).to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let req = test::TestRequest::delete().uri("/api/profile/api-key").insert_header(auth.clone()).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let history = state.db.list_api_key_history(&user_id, 10).unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|h| !h.masked_key.contains(&first_key)));
    }

    #[actix_web::test]
    async fn test_usage_window_validation() {
        let state = test_state();
        let (_user_id, token) = sign_in(&state, "usage@example.com");
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::get()
            .uri("/api/profile/api-key/usage?days=3")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["usage"]["days"].as_array().unwrap().len(), 3);

        let req = test::TestRequest::get()
            .uri("/api/profile/api-key/usage?days=365")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
