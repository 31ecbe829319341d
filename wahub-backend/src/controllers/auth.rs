use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use super::{error_response, internal_error};
use crate::auth::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::middleware::session_auth::extract_token;
use crate::models::{Session, User};
use crate::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    email: String,
    password: String,
    name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
pub struct UserInfo {
    id: String,
    email: String,
    name: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    success: bool,
    token: String,
    expires_at: i64,
    user: UserInfo,
}

#[derive(Deserialize)]
pub struct LogoutRequest {
    token: String,
}

#[derive(Serialize)]
pub struct LogoutResponse {
    success: bool,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    valid: bool,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .route("/validate", web::get().to(validate)),
    );
}

fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    let valid = !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
        && email.len() <= 254;
    valid.then_some(email)
}

fn login_response(user: &User, session: &Session) -> LoginResponse {
    LoginResponse {
        success: true,
        token: session.token.clone(),
        expires_at: session.expires_at.timestamp(),
        user: UserInfo {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
        },
    }
}

async fn register(state: web::Data<AppState>, body: web::Json<RegisterRequest>) -> impl Responder {
    let body = body.into_inner();

    let Some(email) = normalize_email(&body.email) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid email address");
    };
    if body.password.chars().count() < MIN_PASSWORD_LEN {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        );
    }

    match state.db.get_user_by_email(&email) {
        Ok(Some(_)) => return error_response(StatusCode::CONFLICT, "Email is already registered"),
        Ok(None) => {}
        Err(e) => return internal_error("Failed to look up user", e),
    }

    let password = body.password;
    let password_hash = match web::block(move || hash_password(&password)).await {
        Ok(Ok(hash)) => hash,
        Ok(Err(e)) => return internal_error("Failed to hash password", e),
        Err(e) => return internal_error("Password hashing task failed", e),
    };

    let name = body.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let user = match state.db.create_user(&email, &password_hash, name) {
        Ok(user) => user,
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return error_response(StatusCode::CONFLICT, "Email is already registered");
        }
        Err(e) => return internal_error("Failed to create user", e),
    };

    match state.db.create_session(&user.id, state.config.session_ttl_hours) {
        Ok(session) => {
            log::info!("Registered user {}", user.id);
            HttpResponse::Created().json(login_response(&user, &session))
        }
        Err(e) => internal_error("Failed to create session", e),
    }
}

async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> impl Responder {
    let body = body.into_inner();
    let invalid = || error_response(StatusCode::UNAUTHORIZED, "Invalid email or password");

    let Some(email) = normalize_email(&body.email) else {
        return invalid();
    };

    let user = match state.db.get_user_by_email(&email) {
        Ok(Some(user)) => user,
        Ok(None) => return invalid(),
        Err(e) => return internal_error("Failed to look up user", e),
    };

    let password = body.password;
    let hash = user.password_hash.clone();
    match web::block(move || verify_password(&password, &hash)).await {
        Ok(true) => {}
        Ok(false) => {
            log::info!("Failed login for user {}", user.id);
            return invalid();
        }
        Err(e) => return internal_error("Password verification task failed", e),
    }

    match state.db.create_session(&user.id, state.config.session_ttl_hours) {
        Ok(session) => HttpResponse::Ok().json(login_response(&user, &session)),
        Err(e) => internal_error("Failed to create session", e),
    }
}

async fn logout(state: web::Data<AppState>, body: web::Json<LogoutRequest>) -> impl Responder {
    match state.db.delete_session(&body.token) {
        Ok(_) => HttpResponse::Ok().json(LogoutResponse { success: true }),
        Err(e) => {
            log::error!("Failed to delete session: {}", e);
            HttpResponse::InternalServerError().json(LogoutResponse { success: false })
        }
    }
}

async fn validate(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let Some(token) = extract_token(&req) else {
        return HttpResponse::Ok().json(ValidateResponse { valid: false });
    };

    match state.db.validate_session(&token) {
        Ok(session) => HttpResponse::Ok().json(ValidateResponse {
            valid: session.is_some(),
        }),
        Err(e) => {
            log::error!("Failed to validate session: {}", e);
            HttpResponse::InternalServerError().json(ValidateResponse { valid: false })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_normalize_email() {
        assert_eq!(normalize_email("  Ana@Example.COM ").as_deref(), Some("ana@example.com"));
        assert!(normalize_email("no-at-sign").is_none());
        assert!(normalize_email("a@nodot").is_none());
        assert!(normalize_email("a b@example.com").is_none());
    }

    #[actix_web::test]
    async fn test_register_login_validate_logout() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(serde_json::json!({"email": "ana@example.com", "password": "longenough", "name": "Ana"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(serde_json::json!({"email": "ANA@example.com", "password": "longenough"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(serde_json::json!({"email": "ana@example.com", "password": "wrong-password"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(serde_json::json!({"email": "ana@example.com", "password": "longenough"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let token = body["token"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri("/api/auth/validate")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["valid"], true);

        let req = test::TestRequest::post()
            .uri("/api/auth/logout")
            .set_json(serde_json::json!({"token": token}))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
        assert!(state.db.validate_session(&token).unwrap().is_none());
    }

    #[actix_web::test]
    async fn test_register_rejects_short_password() {
        let app = test::init_service(App::new().app_data(test_state()).configure(config)).await;
        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(serde_json::json!({"email": "bo@example.com", "password": "short"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
