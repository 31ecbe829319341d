use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde_json::json;

use super::{error_response, internal_error};
use crate::middleware::session_auth::extract_token;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/cron")
            .route("/cleanup", web::post().to(run_cleanup))
            .route("/status", web::get().to(status)),
    );
}

/// Check the `Authorization: Bearer <CRON_SECRET>` header.
/// Without a configured secret the endpoints do not exist.
fn authorize(state: &AppState, req: &HttpRequest) -> Result<(), HttpResponse> {
    let Some(secret) = state.config.cron_secret.as_deref() else {
        return Err(error_response(StatusCode::NOT_FOUND, "Cron endpoints are disabled"));
    };

    match extract_token(req) {
        Some(token) if token == secret => Ok(()),
        _ => Err(error_response(StatusCode::UNAUTHORIZED, "Invalid cron secret")),
    }
}

async fn run_cleanup(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = authorize(&state, &req) {
        return resp;
    }

    let cleanup = state.cleanup.clone();
    match web::block(move || cleanup.run_now()).await {
        Ok(Ok(run)) => HttpResponse::Ok().json(json!({"success": true, "run": run})),
        Ok(Err(e)) => internal_error("Cleanup failed", e),
        Err(e) => internal_error("Cleanup task failed", e),
    }
}

async fn status(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = authorize(&state, &req) {
        return resp;
    }

    HttpResponse::Ok().json(json!({
        "success": true,
        "next_run": state.cleanup.next_run(),
        "last_run": state.cleanup.last_run()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_support::{test_state, test_state_with};
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_cleanup_requires_secret() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/cron/cleanup")
            .insert_header(("Authorization", "Bearer wrong"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/cron/cleanup")
            .insert_header(("Authorization", "Bearer cron-secret"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["run"]["report"]["old_messages"], 0);

        let req = test::TestRequest::get()
            .uri("/api/cron/status")
            .insert_header(("Authorization", "Bearer cron-secret"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(!body["last_run"].is_null());
        assert!(!body["next_run"].is_null());
    }

    #[actix_web::test]
    async fn test_disabled_without_secret() {
        let mut no_secret = Config::for_tests();
        no_secret.cron_secret = None;
        let (state, _sender) = test_state_with(no_secret);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/cron/cleanup")
            .insert_header(("Authorization", "Bearer anything"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
