use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{error_response, internal_error, owned_instance};
use crate::bulk_send::{prepare_contacts, BulkJob, BulkJobRequest, BulkJobSummary, BulkSendError};
use crate::middleware::require_user;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/bulk")
            .route("", web::get().to(list_jobs))
            .route("", web::post().to(start_job))
            .route("/{id}", web::get().to(get_job))
            .route("/{id}/stop", web::post().to(stop_job)),
    );
}

#[derive(Deserialize)]
pub struct StartBulkRequest {
    instance_id: String,
    contacts: Vec<String>,
    message: String,
    delay_ms: Option<u64>,
}

#[derive(Serialize)]
struct StartBulkResponse {
    success: bool,
    job_id: String,
    total_contacts: usize,
    invalid: Vec<String>,
    duplicates: usize,
}

#[derive(Serialize)]
struct JobResponse {
    success: bool,
    job: BulkJob,
}

#[derive(Serialize)]
struct JobListResponse {
    success: bool,
    jobs: Vec<BulkJobSummary>,
}

async fn start_job(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<StartBulkRequest>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let body = body.into_inner();
    let instance = match owned_instance(&state, &user_id, &body.instance_id) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    if body.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, BulkSendError::EmptyMessage.to_string());
    }

    let prepared = prepare_contacts(&body.contacts);
    if prepared.contacts.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, BulkSendError::NoContacts.to_string());
    }

    let quota = match state.db.daily_quota(&user_id, Utc::now()) {
        Ok(q) => q,
        Err(e) => return internal_error("Failed to load daily usage", e),
    };
    let max_contacts = quota.plan.limits().max_bulk_contacts;
    if prepared.contacts.len() > max_contacts {
        return error_response(
            StatusCode::FORBIDDEN,
            format!(
                "The {} plan allows up to {} contacts per bulk send",
                quota.plan.label(),
                max_contacts
            ),
        );
    }
    let total = prepared.contacts.len();
    // Contacts already queued in running jobs will draw on the same allowance
    let queued = state.bulk.queued_for_user(&user_id) as i64;
    if !quota.allows(total as i64 + queued) {
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            format!(
                "Sending to {} contacts would exceed today's limit ({} remaining, {} already queued)",
                total,
                (quota.remaining().unwrap_or_default() - queued).max(0),
                queued
            ),
        );
    }

    let request = BulkJobRequest {
        user_id,
        instance_id: instance.id,
        contacts: prepared.contacts,
        message: body.message.trim().to_string(),
        delay_ms: body.delay_ms,
    };

    match state.bulk.start(request) {
        Ok(job_id) => HttpResponse::Accepted().json(StartBulkResponse {
            success: true,
            job_id,
            total_contacts: total,
            invalid: prepared.invalid,
            duplicates: prepared.duplicates,
        }),
        Err(e @ BulkSendError::AlreadyRunning(_)) => error_response(StatusCode::CONFLICT, e.to_string()),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn list_jobs(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    HttpResponse::Ok().json(JobListResponse {
        success: true,
        jobs: state.bulk.list(&user_id),
    })
}

async fn get_job(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.bulk.get(&user_id, &path) {
        Some(job) => HttpResponse::Ok().json(JobResponse { success: true, job }),
        None => error_response(StatusCode::NOT_FOUND, "Bulk job not found"),
    }
}

async fn stop_job(state: web::Data<AppState>, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.bulk.stop(&user_id, &path) {
        Some(job) => HttpResponse::Ok().json(JobResponse { success: true, job }),
        None => error_response(StatusCode::NOT_FOUND, "Bulk job not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StatDelta;
    use crate::models::Plan;
    use crate::test_support::{sign_in, test_state};
    use actix_web::{test, App};
    use chrono::Duration;
    use serde_json::json;

    #[actix_web::test]
    async fn test_free_plan_cannot_bulk_send() {
        let state = test_state();
        let (user_id, token) = sign_in(&state, "free@example.com");
        let instance = state.db.create_instance(&user_id, "main").unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/bulk")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({"instance_id": instance.id, "contacts": ["15551234567"], "message": "hi"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_start_and_ownership() {
        let state = test_state();
        let (user_id, token) = sign_in(&state, "bulk@example.com");
        state
            .db
            .set_plan(&user_id, Plan::Starter, Some(Utc::now() + Duration::days(30)))
            .unwrap();
        let instance = state.db.create_instance(&user_id, "main").unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/bulk")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({
                "instance_id": instance.id,
                "contacts": ["15551234567", "+1 (555) 123-4567", "abc", "15557654321"],
                "message": "Sale today",
                "delay_ms": 60000
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["total_contacts"], 2);
        assert_eq!(body["duplicates"], 1);
        assert_eq!(body["invalid"], json!(["abc"]));
        let job_id = body["job_id"].as_str().unwrap().to_string();

        // The long delay keeps the first job running
        let req = test::TestRequest::post()
            .uri("/api/bulk")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({"instance_id": instance.id, "contacts": ["15550001111"], "message": "again"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let (_, other_token) = sign_in(&state, "other@example.com");
        let req = test::TestRequest::get()
            .uri(&format!("/api/bulk/{}", job_id))
            .insert_header(("Authorization", format!("Bearer {}", other_token)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri(&format!("/api/bulk/{}/stop", job_id))
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["job"]["stopped"], true);
        assert_eq!(body["job"]["completed"], true);
    }

    #[actix_web::test]
    async fn test_running_jobs_reserve_daily_allowance() {
        let state = test_state();
        let (user_id, token) = sign_in(&state, "reserve@example.com");
        state
            .db
            .set_plan(&user_id, Plan::Starter, Some(Utc::now() + Duration::days(30)))
            .unwrap();
        let first = state.db.create_instance(&user_id, "first").unwrap();
        let second = state.db.create_instance(&user_id, "second").unwrap();
        // Starter allows 1000 a day
        state
            .db
            .record_stats(&first.id, Utc::now().date_naive(), StatDelta::sent(998))
            .unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/bulk")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({
                "instance_id": first.id,
                "contacts": ["15551230001", "15551230002"],
                "message": "first wave",
                "delay_ms": 60000
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);

        let req = test::TestRequest::post()
            .uri("/api/bulk")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({
                "instance_id": second.id,
                "contacts": ["15551230003", "15551230004"],
                "message": "second wave"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::TOO_MANY_REQUESTS);

        state.bulk.stop_instance_jobs(&first.id);
    }
}
