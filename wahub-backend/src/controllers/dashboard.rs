use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{internal_error, owned_instance, window_days, DEFAULT_WINDOW_DAYS};
use crate::middleware::require_user;
use crate::models::{InstanceStatus, Plan, StatsSummary};
use crate::AppState;

#[derive(Serialize)]
pub struct DashboardData {
    success: bool,
    plan: Plan,
    instances: usize,
    connected_instances: usize,
    sent_today: i64,
    received_today: i64,
    daily_limit: Option<i64>,
    remaining_today: Option<i64>,
    last_7_days: StatsSummary,
    running_bulk_jobs: usize,
}

#[derive(Deserialize)]
pub struct StatsQuery {
    days: Option<u32>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/dashboard").route(web::get().to(get_dashboard)));
    cfg.service(web::resource("/api/instances/{id}/stats").route(web::get().to(instance_stats)));
}

async fn get_dashboard(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let now = Utc::now();
    let today = now.date_naive();

    let instances = match state.db.list_instances(&user_id) {
        Ok(list) => list,
        Err(e) => return internal_error("Failed to list instances", e),
    };
    let quota = match state.db.daily_quota(&user_id, now) {
        Ok(q) => q,
        Err(e) => return internal_error("Failed to load daily usage", e),
    };
    let from = today - Duration::days(DEFAULT_WINDOW_DAYS as i64 - 1);
    let rows = match state.db.get_user_daily_stats(&user_id, from, today) {
        Ok(rows) => rows,
        Err(e) => return internal_error("Failed to load statistics", e),
    };

    let week = StatsSummary::from_rows(rows, today, DEFAULT_WINDOW_DAYS);
    let received_today = week.days.last().map(|d| d.messages_received).unwrap_or_default();

    HttpResponse::Ok().json(DashboardData {
        success: true,
        plan: quota.plan,
        instances: instances.len(),
        connected_instances: instances
            .iter()
            .filter(|i| i.status == InstanceStatus::Connected)
            .count(),
        sent_today: quota.sent_today,
        received_today,
        daily_limit: quota.limit,
        remaining_today: quota.remaining(),
        last_7_days: week,
        running_bulk_jobs: state.bulk.list(&user_id).iter().filter(|j| !j.completed).count(),
    })
}

async fn instance_stats(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<StatsQuery>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let instance = match owned_instance(&state, &user_id, &path) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    let days = match window_days(query.days) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let today = Utc::now().date_naive();
    let from = today - Duration::days(days as i64 - 1);
    match state.db.get_daily_stats(&instance.id, from, today) {
        Ok(rows) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "instance_id": instance.id,
            "lifetime_sent": instance.messages_sent,
            "lifetime_received": instance.messages_received,
            "stats": StatsSummary::from_rows(rows, today, days)
        })),
        Err(e) => internal_error("Failed to load statistics", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StatDelta;
    use crate::test_support::{sign_in, test_state};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_dashboard_totals() {
        let state = test_state();
        let (user_id, token) = sign_in(&state, "dash@example.com");
        let a = state.db.create_instance(&user_id, "a").unwrap();
        state
            .db
            .update_instance_status(&a.id, InstanceStatus::Connected, Some("15551234567"))
            .unwrap();
        let today = Utc::now().date_naive();
        state.db.record_stats(&a.id, today, StatDelta::sent(3)).unwrap();
        state.db.record_stats(&a.id, today, StatDelta::received(2)).unwrap();
        state
            .db
            .record_stats(&a.id, today - Duration::days(2), StatDelta::sent(4))
            .unwrap();

        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;
        let req = test::TestRequest::get()
            .uri("/api/dashboard")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["instances"], 1);
        assert_eq!(body["connected_instances"], 1);
        assert_eq!(body["sent_today"], 3);
        assert_eq!(body["received_today"], 2);
        assert_eq!(body["last_7_days"]["total_sent"], 7);
        assert_eq!(body["last_7_days"]["days"].as_array().unwrap().len(), 7);
    }

    #[actix_web::test]
    async fn test_instance_stats_window() {
        let state = test_state();
        let (user_id, token) = sign_in(&state, "stats@example.com");
        let instance = state.db.create_instance(&user_id, "main").unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/instances/{}/stats?days=30", instance.id))
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["stats"]["days"].as_array().unwrap().len(), 30);

        let req = test::TestRequest::get()
            .uri(&format!("/api/instances/{}/stats?days=91", instance.id))
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
