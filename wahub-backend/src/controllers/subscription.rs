use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{error_response, internal_error};
use crate::middleware::require_user;
use crate::models::{Plan, PlanLimits, PlanOffer};
use crate::AppState;

/// Length of a paid period activated by an upgrade
const BILLING_PERIOD_DAYS: i64 = 30;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/store/plans").route(web::get().to(list_plans)));
    cfg.service(
        web::scope("/api/subscription")
            .route("", web::get().to(get_subscription))
            .route("/upgrade", web::post().to(upgrade)),
    );
}

#[derive(Serialize)]
struct PlansResponse {
    success: bool,
    plans: Vec<PlanOffer>,
}

#[derive(Serialize)]
struct Usage {
    instances: usize,
    messages_today: i64,
    messages_remaining_today: Option<i64>,
}

#[derive(Serialize)]
struct SubscriptionResponse {
    success: bool,
    plan: Plan,
    plan_expires_at: Option<DateTime<Utc>>,
    limits: PlanLimits,
    usage: Usage,
}

#[derive(Deserialize)]
pub struct UpgradeRequest {
    plan: String,
}

async fn list_plans() -> impl Responder {
    HttpResponse::Ok().json(PlansResponse {
        success: true,
        plans: Plan::catalogue(),
    })
}

async fn get_subscription(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let now = Utc::now();
    let profile = match state.db.get_profile(&user_id) {
        Ok(Some(p)) => p,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Profile not found"),
        Err(e) => return internal_error("Failed to load profile", e),
    };
    let plan = profile.effective_plan(now);

    let instances = match state.db.count_instances(&user_id) {
        Ok(n) => n,
        Err(e) => return internal_error("Failed to count instances", e),
    };
    let quota = match state.db.daily_quota(&user_id, now) {
        Ok(q) => q,
        Err(e) => return internal_error("Failed to load daily usage", e),
    };

    HttpResponse::Ok().json(SubscriptionResponse {
        success: true,
        plan,
        plan_expires_at: profile.plan_expires_at.filter(|_| plan != Plan::Free),
        limits: plan.limits(),
        usage: Usage {
            instances,
            messages_today: quota.sent_today,
            messages_remaining_today: quota.remaining(),
        },
    })
}

/// Activate a plan for one billing period. Payment is captured by the
/// external checkout before this is called.
async fn upgrade(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<UpgradeRequest>,
) -> impl Responder {
    let user_id = match require_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let plan = match Plan::from_str(body.plan.trim()) {
        Ok(p) => p,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, format!("Unknown plan '{}'", body.plan)),
    };

    let expires_at = (plan != Plan::Free).then(|| Utc::now() + Duration::days(BILLING_PERIOD_DAYS));

    match state.db.set_plan(&user_id, plan, expires_at) {
        Ok(Some(profile)) => {
            log::info!("User {} moved to plan {}", user_id, plan);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "plan": profile.plan,
                "plan_expires_at": profile.plan_expires_at,
                "limits": plan.limits()
            }))
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Profile not found"),
        Err(e) => internal_error("Failed to update plan", e),
    }
}
