pub mod auth;
pub mod bulk;
pub mod chatbot;
pub mod cron;
pub mod dashboard;
pub mod health;
pub mod instances;
pub mod messages;
pub mod profile;
pub mod proxy;
pub mod public_api;
pub mod subscription;
pub mod webhooks;

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::fmt::Display;

use crate::models::Instance;
use crate::whatsapp::BackendError;
use crate::AppState;

pub(crate) const DEFAULT_WINDOW_DAYS: u32 = 7;
pub(crate) const MAX_WINDOW_DAYS: u32 = 90;

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "success": false,
        "error": message.into()
    }))
}

/// Log a storage failure and hide the details from the client
pub(crate) fn internal_error(context: &str, e: impl Display) -> HttpResponse {
    log::error!("{}: {}", context, e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// Map a backend failure: a missing session stays 404, everything else is 502
pub(crate) fn backend_error(context: &str, e: &BackendError) -> HttpResponse {
    log::error!("{}: {}", context, e);
    if e.is_not_found() {
        error_response(StatusCode::NOT_FOUND, "Session not found on the WhatsApp backend")
    } else {
        error_response(StatusCode::BAD_GATEWAY, format!("WhatsApp backend error: {}", e))
    }
}

/// Load an instance owned by `user_id`; anything else is a 404
pub(crate) fn owned_instance(state: &AppState, user_id: &str, instance_id: &str) -> Result<Instance, HttpResponse> {
    match state.db.get_user_instance(user_id, instance_id) {
        Ok(Some(instance)) => Ok(instance),
        Ok(None) => Err(error_response(StatusCode::NOT_FOUND, "Instance not found")),
        Err(e) => Err(internal_error("Failed to load instance", e)),
    }
}

/// `?days=` for statistics windows: 1..=90, default 7
pub(crate) fn window_days(days: Option<u32>) -> Result<u32, HttpResponse> {
    let days = days.unwrap_or(DEFAULT_WINDOW_DAYS);
    if (1..=MAX_WINDOW_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("days must be between 1 and {}", MAX_WINDOW_DAYS),
        ))
    }
}

pub(crate) fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_days() {
        assert_eq!(window_days(None).unwrap(), DEFAULT_WINDOW_DAYS);
        assert_eq!(window_days(Some(90)).unwrap(), 90);
        assert!(window_days(Some(0)).is_err());
        assert!(window_days(Some(91)).is_err());
    }
}
