//! Shared fixtures for handler tests

use actix_web::web;
use std::sync::Arc;

use crate::bulk_send::BulkSendManager;
use crate::config::Config;
use crate::db::Database;
use crate::gateway::EventBroadcaster;
use crate::scheduler::CleanupScheduler;
use crate::webhook::WebhookProcessor;
use crate::whatsapp::testing::RecordingSender;
use crate::whatsapp::BackendClient;
use crate::AppState;

pub fn test_state() -> web::Data<AppState> {
    test_state_with(Config::for_tests()).0
}

/// State plus the fake sender that stands in for the WhatsApp backend
pub fn test_state_with(config: Config) -> (web::Data<AppState>, Arc<RecordingSender>) {
    let db = Arc::new(Database::new(":memory:").expect("in-memory database"));
    let backend = Arc::new(BackendClient::new(&config.backend_url, None).expect("backend client"));
    let recorder = Arc::new(RecordingSender::default());
    let broadcaster = Arc::new(EventBroadcaster::new());
    let bulk = Arc::new(
        BulkSendManager::new(db.clone(), recorder.clone(), broadcaster.clone()).with_min_delay_ms(0),
    );
    let webhooks = Arc::new(WebhookProcessor::new(db.clone(), recorder.clone(), broadcaster.clone()));
    let cleanup = Arc::new(
        CleanupScheduler::new(db.clone(), &config.cleanup_schedule, config.message_retention_days)
            .expect("cleanup schedule"),
    );

    let state = web::Data::new(AppState {
        db,
        config,
        backend,
        sender: recorder.clone(),
        broadcaster,
        bulk,
        webhooks,
        cleanup,
    });
    (state, recorder)
}

/// Create a user with a session, returning `(user_id, token)`
pub fn sign_in(state: &AppState, email: &str) -> (String, String) {
    let user = state.db.create_user(email, "not-a-real-hash", None).expect("user");
    let session = state.db.create_session(&user.id, 1).expect("session");
    (user.id, session.token)
}
