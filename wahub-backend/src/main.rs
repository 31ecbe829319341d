use actix_cors::Cors;
use actix_files::{Files, NamedFile};
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod auth;
mod bulk_send;
mod chatbot;
mod config;
mod controllers;
mod db;
mod gateway;
mod middleware;
mod models;
mod proxy;
mod scheduler;
mod webhook;
mod whatsapp;

#[cfg(test)]
mod test_support;

use bulk_send::BulkSendManager;
use config::Config;
use db::Database;
use gateway::EventBroadcaster;
use scheduler::CleanupScheduler;
use webhook::WebhookProcessor;
use whatsapp::{BackendClient, MessageSender};

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub backend: Arc<BackendClient>,
    /// Outbound send path; the backend client in production
    pub sender: Arc<dyn MessageSender>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub bulk: Arc<BulkSendManager>,
    pub webhooks: Arc<WebhookProcessor>,
    pub cleanup: Arc<CleanupScheduler>,
}

/// SPA fallback handler - serves index.html for client-side routing
async fn spa_fallback() -> actix_web::Result<NamedFile> {
    if std::path::Path::new("./wahub-frontend/dist/index.html").exists() {
        Ok(NamedFile::open("./wahub-frontend/dist/index.html")?)
    } else {
        Ok(NamedFile::open("../wahub-frontend/dist/index.html")?)
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = match Database::new(&config.database_url) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            log::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("Using WhatsApp backend at {}", config.backend_url);
    let backend = match BackendClient::new(&config.backend_url, config.backend_api_key.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::error!("Failed to create backend client: {}", e);
            std::process::exit(1);
        }
    };
    let sender: Arc<dyn MessageSender> = backend.clone();

    let broadcaster = Arc::new(EventBroadcaster::new());
    let bulk = Arc::new(BulkSendManager::new(db.clone(), sender.clone(), broadcaster.clone()));
    let webhooks = Arc::new(WebhookProcessor::new(db.clone(), sender.clone(), broadcaster.clone()));

    log::info!("Initializing cleanup scheduler ({})", config.cleanup_schedule);
    let cleanup = match CleanupScheduler::new(db.clone(), &config.cleanup_schedule, config.message_retention_days) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    // Start cleanup background task
    let cleanup_handle = Arc::clone(&cleanup);
    let (cleanup_shutdown_tx, cleanup_shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        cleanup_handle.start(cleanup_shutdown_rx).await;
    });

    // Set DISABLE_FRONTEND=1 to disable static file serving (for separate dev server)
    let frontend_dist = if std::env::var("DISABLE_FRONTEND").map(|v| v == "1" || v.to_lowercase() == "true").unwrap_or(false) {
        log::info!("Frontend serving disabled via DISABLE_FRONTEND env var");
        ""
    } else if std::path::Path::new("./wahub-frontend/dist").exists() {
        "./wahub-frontend/dist"
    } else if std::path::Path::new("../wahub-frontend/dist").exists() {
        "../wahub-frontend/dist"
    } else {
        log::warn!("Frontend dist not found in ./wahub-frontend/dist or ../wahub-frontend/dist - static file serving disabled");
        ""
    };

    log::info!("Starting WaHub server on port {}", port);
    log::info!("WebSocket gateway available at /ws");
    log::info!("Webhook URL for the backend: {}", config.webhook_url());
    if !frontend_dist.is_empty() {
        log::info!("Serving frontend from: {}", frontend_dist);
    }

    let state = web::Data::new(AppState {
        db,
        config,
        backend,
        sender,
        broadcaster,
        bulk,
        webhooks,
        cleanup,
    });
    let frontend_dist = frontend_dist.to_string();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let mut app = App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .wrap(cors)
            .configure(configure_routes);

        // Serve static files only if frontend dist exists
        if !frontend_dist.is_empty() {
            app = app.service(
                Files::new("/", frontend_dist.clone())
                    .index_file("index.html")
                    .default_handler(actix_web::web::to(spa_fallback)),
            );
        }

        app
    })
    .bind(("0.0.0.0", port))?
    .run();

    let result = server.await;
    let _ = cleanup_shutdown_tx.send(());
    result
}

/// Every API route plus the WebSocket gateway
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(controllers::health::config)
        .configure(controllers::auth::config)
        .configure(controllers::profile::config)
        .configure(controllers::subscription::config)
        // Resources under /api/instances/{id}/ must be registered before the
        // /api/instances scope, which would otherwise claim the prefix
        .configure(controllers::dashboard::config)
        .configure(controllers::messages::config)
        .configure(controllers::chatbot::config)
        .configure(controllers::instances::config)
        .configure(controllers::bulk::config)
        .configure(controllers::webhooks::config)
        .configure(controllers::cron::config)
        .configure(controllers::proxy::config)
        .configure(controllers::public_api::config)
        // WebSocket gateway route (same port as HTTP)
        .route("/ws", web::get().to(gateway::actix_ws::ws_handler));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test;

    #[actix_web::test]
    async fn test_instance_subroutes_are_reachable() {
        let state = test_support::test_state();
        let (user_id, token) = test_support::sign_in(&state, "routes@example.com");
        let instance = state.db.create_instance(&user_id, "main").unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure_routes)).await;

        for path in ["messages", "chats", "chatbot", "stats"] {
            let req = test::TestRequest::get()
                .uri(&format!("/api/instances/{}/{}", instance.id, path))
                .insert_header(("Authorization", format!("Bearer {}", token)))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK, "{}", path);
        }

        let req = test::TestRequest::get()
            .uri(&format!("/api/instances/{}", instance.id))
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_health_route() {
        let state = test_support::test_state();
        let app = test::init_service(App::new().app_data(state).configure(configure_routes)).await;
        let req = test::TestRequest::get().uri("/api/health").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
