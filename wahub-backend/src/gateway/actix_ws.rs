use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures_util::StreamExt;
use serde::Deserialize;

use crate::gateway::methods;
use crate::gateway::protocol::{RpcError, RpcRequest, RpcResponse};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Upgrade an authenticated dashboard client to the event stream
pub async fn ws_handler(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsQuery>,
) -> actix_web::Result<HttpResponse> {
    let token = match query.token.as_deref().filter(|t| !t.is_empty()) {
        Some(t) => t,
        None => {
            return Ok(HttpResponse::Unauthorized().json(serde_json::json!({
                "success": false,
                "error": "No authorization token provided"
            })));
        }
    };

    let user_id = match state.db.validate_session(token) {
        Ok(Some(session)) => session.user_id,
        Ok(None) => {
            return Ok(HttpResponse::Unauthorized().json(serde_json::json!({
                "success": false,
                "error": "Invalid or expired session"
            })));
        }
        Err(e) => {
            log::error!("Failed to validate websocket session: {}", e);
            return Ok(HttpResponse::InternalServerError().json(serde_json::json!({
                "success": false,
                "error": "Internal server error"
            })));
        }
    };

    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;
    let (client_id, mut events) = state.broadcaster.subscribe(&user_id);
    let state = state.clone();

    log::info!("[GATEWAY] Client {} connected for user {}", client_id, user_id);

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(t) => t,
                        Err(e) => {
                            log::error!("[GATEWAY] Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if session.text(text).await.is_err() {
                        break;
                    }
                }
                msg = msg_stream.next() => {
                    let Some(Ok(msg)) = msg else { break };
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Text(text) => {
                            let response = match serde_json::from_str::<RpcRequest>(&text) {
                                Ok(request) => methods::dispatch(request, &user_id, &state.bulk),
                                Err(_) => RpcResponse::error(String::new(), RpcError::parse_error()),
                            };
                            let Ok(payload) = serde_json::to_string(&response) else { continue };
                            if session.text(payload).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(reason) => {
                            let _ = session.close(reason).await;
                            state.broadcaster.unsubscribe(&client_id);
                            log::info!("[GATEWAY] Client {} closed", client_id);
                            return;
                        }
                        _ => {}
                    }
                }
            }
        }

        state.broadcaster.unsubscribe(&client_id);
        let _ = session.close(None).await;
        log::info!("[GATEWAY] Client {} disconnected", client_id);
    });

    Ok(response)
}
