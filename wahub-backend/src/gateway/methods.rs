use serde::Deserialize;
use serde_json::json;

use crate::bulk_send::BulkSendManager;
use crate::gateway::protocol::{RpcError, RpcRequest, RpcResponse};

#[derive(Debug, Deserialize)]
struct BulkStatusParams {
    job_id: String,
}

/// Dispatch a client RPC call on behalf of `user_id`
pub fn dispatch(request: RpcRequest, user_id: &str, bulk: &BulkSendManager) -> RpcResponse {
    match request.method.as_str() {
        "ping" => RpcResponse::success(request.id, json!({ "pong": true })),
        "bulk.status" => bulk_status(request, user_id, bulk),
        _ => RpcResponse::error(request.id, RpcError::method_not_found()),
    }
}

fn bulk_status(request: RpcRequest, user_id: &str, bulk: &BulkSendManager) -> RpcResponse {
    let params: BulkStatusParams = match serde_json::from_value(request.params) {
        Ok(p) => p,
        Err(e) => return RpcResponse::error(request.id, RpcError::invalid_params(e.to_string())),
    };

    match bulk.get(user_id, &params.job_id) {
        Some(job) => match serde_json::to_value(&job) {
            Ok(value) => RpcResponse::success(request.id, value),
            Err(e) => RpcResponse::error(request.id, RpcError::new(-32603, e.to_string())),
        },
        None => RpcResponse::error(request.id, RpcError::new(404, "Bulk job not found")),
    }
}
