//! Axum wiring for the two command endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;

use crate::store::Store;

use super::{Handlers, PropertyCommand, Response, UserCommand};

/// Routes both endpoints onto a shared handler set.
pub fn handler_router<S: Store + 'static>(handlers: Arc<Handlers<S>>) -> Router {
    Router::new()
        .route("/api/v1/room-management", post(room_management::<S>))
        .route("/api/v1/user-management", post(user_management::<S>))
        .with_state(handlers)
}

async fn room_management<S: Store + 'static>(
    State(handlers): State<Arc<Handlers<S>>>,
    Json(payload): Json<Value>,
) -> Json<Response> {
    let action = action_name(&payload);
    tracing::debug!(action = %action, endpoint = "room-management", "dispatching");
    match decode::<PropertyCommand>(payload) {
        Ok(command) => Json(handlers.dispatch_property(command)),
        Err(response) => Json(response),
    }
}

async fn user_management<S: Store + 'static>(
    State(handlers): State<Arc<Handlers<S>>>,
    Json(payload): Json<Value>,
) -> Json<Response> {
    let action = action_name(&payload);
    tracing::debug!(action = %action, endpoint = "user-management", "dispatching");
    match decode::<UserCommand>(payload) {
        Ok(command) => Json(handlers.dispatch_user(command)),
        Err(response) => Json(response),
    }
}

fn action_name(payload: &Value) -> String {
    payload
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("<missing>")
        .to_string()
}

fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, Response> {
    serde_json::from_value(payload).map_err(|err| {
        let detail = err.to_string();
        // serde reports unrecognized tags as "unknown variant ...".
        if detail.starts_with("unknown variant") {
            Response::fail("未知操作")
        } else {
            Response::fail(detail)
        }
    })
}
