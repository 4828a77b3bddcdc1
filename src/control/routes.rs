//! Per-engine control routes: `GET /status` and `POST /set`.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ControlError;
use crate::sync::EngineControl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EngineAction {
    Start,
    Stop,
}

/// Body of `POST /set`. Both fields optional; nothing else allowed.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct SetRequest {
    #[serde(default)]
    action: Option<EngineAction>,
    #[serde(default)]
    poll_time: Option<String>,
}

/// Milliseconds as a positive integer string.
fn parse_poll_time(raw: &str) -> Result<u64, ControlError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(ms),
        _ => Err(ControlError::InvalidPollTime(raw.to_string())),
    }
}

/// GET /status
async fn get_status(State(engine): State<Arc<dyn EngineControl>>) -> impl IntoResponse {
    Json(engine.status())
}

/// POST /set
///
/// Everything is validated before the engine is touched.
async fn set(
    State(engine): State<Arc<dyn EngineControl>>,
    payload: Result<Json<SetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ControlError> {
    let Json(request) = payload.map_err(|e| ControlError::MalformedBody(e.body_text()))?;
    let poll_time = request.poll_time.as_deref().map(parse_poll_time).transpose()?;

    if let Some(ms) = poll_time {
        engine.set_poll_time(ms);
    }
    match request.action {
        Some(EngineAction::Start) => engine.start(),
        Some(EngineAction::Stop) => engine.stop(),
        None => {}
    }

    tracing::info!(
        engine = engine.name(),
        action = ?request.action,
        poll_time_ms = ?poll_time,
        "Engine control updated"
    );
    Ok(Json(engine.status()))
}

/// Build the control routes for one engine, to be nested under its prefix.
pub fn engine_routes(engine: Arc<dyn EngineControl>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/set", post(set))
        .with_state(engine)
}
