//! HTTP control surface.
//!
//! Each engine gets its own `/status` + `/set` pair under its name; the root
//! router adds health, ingestion counters and the inbound notification hook.

pub mod routes;

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::ControlError;
use crate::hooks::ServiceNotification;
use crate::mail::MailIngestionPipeline;
use crate::notify::EventDispatcher;
use crate::sync::EngineControl;

pub use routes::engine_routes;

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Shared state for the root routes.
#[derive(Clone)]
pub struct ControlState {
    pub engines: Vec<Arc<dyn EngineControl>>,
    pub ingestion: Option<Arc<MailIngestionPipeline>>,
    pub dispatcher: Option<Arc<EventDispatcher>>,
}

/// GET /health
async fn health(State(state): State<ControlState>) -> impl IntoResponse {
    let engines: serde_json::Map<String, Value> = state
        .engines
        .iter()
        .map(|e| (e.name().to_string(), json!(e.status())))
        .collect();
    Json(json!({
        "status": "ok",
        "engines": engines,
        "ingestion": state.ingestion.is_some(),
    }))
}

/// GET /ingestion/stats
async fn ingestion_stats(State(state): State<ControlState>) -> Response {
    match &state.ingestion {
        Some(pipeline) => Json(pipeline.stats()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Mail ingestion is not configured" })),
        )
            .into_response(),
    }
}

/// POST /hooks/source
async fn source_hook(
    State(state): State<ControlState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ControlError> {
    let Json(raw) = payload.map_err(|e| ControlError::MalformedBody(e.body_text()))?;
    let notification = ServiceNotification::from_json(raw)?;

    let Some(dispatcher) = &state.dispatcher else {
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Notification dispatch is not configured" })),
        )
            .into_response());
    };

    let delivery_id = Uuid::new_v4();
    match dispatcher.dispatch_notification(&notification).await {
        Ok(()) => {
            tracing::debug!(delivery_id = %delivery_id, event_type = notification.event_type(), "Notification dispatched");
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({ "deliveryId": delivery_id, "eventType": notification.event_type() })),
            )
                .into_response())
        }
        Err(e) => {
            tracing::warn!(
                delivery_id = %delivery_id,
                event_type = notification.event_type(),
                error = %e,
                "Notification dispatch failed"
            );
            Ok((StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() }))).into_response())
        }
    }
}

/// Build the full application router.
pub fn app_router(state: ControlState) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/ingestion/stats", get(ingestion_stats))
        .route("/hooks/source", post(source_hook))
        .with_state(state.clone());

    for engine in &state.engines {
        app = app.nest(&format!("/{}", engine.name()), engine_routes(Arc::clone(engine)));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
