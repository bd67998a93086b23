//! HTTP control surface: start a batch, poll its status, mark listings.

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::Database;
use crate::pipeline::{IngestRequest, Pipeline};
use crate::sources::Source;
use crate::status::{IngestController, IngestStatus, StartOutcome};

#[derive(Clone)]
pub struct AppState {
    pub controller: IngestController,
    pub pipeline: Arc<Pipeline>,
    pub db: Arc<Database>,
}

#[derive(Debug, Default, Deserialize)]
struct StartIngestBody {
    source: Option<String>,
    keywords: Option<String>,
    location: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    ingest: IngestStatus,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
}

fn message(status: StatusCode, text: impl Into<String>) -> Response {
    (
        status,
        Json(MessageResponse {
            message: text.into(),
            status: None,
        }),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(handle_status))
        .route("/api/start-ingest", post(handle_start_ingest))
        .route("/api/listings/:id/action", post(handle_mark_actioned))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Control server listening on http://{}", addr);
    axum::serve(listener, router(state))
        .await
        .context("Control server stopped unexpectedly")
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        ingest: state.controller.snapshot().await,
    })
}

async fn handle_start_ingest(State(state): State<AppState>, body: Bytes) -> Response {
    // An empty body means "all defaults"
    let body: StartIngestBody = if body.iter().all(u8::is_ascii_whitespace) {
        StartIngestBody::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(e) => return message(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e)),
        }
    };

    let source = match body.source.as_deref() {
        None => Source::NativeList,
        Some(name) => match name.parse::<Source>() {
            Ok(source) => source,
            Err(e) => return message(StatusCode::BAD_REQUEST, e),
        },
    };

    let request = IngestRequest {
        source,
        keywords: body.keywords,
        location: body.location,
    };

    match state.controller.start(state.pipeline.clone(), request).await {
        StartOutcome::Started(_) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: format!("Ingestion started for {}", source),
                status: Some("RUNNING"),
            }),
        )
            .into_response(),
        StartOutcome::Rejected => message(StatusCode::CONFLICT, "Ingestion already running"),
    }
}

async fn handle_mark_actioned(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.db.mark_actioned(id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => message(StatusCode::NOT_FOUND, format!("Listing {} not found", id)),
        Err(e) => {
            tracing::error!(id, error = %format!("{:#}", e), "failed to mark listing actioned");
            message(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update listing")
        }
    }
}
