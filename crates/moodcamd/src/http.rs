//! HTTP surface: frame analysis, uploads, history and status.

use crate::engine::{EngineError, EngineHandle};
use crate::store_slot::StoreSlot;
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::BytesRejection;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use moodcam_core::{AnalysisResult, DetectorMode, ImageSource, PersistenceGate, RequestMeta, ScaleFactor};
use moodcam_store::HISTORY_PAGE_SIZE;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::Instrument;

pub struct AppState {
    pub engine: EngineHandle,
    pub store: StoreSlot,
    pub gate: PersistenceGate,
    pub mode: DetectorMode,
    pub scale: ScaleFactor,
}

pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/process_frame", post(process_frame))
        .route("/upload", post(upload))
        .route("/history", get(history))
        .route("/status", get(status))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

#[derive(Deserialize)]
struct FrameRequest {
    image: Option<String>,
    username: Option<String>,
}

/// What the shared analysis path produced for one request.
#[derive(Debug)]
enum Outcome {
    Analyzed(AnalysisResult),
    InvalidImage,
    EngineDown,
}

/// POST /process_frame: JSON body with a data-URI frame.
async fn process_frame(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let span = tracing::info_span!(
        "request",
        id = %uuid::Uuid::new_v4(),
        route = "/process_frame",
        %peer
    );
    async move {
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e.body_text(), "request body rejected");
                return frame_server_error();
            }
        };
        let request: FrameRequest = match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request body");
                return frame_server_error();
            }
        };
        let image = match request.image {
            Some(image) if !image.is_empty() => image,
            _ => return Json(json!({ "status": "error", "msg": "No image" })).into_response(),
        };
        let meta = RequestMeta {
            source_address: peer.ip().to_string(),
            username: request.username,
        };

        match analyze_and_record(&state, ImageSource::DataUri(image), &meta).await {
            Outcome::Analyzed(result) => Json(result).into_response(),
            Outcome::InvalidImage => {
                Json(json!({ "status": "error", "msg": "Invalid image" })).into_response()
            }
            Outcome::EngineDown => frame_server_error(),
        }
    }
    .instrument(span)
    .await
}

fn frame_server_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "status": "error" }))).into_response()
}

/// POST /upload: multipart with a `file` field and optional `username`.
async fn upload(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let span = tracing::info_span!(
        "request",
        id = %uuid::Uuid::new_v4(),
        route = "/upload",
        %peer
    );
    async move {
        // A body that is not multipart at all carries no file.
        let mut multipart = match multipart {
            Ok(multipart) => multipart,
            Err(e) => {
                tracing::debug!(error = %e.body_text(), "not a multipart body");
                return no_file();
            }
        };

        let mut file = None;
        let mut username = None;
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => return upload_server_error(e.body_text()),
            };
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("file") => match field.bytes().await {
                    Ok(data) => file = Some(data.to_vec()),
                    Err(e) => return upload_server_error(e.body_text()),
                },
                Some("username") => match field.text().await {
                    Ok(text) => username = Some(text),
                    Err(e) => return upload_server_error(e.body_text()),
                },
                _ => {}
            }
        }

        let Some(bytes) = file else {
            return no_file();
        };
        let meta = RequestMeta {
            source_address: peer.ip().to_string(),
            username,
        };

        match analyze_and_record(&state, ImageSource::Bytes(bytes), &meta).await {
            Outcome::Analyzed(result) => Json(result).into_response(),
            Outcome::InvalidImage => Json(json!({ "error": "Invalid image" })).into_response(),
            Outcome::EngineDown => upload_server_error(EngineError::ChannelClosed.to_string()),
        }
    }
    .instrument(span)
    .await
}

fn no_file() -> Response {
    Json(json!({ "error": "No file" })).into_response()
}

fn upload_server_error(msg: String) -> Response {
    tracing::warn!(error = %msg, "upload failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": msg }))).into_response()
}

/// Run the pipeline on the engine thread, then pass the result through the
/// persistence gate. Store failures are logged and never reach the caller.
async fn analyze_and_record(state: &AppState, source: ImageSource, meta: &RequestMeta) -> Outcome {
    let result = match state.engine.analyze(source).await {
        Ok(result) => result,
        Err(EngineError::Pipeline(e)) if e.is_decode() => {
            tracing::debug!(error = %e, "frame rejected");
            return Outcome::InvalidImage;
        }
        Err(EngineError::Pipeline(e)) => {
            tracing::warn!(error = %e, "analysis failed");
            return Outcome::Analyzed(AnalysisResult::failed());
        }
        Err(e @ EngineError::ChannelClosed) => {
            tracing::error!(error = %e, "engine unavailable");
            return Outcome::EngineDown;
        }
    };

    let Some(observation) = state.gate.admit(&result, meta) else {
        tracing::debug!(has_face = result.has_face, score = ?result.score, "not persisted");
        return Outcome::Analyzed(result);
    };

    match state.store.get().await {
        Ok(store) => match store.append(&observation).await {
            Ok(id) => tracing::info!(
                id,
                emotion = %observation.emotion,
                confidence = observation.confidence,
                "observation persisted"
            ),
            Err(e) => tracing::warn!(error = %e, "failed to persist observation"),
        },
        Err(e) => tracing::warn!(error = %e, "history store unavailable; observation dropped"),
    }

    Outcome::Analyzed(result)
}

/// GET /history: the most recent records, newest first.
async fn history(State(state): State<Arc<AppState>>) -> Response {
    let records = match state.store.get().await {
        Ok(store) => store.recent(HISTORY_PAGE_SIZE).await.map_err(|e| e.to_string()),
        Err(e) => Err(e),
    };
    match records {
        Ok(records) => Json(records).into_response(),
        Err(msg) => {
            tracing::warn!(error = %msg, "history read failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Lỗi đọc dữ liệu: {msg}") })),
            )
                .into_response()
        }
    }
}

/// GET /status
async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let store = if state.store.open_store().is_some() { "ok" } else { "unavailable" };
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "mode": state.mode,
        "scale_factor": state.scale.get(),
        "history_store": store,
    }))
}
