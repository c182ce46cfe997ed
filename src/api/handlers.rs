use std::sync::Arc;
use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::api::form;
use crate::models::prediction::{DetectEmotionRequest, DetectEmotionResponse, ErrorResponse, PredictionResult};
use crate::pipeline::{predict_emotion, Prediction};
use crate::AppState;

const NO_FILE_PART: &str = "No file part in the request";
const NO_SELECTED_FILE: &str = "No selected file";
const NO_IMAGE_DATA: &str = "No image data provided";

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

/// Pulls the bytes of the `file` part out of a multipart upload.
async fn read_upload(multipart: Result<Multipart, MultipartRejection>) -> Result<(String, Bytes), Response> {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(e) => {
            debug!("Rejected upload body: {}", e.body_text());
            return Err(error_response(StatusCode::BAD_REQUEST, NO_FILE_PART));
        }
    };
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(error_response(StatusCode::BAD_REQUEST, NO_FILE_PART)),
            Err(e) => return Err(error_response(e.status(), e.body_text())),
        };
        if field.name() != Some("file") {
            continue;
        }
        // A `file` field without a filename is a plain form value, not an upload.
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if filename.is_empty() {
            return Err(error_response(StatusCode::BAD_REQUEST, NO_SELECTED_FILE));
        }
        return match field.bytes().await {
            Ok(bytes) => Ok((filename, bytes)),
            Err(e) => Err(error_response(e.status(), e.body_text())),
        };
    }
}

async fn run_prediction(state: &AppState, bytes: Bytes) -> Result<Prediction, Response> {
    let resources = state.resources.clone();
    tokio::task::spawn_blocking(move || predict_emotion(resources.as_deref(), &bytes))
        .await
        .map_err(join_failure)
}

fn join_failure(e: tokio::task::JoinError) -> Response {
    error!("Inference task failed: {}", e);
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Failed to process image: {}", e),
    )
}

pub async fn index() -> Html<String> {
    Html(form::render(None))
}

pub async fn predict_form(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let (filename, bytes) = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(resp) => return resp,
    };
    debug!("Form upload {} ({} bytes)", filename, bytes.len());
    match run_prediction(&state, bytes).await {
        Ok(prediction) => {
            let result = prediction.into_result();
            Html(form::render(Some(&result))).into_response()
        }
        Err(resp) => resp,
    }
}

pub async fn api_emotion(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let (filename, bytes) = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(resp) => {
            warn!("Rejected /api/emotion upload");
            return resp;
        }
    };
    info!("Received file {} ({} bytes)", filename, bytes.len());
    match run_prediction(&state, bytes).await {
        Ok(prediction) => {
            let result: PredictionResult = prediction.into_result();
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(resp) => resp,
    }
}

/// Strip a `data:image/...;base64,` prefix if present and drop the line
/// breaks of MIME-wrapped payloads.
fn base64_payload(image: &str) -> String {
    let payload = match image.split_once(',') {
        Some((_, payload)) => payload,
        None => image,
    };
    payload.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}

pub async fn detect_emotion(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DetectEmotionRequest>, JsonRejection>,
) -> Response {
    let image = match payload {
        Ok(Json(DetectEmotionRequest { image: Some(image) })) => image,
        Ok(_) => return error_response(StatusCode::BAD_REQUEST, NO_IMAGE_DATA),
        Err(e) => {
            debug!("Rejected detect-emotion body: {}", e.body_text());
            return error_response(StatusCode::BAD_REQUEST, NO_IMAGE_DATA);
        }
    };
    let bytes = match general_purpose::STANDARD.decode(base64_payload(&image)) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid base64 image data: {}", e)),
    };

    match run_prediction(&state, bytes).await {
        Ok(prediction) => match prediction.error_message() {
            Some(msg) => error_response(StatusCode::BAD_REQUEST, msg),
            None => (
                StatusCode::OK,
                Json(DetectEmotionResponse {
                    emotion: prediction.label().to_string(),
                    confidence: prediction.confidence(),
                }),
            )
                .into_response(),
        },
        Err(resp) => resp,
    }
}

/// Bare OPTIONS without CORS headers still answers 200.
pub async fn options_ok() -> StatusCode {
    StatusCode::OK
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "resources_loaded": state.is_loaded(),
        "sequence_length": state.resources.as_ref().map(|r| r.sequence_length()),
        "classes": state.resources.as_ref().map(|r| r.classes().to_vec()),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    });
    (StatusCode::OK, Json(body))
}
