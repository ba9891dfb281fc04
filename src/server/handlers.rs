use std::sync::Arc;

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use log::{error, info, warn};

use super::errors::ApiError;
use super::models::{CompressParams, CompressResponse, HealthResponse, RootResponse};
use super::AppState;
use crate::quality::Quality;

pub(crate) async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "PDF Compressor API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

pub(crate) async fn compress(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompressParams>,
    mut multipart: Multipart,
) -> Result<Json<CompressResponse>, ApiError> {
    let too_large = || {
        ApiError::bad_request(format!(
            "File too large. Maximum size allowed is {}MB",
            state.config.max_upload_mb()
        ))
    };
    let upload_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large()
        } else {
            warn!("Malformed upload: {}", e.body_text());
            ApiError::bad_request("Invalid multipart upload")
        }
    };

    let field = loop {
        match multipart.next_field().await.map_err(upload_error)? {
            Some(field) if field.name() == Some("file") => break field,
            Some(_) => continue,
            None => return Err(ApiError::bad_request("Missing file field")),
        }
    };

    let filename = field.file_name().unwrap_or_default().to_string();
    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(ApiError::bad_request("Only PDF files are allowed"));
    }
    let quality: Quality = params
        .quality
        .parse()
        .map_err(|e: crate::InvalidQuality| ApiError::bad_request(e.to_string()))?;

    let content = field.bytes().await.map_err(upload_error)?;
    if content.len() > state.config.max_upload_bytes {
        return Err(too_large());
    }

    info!(
        "Compressing {} ({} bytes) at {} quality",
        filename,
        content.len(),
        quality
    );
    let compressor = Arc::clone(&state.compressor);
    let report =
        tokio::task::spawn_blocking(move || compressor.compress(&content, &filename, quality))
            .await
            .map_err(|e| {
                error!("Compression worker panicked: {}", e);
                ApiError::compression_failed()
            })?
            .map_err(|e| {
                error!("Compression failed: {}", e);
                ApiError::compression_failed()
            })?;

    Ok(Json(report.into()))
}

pub(crate) async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::not_found("File not found");
    let path = state
        .compressor
        .staging()
        .output_file(&filename)
        .ok_or_else(not_found)?;
    let content = tokio::fs::read(&path).await.map_err(|e| {
        warn!("Failed to read {}: {}", path.display(), e);
        not_found()
    })?;

    Response::builder()
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(content))
        .map_err(|e| {
            error!("Failed to build download response: {}", e);
            not_found()
        })
}
