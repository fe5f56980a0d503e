//! /files, /download, /upload handlers: the File Catalog and Transfer Receiver over HTTP.

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::io::ReaderStream;

use linkbeam_services::{StoredFile, UploadReceipt};

use super::{catalog_error, receive_error, ApiError, ApiState};

// ── /files ────────────────────────────────────────────────────────────────────

pub async fn handle_files(State(state): State<ApiState>) -> Result<Json<Vec<StoredFile>>, ApiError> {
    let mut files = state.catalog.list().await.map_err(catalog_error)?;
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(Json(files))
}

// ── /download/{filename} ──────────────────────────────────────────────────────

pub async fn handle_download(
    State(state): State<ApiState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let (file, stored) = state.catalog.fetch(&filename).await.map_err(catalog_error)?;
    let mime = mime_guess::from_path(&stored.filename).first_or_octet_stream();

    tracing::debug!(filename = %stored.filename, bytes = stored.size, "serving download");

    let headers = [
        (CONTENT_TYPE, mime.to_string()),
        (CONTENT_LENGTH, stored.size.to_string()),
        (
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", stored.filename),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

// ── /upload ───────────────────────────────────────────────────────────────────

/// Stream the first file field of a multipart body into the catalog.
///
/// The body is written chunk by chunk into a staging file. Any error,
/// including the client going away, drops the `IncomingFile`, which
/// removes the partial data.
pub async fn handle_upload(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>, ApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let is_file = field.file_name().is_some() || field.name() == Some("file");
        if !is_file {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        let mut incoming = state.receiver.begin(&original).await.map_err(receive_error)?;

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
        {
            incoming.write(&chunk).await.map_err(receive_error)?;
        }

        let stored = incoming.commit().await.map_err(receive_error)?;
        return Ok(Json(stored.into()));
    }

    Err((StatusCode::BAD_REQUEST, "no file field".to_string()))
}
