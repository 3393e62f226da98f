//! Serves blobs written by the disk store.

use crate::{errors::AppError, services::blob_store::BlobError, state::AppState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use tokio_util::io::ReaderStream;

/// `GET /blobs/{folder}/{file}`: stream a stored blob.
pub async fn get_blob(
    State(state): State<AppState>,
    Path((folder, file)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let Some(disk) = state.local_blobs.as_ref() else {
        return Err(AppError::not_found("Blob not found"));
    };

    let (reader, len, content_type) = disk.open(&folder, &file).await.map_err(|err| match err {
        BlobError::NotFound(_) | BlobError::InvalidId(_) => AppError::not_found("Blob not found"),
        other => {
            tracing::error!(error = %other, %folder, %file, "blob read failed");
            AppError::internal("Could not read blob")
        }
    })?;

    let body = Body::from_stream(ReaderStream::new(reader));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_blob_headers(response.headers_mut(), &content_type, len);
    Ok(response)
}

fn set_blob_headers(headers: &mut HeaderMap, content_type: &str, len: u64) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    // Stored names are random and never reused.
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
}
