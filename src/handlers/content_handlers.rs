//! HTTP handlers shared by every content kind.
//!
//! One generic set of handlers is mounted per kind; the pipeline carries
//! the kind-specific rules. Create and update take a multipart form, delete
//! takes a JSON body `{"id": ...}`.

use crate::{
    auth::AdminToken,
    errors::AppError,
    models::upload::{Submission, Upload},
    services::kinds::ContentKind,
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub id: String,
}

/// `GET /content/{kind}`
pub async fn list<K: ContentKind>(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let docs = state.pipeline.list::<K>().await?;
    let data: Vec<Value> = docs.into_iter().map(K::present).collect();
    Ok(Json(json!({ "success": true, "data": data })))
}

/// `POST /content/{kind}`
pub async fn create<K: ContentKind>(
    _admin: AdminToken,
    State(state): State<AppState>,
    form: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let submission = read_submission::<K>(form).await?;
    let doc = state.pipeline.create::<K>(submission).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": K::present(doc) })),
    ))
}

/// `PUT /content/{kind}`; the record id travels as the `id` form field.
pub async fn update<K: ContentKind>(
    _admin: AdminToken,
    State(state): State<AppState>,
    form: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let mut submission = read_submission::<K>(form).await?;
    let id = submission.fields.remove("id").unwrap_or_default();
    let doc = state.pipeline.update::<K>(&id, submission).await?;
    Ok(Json(json!({ "success": true, "data": K::present(doc) })))
}

/// `DELETE /content/{kind}`
pub async fn delete<K: ContentKind>(
    _admin: AdminToken,
    State(state): State<AppState>,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = body.map_err(|err| AppError::validation(err.body_text()))?;
    state.pipeline.delete::<K>(&req.id).await?;
    Ok(Json(json!({ "success": true })))
}

/// Collect text fields and the kind's file part from a multipart form.
///
/// A file part sent empty and without a filename (what browsers submit for
/// an untouched file input) counts as no file.
async fn read_submission<K: ContentKind>(
    form: Result<Multipart, MultipartRejection>,
) -> Result<Submission, AppError> {
    let mut multipart = form.map_err(|err| AppError::validation(err.body_text()))?;
    let mut submission = Submission::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        let is_file = field.file_name().is_some() || field.content_type().is_some();
        if name == K::FILE_FIELD && is_file {
            let file_name = field
                .file_name()
                .map(str::to_string)
                .filter(|n| !n.is_empty());
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(bad_form)?;
            if bytes.is_empty() && file_name.is_none() {
                continue;
            }
            submission.file = Some(Upload::new(file_name, content_type, bytes));
        } else {
            let value = field.text().await.map_err(bad_form)?;
            submission.fields.insert(name, value);
        }
    }

    Ok(submission)
}

fn bad_form(err: MultipartError) -> AppError {
    tracing::debug!(error = %err, "unreadable multipart form");
    AppError::validation(format!("Invalid form data: {}", err.body_text()))
}
