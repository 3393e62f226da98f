//! Contact messages, update subscribers and newsletter sign-ups.
//!
//! These records carry no binary, so they talk to the content store
//! directly under the pipeline's read and write timeouts.

use crate::{
    auth::AdminToken,
    errors::AppError,
    models::{
        message::{Message, NewMessage},
        normalize,
        subscriber::{EmailRequest, Subscriber},
    },
    services::{
        content_store::{Document, Fields, StoreError},
        retry::{OpError, with_timeout},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{future::Future, time::Duration};
use validator::Validate;

const MESSAGES: &str = "messages";
const SUBSCRIBERS: &str = "subscribers";
const NEWSLETTER: &str = "newsletter";

/// `POST /messages`
pub async fn create_message(
    State(state): State<AppState>,
    body: Result<Json<NewMessage>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let msg = parse(body)?.trimmed();
    msg.validate()?;

    let mut fields = to_fields(&msg)?;
    fields.insert("createdAt".into(), json!(normalize::now()));
    let id = store_call(
        write_limit(&state),
        state.content.insert(MESSAGES, fields.clone()),
    )
    .await?;

    tracing::info!(id = %id, "contact message stored");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": present::<Message>(Document::new(id, fields)) })),
    ))
}

/// `GET /messages`
pub async fn list_messages(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    list_as::<Message>(&state, MESSAGES).await
}

/// `POST /subscribers`
pub async fn subscribe(
    State(state): State<AppState>,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let email = parse_email(body)?;
    ensure_email_free(&state, SUBSCRIBERS, &email, None).await?;

    let now = normalize::now();
    let mut fields = Fields::new();
    fields.insert("email".into(), json!(email));
    fields.insert("createdAt".into(), json!(now));
    fields.insert("updatedAt".into(), json!(now));
    let id = store_call(
        write_limit(&state),
        state.content.insert(SUBSCRIBERS, fields.clone()),
    )
    .await?;

    tracing::info!(id = %id, "subscriber added");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": present::<Subscriber>(Document::new(id, fields)) })),
    ))
}

/// `GET /subscribers`
pub async fn list_subscribers(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    list_as::<Subscriber>(&state, SUBSCRIBERS).await
}

/// `PUT /subscribers/{id}`
pub async fn update_subscriber(
    _admin: AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let email = parse_email(body)?;
    let existing = store_call(read_limit(&state), state.content.get(SUBSCRIBERS, &id)).await?;
    ensure_email_free(&state, SUBSCRIBERS, &email, Some(&id)).await?;

    let mut patch = Fields::new();
    patch.insert("email".into(), json!(email));
    patch.insert("updatedAt".into(), json!(normalize::now()));
    store_call(
        write_limit(&state),
        state.content.update(SUBSCRIBERS, &id, patch.clone()),
    )
    .await?;

    let mut fields = existing.fields;
    fields.extend(patch);
    Ok(Json(
        json!({ "success": true, "data": present::<Subscriber>(Document::new(id, fields)) }),
    ))
}

/// `DELETE /subscribers/{id}`
pub async fn delete_subscriber(
    _admin: AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    store_call(write_limit(&state), state.content.delete(SUBSCRIBERS, &id)).await?;
    tracing::info!(id = %id, "subscriber removed");
    Ok(Json(json!({ "success": true })))
}

/// `POST /newsletter`
pub async fn join_newsletter(
    State(state): State<AppState>,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let email = parse_email(body)?;
    ensure_email_free(&state, NEWSLETTER, &email, None).await?;

    let mut fields = Fields::new();
    fields.insert("email".into(), json!(email));
    fields.insert("subscribedAt".into(), json!(normalize::now()));
    let id = store_call(
        write_limit(&state),
        state.content.insert(NEWSLETTER, fields.clone()),
    )
    .await?;

    tracing::info!(id = %id, "newsletter sign-up");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": present::<Subscriber>(Document::new(id, fields)) })),
    ))
}

fn parse<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|err| AppError::validation(err.body_text()))
}

fn parse_email(body: Result<Json<EmailRequest>, JsonRejection>) -> Result<String, AppError> {
    let mut req = parse(body)?;
    req.email = req.email.trim().to_string();
    req.validate()?;
    Ok(req.email)
}

async fn ensure_email_free(
    state: &AppState,
    collection: &str,
    email: &str,
    exclude: Option<&str>,
) -> Result<(), AppError> {
    let matches = store_call(
        read_limit(state),
        state.content.query_by_field(collection, "email", &json!(email)),
    )
    .await?;
    if matches.iter().any(|doc| Some(doc.id.as_str()) != exclude) {
        return Err(AppError::conflict("Email already subscribed"));
    }
    Ok(())
}

async fn list_as<T: Serialize + DeserializeOwned>(
    state: &AppState,
    collection: &str,
) -> Result<Json<Value>, AppError> {
    let docs = store_call(read_limit(state), state.content.list(collection)).await?;
    let data: Vec<Value> = docs.into_iter().map(present::<T>).collect();
    Ok(Json(json!({ "success": true, "data": data })))
}

/// Normalize a stored record through its model, keeping the raw document
/// when it does not fit.
fn present<T: Serialize + DeserializeOwned>(doc: Document) -> Value {
    let raw = doc.into_json();
    serde_json::from_value::<T>(raw.clone())
        .and_then(serde_json::to_value)
        .unwrap_or(raw)
}

fn to_fields<T: Serialize>(value: &T) -> Result<Fields, AppError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(AppError::internal("Could not encode record")),
        Err(err) => {
            tracing::error!(error = %err, "record encoding failed");
            Err(AppError::internal("Could not encode record"))
        }
    }
}

fn read_limit(state: &AppState) -> Duration {
    state.pipeline.policy().read_timeout
}

fn write_limit(state: &AppState) -> Duration {
    state.pipeline.policy().write_timeout
}

async fn store_call<T>(
    limit: Duration,
    op: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, AppError> {
    with_timeout(limit, op).await.map_err(|err| match err {
        OpError::TimedOut(after) => {
            tracing::error!(?after, "content store timed out");
            AppError::timeout("The storage service took too long to respond, try again later")
        }
        OpError::Failed(err) => AppError::from(err),
    })
}
