//! Defines routes for the portfolio content service.
//!
//! ## Structure
//! - **Content endpoints**, one set per kind (`projects`, `experiences`,
//!   `media`, `vitae`)
//!   - `GET    /content/{kind}` -> list records
//!   - `POST   /content/{kind}` -> create from a multipart form (admin)
//!   - `PUT    /content/{kind}` -> update from a multipart form carrying `id` (admin)
//!   - `DELETE /content/{kind}` -> delete by JSON `{"id": ...}` (admin)
//!
//! - **Blob endpoint**
//!   - `GET    /blobs/{folder}/{file}` -> stream a blob kept on local disk
//!
//! - **Audience endpoints**
//!   - `POST /messages`, `GET /messages` (admin)
//!   - `POST /subscribers`, `GET /subscribers` (admin)
//!   - `PUT|DELETE /subscribers/{id}` (admin)
//!   - `POST /newsletter`

use crate::{
    handlers::{
        blob_handlers::get_blob,
        content_handlers::{create, delete, list, update},
        health_handlers::{healthz, readyz},
        message_handlers::{
            create_message, delete_subscriber, join_newsletter, list_messages, list_subscribers,
            subscribe, update_subscriber,
        },
    },
    services::kinds::{ContentKind, ExperienceKind, MediaKind, ProjectKind, VitaeKind},
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Largest request body accepted. Videos are capped lower by validation so
/// oversized uploads still get a classified error.
pub const MAX_BODY_BYTES: usize = 128 * 1024 * 1024;

/// Build the router for every endpoint. State is supplied by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .merge(content_routes::<ProjectKind>())
        .merge(content_routes::<ExperienceKind>())
        .merge(content_routes::<MediaKind>())
        .merge(content_routes::<VitaeKind>())
        .route("/blobs/{folder}/{file}", get(get_blob))
        .route("/messages", post(create_message).get(list_messages))
        .route("/subscribers", post(subscribe).get(list_subscribers))
        .route(
            "/subscribers/{id}",
            put(update_subscriber).delete(delete_subscriber),
        )
        .route("/newsletter", post(join_newsletter))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

fn content_routes<K: ContentKind>() -> Router<AppState> {
    Router::new().route(
        &format!("/content/{}", K::COLLECTION),
        get(list::<K>)
            .post(create::<K>)
            .put(update::<K>)
            .delete(delete::<K>),
    )
}
