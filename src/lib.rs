//! Portfolio content service: projects, experiences, media and vitae that
//! pair a JSON record with an uploaded file, plus contact messages and
//! subscriber lists.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use state::AppState;

/// The full application router with its state attached.
pub fn app(state: AppState) -> Router {
    routes::routes::routes().with_state(state)
}
