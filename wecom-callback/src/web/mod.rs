//! Web server module for the WeCom callback endpoint.
//!
//! This module provides a thin web server that:
//! - Answers the platform's URL verification challenge
//! - Verifies, decrypts and parses message callbacks
//! - Hands messages to the dispatcher and returns immediately
//!
//! Downstream handling happens on the dispatcher's workers.

pub mod handlers;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, receive_message, verify_url, AppState, CallbackQuery, HealthResponse, FAILED_BODY,
    OK_BODY,
};

/// Build the router: the callback route answers GET and POST only, so any
/// other method gets a 405 from the method router.
pub fn router(state: AppState, callback_path: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(callback_path, get(verify_url).post(receive_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
