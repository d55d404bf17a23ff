//! Callback endpoint handlers.
//!
//! Business failures never change the HTTP status: the platform expects a
//! 200 whose body is the echo string, `ok`, or `failed`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::crypto::MsgCrypt;
use crate::dispatch::Dispatcher;
use crate::message::{parse_message, MessageKind};

/// Body returned after a message was accepted or ignored.
pub const OK_BODY: &str = "ok";

/// Body returned for every verification, decryption or parse failure.
pub const FAILED_BODY: &str = "failed";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub crypt: Arc<MsgCrypt>,
    pub dispatcher: Dispatcher,
    pub channel_id: i32,
}

impl AppState {
    pub fn new(crypt: MsgCrypt, dispatcher: Dispatcher, channel_id: i32) -> Self {
        Self {
            crypt: Arc::new(crypt),
            dispatcher,
            channel_id,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// WeCom Callback
// =============================================================================

/// Raw query pairs in order, duplicates included.
type QueryPairs = Result<Query<Vec<(String, String)>>, QueryRejection>;

/// Query parameters WeCom appends to every callback.
///
/// Absent parameters are empty strings and simply fail verification.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CallbackQuery {
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
    pub echostr: String,
}

impl CallbackQuery {
    /// Build from raw pairs. A repeated key keeps its first value.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = CallbackQuery::default();
        let mut seen = [false; 4];

        for (key, value) in pairs {
            let (slot, field) = match key.as_str() {
                "msg_signature" => (0, &mut query.msg_signature),
                "timestamp" => (1, &mut query.timestamp),
                "nonce" => (2, &mut query.nonce),
                "echostr" => (3, &mut query.echostr),
                _ => continue,
            };
            if !seen[slot] {
                seen[slot] = true;
                *field = value;
            }
        }

        query
    }
}

/// Unwrap the query pairs, logging a rejection instead of surfacing it.
fn callback_query(query: QueryPairs) -> Option<CallbackQuery> {
    match query {
        Ok(Query(pairs)) => Some(CallbackQuery::from_pairs(pairs)),
        Err(e) => {
            error!(error = %e, "callback_query_invalid");
            None
        }
    }
}

/// URL verification (GET).
///
/// Returns the decrypted `echostr` verbatim on success.
pub async fn verify_url(State(state): State<AppState>, query: QueryPairs) -> String {
    let Some(query) = callback_query(query) else {
        return FAILED_BODY.to_string();
    };

    info!(
        timestamp = %query.timestamp,
        echostr_length = query.echostr.len(),
        "callback_verify_received"
    );

    match state.crypt.verify_url(
        &query.msg_signature,
        &query.timestamp,
        &query.nonce,
        &query.echostr,
    ) {
        Ok(echo) => {
            info!("callback_verify_succeeded");
            echo
        }
        Err(e) => {
            error!(ret = e.code(), error = %e, "callback_verify_failed");
            FAILED_BODY.to_string()
        }
    }
}

/// Message callback (POST).
///
/// Decrypts and parses the body, then hands text and image messages to the
/// dispatcher without waiting for them to be handled.
pub async fn receive_message(
    State(state): State<AppState>,
    query: QueryPairs,
    body: Bytes,
) -> &'static str {
    let Some(query) = callback_query(query) else {
        return FAILED_BODY;
    };

    info!(
        timestamp = %query.timestamp,
        body_length = body.len(),
        "callback_message_received"
    );

    let body = match std::str::from_utf8(&body) {
        Ok(body) => body,
        Err(_) => {
            error!("callback_body_not_utf8");
            return FAILED_BODY;
        }
    };

    let plaintext = match state.crypt.decrypt_message(
        body,
        &query.msg_signature,
        &query.timestamp,
        &query.nonce,
    ) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            error!(ret = e.code(), error = %e, "callback_decrypt_failed");
            return FAILED_BODY;
        }
    };

    let message = match parse_message(&plaintext) {
        Ok(message) => message,
        Err(e) => {
            error!(
                error = %e,
                plaintext_length = plaintext.len(),
                "callback_parse_failed"
            );
            return FAILED_BODY;
        }
    };

    match message.kind {
        MessageKind::Text => info!(
            channel_id = state.channel_id,
            sender_id = %message.sender_id,
            content_length = message.text_content.as_ref().map(|c| c.len()).unwrap_or(0),
            "callback_text_message"
        ),
        MessageKind::Image => info!(
            channel_id = state.channel_id,
            sender_id = %message.sender_id,
            "callback_image_message"
        ),
        MessageKind::Unknown => {}
    }

    if let Some(job) = message.into_dispatch_job(state.channel_id) {
        if let Err(e) = state.dispatcher.dispatch(job) {
            warn!(error = %e, "callback_dispatch_skipped");
        }
    }

    OK_BODY
}
