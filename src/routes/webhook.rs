//! Telegram webhook endpoint.
//!
//! Telegram echoes the secret registered with `setWebhook` in the
//! `X-Telegram-Bot-Api-Secret-Token` header. Requests without it are
//! rejected before the body is read. Accepted updates are converted to
//! events and queued on the dispatcher; the response does not wait for the
//! event to be handled.
//!
//! A body that is not a valid update is logged and acknowledged with 200.
//! Telegram redelivers anything else, and a malformed update would
//! otherwise be retried forever.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use tracing::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::telegram::types::{Update, update_to_event};

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
pub struct WebhookRoute {
    pub dispatcher: Dispatcher,
    pub secret: Arc<str>,
    pub bot_username: Option<Arc<str>>,
}

impl WebhookRoute {
    #[must_use]
    pub fn new(dispatcher: Dispatcher, secret: &str, bot_username: Option<Arc<str>>) -> Self {
        Self { dispatcher, secret: Arc::from(secret), bot_username }
    }
}

pub(super) async fn receive(State(route): State<WebhookRoute>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if presented != Some(&*route.secret) {
        warn!(has_header = presented.is_some(), "webhook: secret mismatch");
        return StatusCode::UNAUTHORIZED;
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "webhook: unparseable update");
            return StatusCode::OK;
        }
    };
    let update_id = update.update_id;
    match update_to_event(update, route.bot_username.as_deref()) {
        Some(event) => route.dispatcher.dispatch(event).await,
        None => debug!(update_id, "webhook: ignoring update"),
    }
    StatusCode::OK
}

#[cfg(test)]
#[path = "webhook_test.rs"]
mod tests;
