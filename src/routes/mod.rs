//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The bot's HTTP surface is small: a health probe for the orchestrator and,
//! in webhook mode, the endpoint Telegram posts updates to. In long-poll
//! mode the webhook route is not mounted at all.

pub mod webhook;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

pub use webhook::WebhookRoute;

pub const WEBHOOK_PATH: &str = "/telegram/webhook";

/// Build the router. `webhook` mounts the Telegram update endpoint.
pub fn app(webhook: Option<WebhookRoute>) -> Router {
    let mut router = Router::new().route("/healthz", get(healthz));
    if let Some(route) = webhook {
        router = router.merge(Router::new().route(WEBHOOK_PATH, post(webhook::receive)).with_state(route));
    }
    router.layer(TraceLayer::new_for_http())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
