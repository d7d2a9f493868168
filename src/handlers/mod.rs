//! Event handlers — the per-chat workflow.
//!
//! SYSTEM CONTEXT
//! ==============
//! The dispatcher hands every [`ChatEvent`] for one chat to
//! [`handle_event`], one at a time. Handlers read and write the stores, call
//! the Advisor, and talk back through the [`Transport`](crate::transport::Transport).
//!
//! ERROR HANDLING
//! ==============
//! Nothing here returns an error to the dispatcher. Advisor and store
//! failures become apologetic chat messages; transport failures on cosmetic
//! actions (edits, acks, follow-up hints) are logged and dropped.

pub mod callbacks;
pub mod commands;
pub mod messages;

use tracing::{debug, info, warn};

use crate::error::ErrorCode;
use crate::event::{ChatEvent, ChatId, Sender};
use crate::services::chat_state::Mode;
use crate::state::AppState;
use crate::transport::{Button, MessageId};

// =============================================================================
// BUTTON TAGS
// =============================================================================

pub const DONE_ADDING: &str = "done_adding";
pub const ADD_MORE: &str = "add_more";
pub const DONE_ADDING_PHOTOS: &str = "done_adding_photos";
pub const CANCEL_ADDING_PHOTOS: &str = "cancel_adding_photos";
pub const SHOW_FRIDGE: &str = "show_fridge";

pub(crate) fn text_input_buttons() -> [Button; 2] {
    [Button::new("Done adding ingredients", DONE_ADDING), Button::new("Add more", ADD_MORE)]
}

pub(crate) fn photo_input_buttons() -> [Button; 1] {
    [Button::new("Done adding photos", DONE_ADDING_PHOTOS)]
}

pub(crate) const RATE_LIMITED: &str =
    "I'm getting a lot of requests right now. Please try again in a minute.";
pub(crate) const FRIDGE_READ_FAILED: &str =
    "Sorry, I couldn't retrieve your fridge contents right now. Please try again later.";

// =============================================================================
// ENTRY POINT
// =============================================================================

/// Handle one event to completion.
pub async fn handle_event(state: &AppState, event: ChatEvent) {
    match event {
        ChatEvent::Command { chat_id, from, name, args, photo } => {
            info!(%chat_id, command = %name, user = %from.display_name(), "handling command");
            commands::handle(state, chat_id, &from, &name, &args, photo.as_deref()).await;
        }
        ChatEvent::Text { chat_id, text, .. } => messages::handle_text(state, chat_id, &text).await,
        ChatEvent::Photo { chat_id, file_id, .. } => messages::handle_photo(state, chat_id, &file_id).await,
        ChatEvent::Callback { chat_id, message_id, callback_id, from, data } => {
            info!(%chat_id, tag = %data, user = %from.display_name(), "handling callback");
            callbacks::handle(state, chat_id, message_id, &callback_id, &data).await;
        }
        ChatEvent::DetachedCallback { callback_id, data } => callbacks::acknowledge_detached(state, &callback_id, &data).await,
        ChatEvent::PollAnswer { poll_id, voter, option_ids } => record_poll_answer(state, &poll_id, &voter, &option_ids).await,
    }
}

async fn record_poll_answer(state: &AppState, poll_id: &str, voter: &Sender, option_ids: &[u32]) {
    match state.votes.record_answer(poll_id, voter.id, option_ids).await {
        Ok(true) => debug!(poll_id, voter = voter.id, ?option_ids, "poll answer recorded"),
        Ok(false) => debug!(poll_id, "poll answer for unknown poll ignored"),
        Err(e) => warn!(poll_id, error = %e, code = e.error_code(), "poll answer not recorded"),
    }
}

// =============================================================================
// SHARED HELPERS
// =============================================================================

/// Current Mode; a failed read is treated as `Idle`.
pub(crate) async fn current_mode(state: &AppState, chat_id: ChatId) -> Mode {
    state.modes.get(chat_id).await.unwrap_or_else(|e| {
        warn!(%chat_id, error = %e, code = e.error_code(), "mode read failed; assuming idle");
        Mode::Idle
    })
}

/// Move the chat to `mode`, logging failure.
pub(crate) async fn set_mode(state: &AppState, chat_id: ChatId, mode: Mode) -> bool {
    match state.modes.set(chat_id, mode).await {
        Ok(()) => {
            debug!(%chat_id, mode = mode.as_str(), "mode changed");
            true
        }
        Err(e) => {
            warn!(%chat_id, mode = mode.as_str(), error = %e, code = e.error_code(), "mode write failed");
            false
        }
    }
}

pub(crate) async fn clear_mode(state: &AppState, chat_id: ChatId) {
    if let Err(e) = state.modes.clear(chat_id).await {
        warn!(%chat_id, error = %e, code = e.error_code(), "mode clear failed");
    }
}

/// Send text; failures are logged.
pub(crate) async fn reply(state: &AppState, chat_id: ChatId, text: &str) -> Option<MessageId> {
    match state.transport.send_text(chat_id, text).await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(%chat_id, error = %e, code = e.error_code(), "send_text failed");
            None
        }
    }
}

pub(crate) async fn reply_with_buttons(
    state: &AppState,
    chat_id: ChatId,
    text: &str,
    buttons: &[Button],
) -> Option<MessageId> {
    match state.transport.send_with_buttons(chat_id, text, buttons).await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(%chat_id, error = %e, code = e.error_code(), "send_with_buttons failed");
            None
        }
    }
}

/// Replace a placeholder message's text. When there is no placeholder or
/// the edit fails, the text is sent as a new message instead.
pub(crate) async fn replace(state: &AppState, chat_id: ChatId, placeholder: Option<MessageId>, text: &str) {
    if let Some(message_id) = placeholder {
        match state.transport.edit_text(chat_id, message_id, text).await {
            Ok(()) => return,
            Err(e) => warn!(%chat_id, message_id, error = %e, code = e.error_code(), "edit_text failed; sending instead"),
        }
    }
    reply(state, chat_id, text).await;
}

/// Reserve an Advisor call, telling the chat when it is refused.
pub(crate) async fn advisor_permit(state: &AppState, chat_id: ChatId) -> bool {
    match state.advisor_permit(chat_id) {
        Ok(()) => true,
        Err(e) => {
            info!(%chat_id, error = %e, code = e.error_code(), "advisor call rate limited");
            reply(state, chat_id, RATE_LIMITED).await;
            false
        }
    }
}

#[cfg(test)]
#[path = "handlers_test.rs"]
mod tests;
