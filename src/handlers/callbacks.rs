//! Inline button presses.
//!
//! DESIGN
//! ======
//! A press carries an opaque tag. [`CallbackRouter`] resolves it with an
//! exact lookup first, then the prefix list in registration order. Every
//! press is acknowledged before anything else happens, including presses
//! that match nothing, so the client stops showing its spinner.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::{
    ADD_MORE, CANCEL_ADDING_PHOTOS, DONE_ADDING, DONE_ADDING_PHOTOS, SHOW_FRIDGE, clear_mode, reply,
};
use crate::error::ErrorCode;
use crate::event::ChatId;
use crate::handlers::commands::send_fridge;
use crate::services::fridge::render_fridge;
use crate::state::AppState;
use crate::transport::MessageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    DoneAdding,
    AddMore,
    DonePhotos,
    CancelPhotos,
    ShowFridge,
}

impl CallbackAction {
    fn ack_text(self) -> &'static str {
        match self {
            Self::DoneAdding => "Thanks! Your fridge is now updated.",
            Self::AddMore => "Please send more ingredients!",
            Self::DonePhotos => "Thanks! Your fridge is now updated with ingredients from your photos.",
            Self::CancelPhotos => "Photo adding cancelled.",
            Self::ShowFridge => "Here's what's in your fridge!",
        }
    }
}

// =============================================================================
// ROUTER
// =============================================================================

#[derive(Debug, Default)]
pub struct CallbackRouter {
    exact: HashMap<String, CallbackAction>,
    prefixes: Vec<(String, CallbackAction)>,
}

impl CallbackRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn exact(mut self, tag: &str, action: CallbackAction) -> Self {
        self.exact.insert(tag.to_string(), action);
        self
    }

    /// Register a prefix. Earlier registrations win.
    #[must_use]
    pub fn prefix(mut self, prefix: &str, action: CallbackAction) -> Self {
        self.prefixes.push((prefix.to_string(), action));
        self
    }

    #[must_use]
    pub fn resolve(&self, tag: &str) -> Option<CallbackAction> {
        self.exact.get(tag).copied().or_else(|| {
            self.prefixes
                .iter()
                .find(|(prefix, _)| tag.starts_with(prefix.as_str()))
                .map(|(_, action)| *action)
        })
    }
}

/// The production button table.
#[must_use]
pub fn router() -> CallbackRouter {
    CallbackRouter::new()
        .exact(DONE_ADDING, CallbackAction::DoneAdding)
        .exact(ADD_MORE, CallbackAction::AddMore)
        .exact(DONE_ADDING_PHOTOS, CallbackAction::DonePhotos)
        .exact(CANCEL_ADDING_PHOTOS, CallbackAction::CancelPhotos)
        .exact(SHOW_FRIDGE, CallbackAction::ShowFridge)
}

// =============================================================================
// HANDLERS
// =============================================================================

pub async fn handle(state: &AppState, chat_id: ChatId, message_id: MessageId, callback_id: &str, tag: &str) {
    let action = state.callbacks.resolve(tag);
    let ack = action.map(CallbackAction::ack_text);
    if let Err(e) = state.transport.answer_callback(callback_id, ack).await {
        warn!(%chat_id, tag, error = %e, code = e.error_code(), "answer_callback failed");
    }
    let Some(action) = action else {
        debug!(%chat_id, tag, "unmatched callback acknowledged");
        return;
    };

    match action {
        CallbackAction::DoneAdding => {
            clear_mode(state, chat_id).await;
            finish(
                state,
                chat_id,
                message_id,
                "Fridge update complete! Use /fridge to see your ingredients or /dinner to get dinner suggestions.",
            )
            .await;
        }
        CallbackAction::AddMore => {
            finish(state, chat_id, message_id, "Please send more ingredients. I'll add them to your fridge.").await;
        }
        CallbackAction::DonePhotos => {
            clear_mode(state, chat_id).await;
            finish(
                state,
                chat_id,
                message_id,
                "Photo processing complete! I've added all the ingredients I found to your fridge.",
            )
            .await;
            done_photos_summary(state, chat_id).await;
        }
        CallbackAction::CancelPhotos => {
            clear_mode(state, chat_id).await;
            finish(
                state,
                chat_id,
                message_id,
                "Photo adding cancelled. You can use /fridge to see your current ingredients or /dinner to get dinner suggestions.",
            )
            .await;
        }
        CallbackAction::ShowFridge => {
            if let Err(e) = state.transport.remove_buttons(chat_id, message_id).await {
                warn!(%chat_id, message_id, error = %e, code = e.error_code(), "remove_buttons failed");
            }
            send_fridge(state, chat_id).await;
        }
    }
}

/// Acknowledge a press that arrived without its message. Nothing else can
/// be done for it.
pub async fn acknowledge_detached(state: &AppState, callback_id: &str, tag: &str) {
    if let Err(e) = state.transport.answer_callback(callback_id, None).await {
        warn!(tag, error = %e, code = e.error_code(), "answer_callback failed");
        return;
    }
    debug!(tag, "detached callback acknowledged");
}

/// Replace the prompt's text, which also strips its buttons.
async fn finish(state: &AppState, chat_id: ChatId, message_id: MessageId, text: &str) {
    if let Err(e) = state.transport.edit_text(chat_id, message_id, text).await {
        warn!(%chat_id, message_id, error = %e, code = e.error_code(), "edit_text failed");
    }
}

async fn done_photos_summary(state: &AppState, chat_id: ChatId) {
    let items = match state.fridge.list(chat_id).await {
        Ok(items) => items,
        Err(e) => {
            warn!(%chat_id, error = %e, code = e.error_code(), "fridge read failed after photos");
            return;
        }
    };
    if items.is_empty() {
        reply(state, chat_id, "Your fridge is still empty. Try adding ingredients with text or better photos.").await;
        return;
    }
    reply(state, chat_id, &render_fridge(&items)).await;
    reply(state, chat_id, "You can now use /dinner to get dinner suggestions based on your ingredients!").await;
}
