//! Free text and photos, interpreted by the chat's Mode.
//!
//! While a chat is collecting ingredients, text goes through the Advisor's
//! text parser and photos through its vision extractor; both end in the same
//! fridge upsert and the same continue-or-finish prompt. While idle, a bare
//! single word is taken as one ingredient and everything else is ignored.

use tracing::{debug, info, warn};

use super::{
    advisor_permit, clear_mode, current_mode, photo_input_buttons, replace, reply, reply_with_buttons,
    text_input_buttons,
};
use crate::error::ErrorCode;
use crate::event::ChatId;
use crate::handlers::commands::SUGGEST_USAGE;
use crate::services::chat_state::Mode;
use crate::services::fridge;
use crate::state::AppState;

/// Single words of this many characters or more are not treated as
/// ingredients.
const SINGLE_WORD_LIMIT: usize = 30;

const PHOTO_HINT: &str =
    "I see you sent a photo! If you want me to pick out the ingredients, use the /add_photo command.";
const PHOTO_FAILED: &str = "Sorry, I couldn't process your photo. Please try again.";

pub async fn handle_text(state: &AppState, chat_id: ChatId, text: &str) {
    let mode = current_mode(state, chat_id).await;
    match mode {
        Mode::AwaitingIngredientsText | Mode::AwaitingPhotos => ingest_text(state, chat_id, text, mode).await,
        Mode::AwaitingDishName => {
            clear_mode(state, chat_id).await;
            reply(state, chat_id, SUGGEST_USAGE).await;
        }
        Mode::Idle => {
            let word = text.trim();
            if is_single_word(word) {
                add_single(state, chat_id, word).await;
            } else {
                debug!(%chat_id, "idle free text ignored");
            }
        }
    }
}

pub async fn handle_photo(state: &AppState, chat_id: ChatId, file_id: &str) {
    let mode = current_mode(state, chat_id).await;
    if mode.accepts_ingredients() {
        ingest_photo(state, chat_id, file_id, mode).await;
    } else {
        reply(state, chat_id, PHOTO_HINT).await;
    }
}

/// No whitespace and shorter than [`SINGLE_WORD_LIMIT`] characters.
#[must_use]
pub fn is_single_word(text: &str) -> bool {
    !text.is_empty() && !text.contains(char::is_whitespace) && text.chars().count() < SINGLE_WORD_LIMIT
}

async fn add_single(state: &AppState, chat_id: ChatId, name: &str) {
    match state.fridge.upsert(chat_id, name, "").await {
        Ok(()) => {
            info!(%chat_id, ingredient = name, "single ingredient added");
            reply(state, chat_id, &format!("Added {name} to your fridge!")).await;
        }
        Err(e) => {
            warn!(%chat_id, ingredient = name, error = %e, code = e.error_code(), "single ingredient upsert failed");
            reply(state, chat_id, &format!("Sorry, I couldn't add {name} to your fridge.")).await;
        }
    }
}

// =============================================================================
// INGESTION
// =============================================================================

pub(crate) async fn ingest_text(state: &AppState, chat_id: ChatId, text: &str, mode: Mode) {
    if !advisor_permit(state, chat_id).await {
        return;
    }
    let names = match state.advisor.parse_ingredients(text).await {
        Ok(names) => names,
        Err(e) => {
            warn!(%chat_id, error = %e, code = e.error_code(), "parse_ingredients failed");
            reply(state, chat_id, "Sorry, I couldn't understand the ingredients. Please try again with a clearer list.")
                .await;
            return;
        }
    };
    if names.is_empty() {
        info!(%chat_id, "no ingredients found in text");
        reply(state, chat_id, "I couldn't find any ingredients in your message. Please try again with a list of ingredients.")
            .await;
        return;
    }

    let Some(summary) = store_names(state, chat_id, &names).await else {
        reply(state, chat_id, "Sorry, I couldn't save those ingredients. Please try again.").await;
        return;
    };
    reply(state, chat_id, &format!("Added {summary}")).await;
    continue_prompt(state, chat_id, mode).await;
}

pub(crate) async fn ingest_photo(state: &AppState, chat_id: ChatId, file_id: &str, mode: Mode) {
    if !advisor_permit(state, chat_id).await {
        return;
    }
    let placeholder = reply(state, chat_id, "Processing your photo... This might take a moment.").await;

    let url = match state.transport.resolve_file_url(file_id).await {
        Ok(url) => url,
        Err(e) => {
            warn!(%chat_id, error = %e, code = e.error_code(), "resolve_file_url failed");
            replace(state, chat_id, placeholder, PHOTO_FAILED).await;
            return;
        }
    };
    let names = match state.advisor.extract_ingredients(&url).await {
        Ok(names) => names,
        Err(e) => {
            warn!(%chat_id, error = %e, code = e.error_code(), "extract_ingredients failed");
            replace(state, chat_id, placeholder, PHOTO_FAILED).await;
            return;
        }
    };
    if names.is_empty() {
        info!(%chat_id, "no ingredients found in photo");
        let text = "I couldn't identify any ingredients in your photo. Please try again with a clearer photo.";
        replace(state, chat_id, placeholder, text).await;
        return;
    }

    let Some(summary) = store_names(state, chat_id, &names).await else {
        replace(state, chat_id, placeholder, "Sorry, I couldn't save the ingredients from your photo. Please try again.")
            .await;
        return;
    };
    replace(state, chat_id, placeholder, &format!("From your photo I added {summary}")).await;
    continue_prompt(state, chat_id, mode).await;
}

/// Upsert every name; `None` when nothing was stored, otherwise a
/// "N ingredient(s) to your fridge: ..." summary naming only what was
/// stored.
async fn store_names(state: &AppState, chat_id: ChatId, names: &[String]) -> Option<String> {
    let added = fridge::add_all(state.fridge.as_ref(), chat_id, names).await;
    if added.stored.is_empty() {
        return None;
    }
    let mut summary = format!("{} ingredient(s) to your fridge: {}", added.stored.len(), added.stored.join(", "));
    if !added.failed.is_empty() {
        summary.push_str(&format!(". I couldn't save: {}", added.failed.join(", ")));
    }
    Some(summary)
}

async fn continue_prompt(state: &AppState, chat_id: ChatId, mode: Mode) {
    if mode == Mode::AwaitingPhotos {
        let text = "Send more photos of your fridge or pantry and I'll keep adding. Press Done when you're finished.";
        reply_with_buttons(state, chat_id, text, &photo_input_buttons()).await;
    } else {
        reply_with_buttons(state, chat_id, "Would you like to add more ingredients or are you done?", &text_input_buttons())
            .await;
    }
}
