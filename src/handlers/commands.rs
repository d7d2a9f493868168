//! Slash commands.

use tracing::{debug, error, info, warn};

use super::{
    CANCEL_ADDING_PHOTOS, FRIDGE_READ_FAILED, SHOW_FRIDGE, advisor_permit, replace, reply, reply_with_buttons, set_mode,
};
use crate::error::ErrorCode;
use crate::event::{ChatId, Sender};
use crate::handlers::messages;
use crate::services::chat_state::Mode;
use crate::services::fridge::{self, render_fridge};
use crate::services::poll::PollError;
use crate::services::stats;
use crate::services::suggestions::{NewSuggestion, SuggestedDish};
use crate::state::AppState;
use crate::transport::Button;

pub const POLL_QUESTION: &str = "What should we cook tonight?";

const WELCOME: &str = "Hi! I'm your family dinner planner.\n\n\
/sync_fridge - reset the fridge and tell me what you have\n\
/add_photo - add ingredients from a photo of your fridge\n\
/fridge - show what's in the fridge\n\
/suggest <dish> - propose a dish for the next poll\n\
/dinner - start tonight's dinner poll\n\
/stats - kitchen stats\n\n\
You can also send a single word like \"Eggs\" to add it to the fridge.";

pub(crate) const SUGGEST_USAGE: &str =
    "You can suggest a dish for dinner! Use the command like this: /suggest Lasagna";

const EMPTY_FRIDGE_FOR_DINNER: &str = "Your fridge is empty! Please add some ingredients with /sync_fridge \
or /add_photo before I can suggest dinner options.";

const NO_DINNER_IDEAS: &str = "I couldn't find enough dishes for a poll. Try adding more ingredients \
with /sync_fridge or suggest your own dishes with /suggest.";

pub async fn handle(state: &AppState, chat_id: ChatId, from: &Sender, name: &str, args: &str, photo: Option<&str>) {
    match name {
        "start" | "help" => {
            reply_with_buttons(state, chat_id, WELCOME, &[Button::new("Show fridge", SHOW_FRIDGE)]).await;
        }
        "dinner" => dinner(state, chat_id).await,
        "suggest" => suggest(state, chat_id, from, args).await,
        "fridge" | "show_fridge" => send_fridge(state, chat_id).await,
        "sync_fridge" => sync_fridge(state, chat_id).await,
        "add_photo" => add_photo(state, chat_id, photo).await,
        "stats" => {
            let summary =
                stats::collect(chat_id, state.fridge.as_ref(), state.suggestions.as_ref(), state.votes.as_ref()).await;
            reply(state, chat_id, &summary.render()).await;
        }
        other => debug!(%chat_id, command = other, "unknown command ignored"),
    }
}

// =============================================================================
// DINNER
// =============================================================================

async fn dinner(state: &AppState, chat_id: ChatId) {
    let items = match state.fridge.list(chat_id).await {
        Ok(items) => items,
        Err(e) => {
            warn!(%chat_id, error = %e, code = e.error_code(), "dinner: fridge read failed");
            reply(state, chat_id, FRIDGE_READ_FAILED).await;
            return;
        }
    };
    if items.is_empty() {
        info!(%chat_id, "dinner requested with an empty fridge");
        reply(state, chat_id, EMPTY_FRIDGE_FOR_DINNER).await;
        return;
    }
    if !advisor_permit(state, chat_id).await {
        return;
    }

    let thinking = reply(
        state,
        chat_id,
        "Thinking about dinner options based on your ingredients... This might take a moment.",
    )
    .await;

    let mut draft = match state.poll_builder().build(chat_id, &state.dinner.cuisines, state.dinner.poll_size).await {
        Ok(draft) => draft,
        Err(PollError::Advisor(e)) => {
            warn!(%chat_id, error = %e, code = e.error_code(), "dinner: advisor failed");
            let text = "Sorry, I couldn't come up with dinner suggestions right now. Please try again later.";
            replace(state, chat_id, thinking, text).await;
            return;
        }
        Err(e) => {
            info!(%chat_id, code = e.error_code(), "dinner: {e}");
            replace(state, chat_id, thinking, NO_DINNER_IDEAS).await;
            return;
        }
    };

    replace(state, chat_id, thinking, &draft.render_details()).await;

    let options = draft.option_texts();
    let posted = match state.transport.send_poll(chat_id, POLL_QUESTION, &options).await {
        Ok(posted) => posted,
        Err(e) => {
            error!(%chat_id, error = %e, code = e.error_code(), committed = draft.is_committed(), "dinner: send_poll failed");
            reply(state, chat_id, "Sorry, I couldn't create the poll. Please try again later.").await;
            return;
        }
    };
    draft.commit(state.suggestions.as_ref()).await;

    match state.votes.create(chat_id, &posted, &options).await {
        Ok(record) => info!(%chat_id, vote_id = %record.id, poll_id = %posted.poll_id, options = options.len(), "dinner poll posted"),
        Err(e) => warn!(%chat_id, poll_id = %posted.poll_id, error = %e, code = e.error_code(), "vote record failed"),
    }
    reply(state, chat_id, "Please vote for your preferred dinner option! The poll is above.").await;
}

// =============================================================================
// SUGGEST
// =============================================================================

async fn suggest(state: &AppState, chat_id: ChatId, from: &Sender, args: &str) {
    let dish = args.trim();
    if dish.is_empty() {
        reply(state, chat_id, SUGGEST_USAGE).await;
        return;
    }
    let placeholder =
        reply(state, chat_id, &format!("Looking up '{dish}'... This might take a moment.")).await;

    // The suggestion is saved even when enrichment is unavailable.
    let info = match state.advisor_permit(chat_id) {
        Ok(()) => state
            .advisor
            .describe_dish(dish)
            .await
            .map_err(|e| warn!(%chat_id, dish, error = %e, code = e.error_code(), "describe_dish failed"))
            .ok(),
        Err(e) => {
            info!(%chat_id, dish, error = %e, "describe_dish skipped: rate limited");
            None
        }
    };
    let fridge_names = match state.fridge.list(chat_id).await {
        Ok(items) => Some(fridge::names(&items)),
        Err(e) => {
            warn!(%chat_id, error = %e, code = e.error_code(), "suggest: fridge read failed; skipping comparison");
            None
        }
    };

    let (suggestion, needed) = match info {
        Some(info) => {
            let name = if info.name.trim().is_empty() { dish.to_string() } else { info.name };
            let suggestion = NewSuggestion {
                proposer_id: from.id,
                proposer_name: from.display_name().to_string(),
                name,
                cuisine: info.cuisine,
                description: info.description,
            };
            (suggestion, info.ingredients)
        }
        None => {
            let suggestion = NewSuggestion {
                proposer_id: from.id,
                proposer_name: from.display_name().to_string(),
                name: dish.to_string(),
                cuisine: String::new(),
                description: String::new(),
            };
            (suggestion, Vec::new())
        }
    };
    let missing = fridge_names.as_deref().map(|have| missing_ingredients(&needed, have)).unwrap_or_default();

    match state.suggestions.add(chat_id, suggestion).await {
        Ok(saved) => {
            info!(%chat_id, suggestion_id = %saved.id, dish = %saved.name, "suggestion saved");
            replace(state, chat_id, placeholder, &render_suggestion(&saved, &needed, &missing)).await;
        }
        Err(e) => {
            warn!(%chat_id, dish, error = %e, code = e.error_code(), "suggestion save failed");
            let text = format!("Sorry, I couldn't save your suggestion for '{dish}'. Please try again later.");
            replace(state, chat_id, placeholder, &text).await;
        }
    }
}

/// Needed ingredients with no exact (case-sensitive) match in the fridge.
#[must_use]
pub fn missing_ingredients(needed: &[String], fridge: &[String]) -> Vec<String> {
    needed.iter().filter(|n| !fridge.contains(n)).cloned().collect()
}

fn render_suggestion(dish: &SuggestedDish, needed: &[String], missing: &[String]) -> String {
    let mut out = if dish.cuisine.is_empty() {
        format!("Thanks for suggesting {}!", dish.name)
    } else {
        format!("Thanks for suggesting {} ({} cuisine)!", dish.name, dish.cuisine)
    };
    if !dish.description.is_empty() {
        out.push_str("\n\n");
        out.push_str(&dish.description);
    }
    for (title, list) in [("Ingredients needed:", needed), ("Missing from your fridge:", missing)] {
        if list.is_empty() {
            continue;
        }
        out.push_str("\n\n");
        out.push_str(title);
        for item in list {
            out.push_str("\n• ");
            out.push_str(item);
        }
    }
    out.push_str("\n\nYour suggestion will be included in the next dinner poll.");
    out
}

// =============================================================================
// FRIDGE
// =============================================================================

/// Post the fridge listing.
pub(crate) async fn send_fridge(state: &AppState, chat_id: ChatId) {
    match state.fridge.list(chat_id).await {
        Ok(items) => {
            reply(state, chat_id, &render_fridge(&items)).await;
        }
        Err(e) => {
            warn!(%chat_id, error = %e, code = e.error_code(), "fridge read failed");
            reply(state, chat_id, FRIDGE_READ_FAILED).await;
        }
    }
}

/// Empty the fridge, then wait for a typed ingredient list.
async fn sync_fridge(state: &AppState, chat_id: ChatId) {
    if let Err(e) = state.fridge.clear(chat_id).await {
        warn!(%chat_id, error = %e, code = e.error_code(), "fridge reset failed");
        reply(state, chat_id, "Sorry, I couldn't reset your fridge. Please try again later.").await;
        return;
    }
    if !set_mode(state, chat_id, Mode::AwaitingIngredientsText).await {
        reply(state, chat_id, "Your fridge is now empty, but something went wrong. Please run /sync_fridge again.").await;
        return;
    }
    reply(
        state,
        chat_id,
        "Fridge reset! Now send me a list of the ingredients you have. \
You can send several messages and I'll add everything to your fridge.",
    )
    .await;
}

async fn add_photo(state: &AppState, chat_id: ChatId, photo: Option<&str>) {
    if !set_mode(state, chat_id, Mode::AwaitingPhotos).await {
        reply(state, chat_id, "Sorry, something went wrong. Please try /add_photo again.").await;
        return;
    }
    match photo {
        Some(file_id) => messages::ingest_photo(state, chat_id, file_id, Mode::AwaitingPhotos).await,
        None => {
            reply_with_buttons(
                state,
                chat_id,
                "Send me photos of your fridge or pantry and I'll pick out the ingredients.",
                &[Button::new("Cancel", CANCEL_ADDING_PHOTOS)],
            )
            .await;
        }
    }
}
