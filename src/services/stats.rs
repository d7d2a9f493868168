//! `/stats` — a read-only summary over the chat's stores.
//!
//! Every read degrades independently; a failed count is shown as unknown
//! rather than failing the whole summary.

use tracing::warn;

use crate::event::ChatId;
use crate::services::fridge::IngredientStore;
use crate::services::suggestions::SuggestionPool;
use crate::services::votes::{Tally, VoteLedger, VoteRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatStats {
    pub ingredients: Option<usize>,
    pub unused_suggestions: Option<i64>,
    pub polls: Option<i64>,
    pub current: Option<(VoteRecord, Tally)>,
}

pub async fn collect(
    chat_id: ChatId,
    fridge: &dyn IngredientStore,
    suggestions: &dyn SuggestionPool,
    votes: &dyn VoteLedger,
) -> ChatStats {
    let ingredients = fridge
        .list(chat_id)
        .await
        .map(|items| items.len())
        .map_err(|e| warn!(%chat_id, error = %e, "stats: fridge read failed"))
        .ok();
    let unused_suggestions = suggestions
        .count_unused(chat_id)
        .await
        .map_err(|e| warn!(%chat_id, error = %e, "stats: suggestion count failed"))
        .ok();
    let polls = votes
        .count(chat_id)
        .await
        .map_err(|e| warn!(%chat_id, error = %e, "stats: poll count failed"))
        .ok();
    let current = votes
        .current(chat_id)
        .await
        .map_err(|e| warn!(%chat_id, error = %e, "stats: current poll read failed"))
        .ok()
        .flatten();
    ChatStats { ingredients, unused_suggestions, polls, current }
}

impl ChatStats {
    #[must_use]
    pub fn render(&self) -> String {
        fn show<T: ToString>(value: Option<T>) -> String {
            value.map_or_else(|| "unknown".to_string(), |v| v.to_string())
        }

        let mut out = format!(
            "Kitchen stats:\n• Ingredients in the fridge: {}\n• Suggestions waiting for a poll: {}\n• Polls so far: {}",
            show(self.ingredients),
            show(self.unused_suggestions),
            show(self.polls),
        );
        match &self.current {
            Some((_, tally)) => {
                out.push_str(&format!("\n\nCurrent poll ({} voter(s)):", tally.voters));
                for (option, count) in &tally.counts {
                    out.push_str(&format!("\n• {option}: {count}"));
                }
                let leaders = tally.leaders();
                if !leaders.is_empty() {
                    out.push_str(&format!("\nLeading: {}", leaders.join(", ")));
                }
            }
            None => out.push_str("\n\nNo open poll. Start one with /dinner."),
        }
        out
    }
}
