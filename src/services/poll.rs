//! Poll construction — merging member suggestions with AI ideas.
//!
//! DESIGN
//! ======
//! [`PollBuilder::build`] produces a staged [`PollDraft`]:
//! 1. Unused suggestions, oldest first (a read failure counts as none).
//! 2. `ai_count = max(2, desired - unused)` when there are suggestions,
//!    else `desired`, clamped so the poll stays under the option ceiling.
//! 3. AI candidates for the chat's ingredients and cuisines.
//! 4. Suggestions first, then AI candidates, each in source order.
//!
//! Suggestions always lead so a member's idea can't be crowded out. At most
//! `max - 2` suggestions go into one poll; the rest wait for the next one.
//!
//! COMMIT POLICY
//! =============
//! Folding a suggestion into a poll flips its `used` flag. Under
//! [`CommitPolicy::Eager`] that happens inside `build`, before the poll is
//! sent, so a failed send can spend a suggestion without showing it. Under
//! [`CommitPolicy::AfterSend`] the caller commits the draft once the
//! transport has accepted the poll.

use std::str::FromStr;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::StoreError;
use crate::error::ErrorCode;
use crate::event::ChatId;
use crate::services::advisor::{Advisor, AdvisorError, DishCandidate};
use crate::services::fridge::{self, IngredientStore};
use crate::services::suggestions::{SuggestedDish, SuggestionPool};

/// Telegram's per-option text limit.
pub const OPTION_TEXT_LIMIT: usize = 100;
/// Fewest options a poll can have.
pub const MIN_OPTIONS: usize = 2;

// =============================================================================
// TYPES
// =============================================================================

/// When folded suggestions are marked used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    #[default]
    Eager,
    AfterSend,
}

impl FromStr for CommitPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "eager" => Ok(Self::Eager),
            "after_send" => Ok(Self::AfterSend),
            other => Err(format!("unknown commit policy '{other}' (expected 'eager' or 'after_send')")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("no suggestions and no AI candidates")]
    NoOptions,
    #[error("only {found} option(s); a poll needs at least {MIN_OPTIONS}")]
    NotEnoughOptions { found: usize },
    #[error(transparent)]
    Advisor(#[from] AdvisorError),
}

impl ErrorCode for PollError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NoOptions => "E_POLL_NO_OPTIONS",
            Self::NotEnoughOptions { .. } => "E_POLL_NOT_ENOUGH_OPTIONS",
            Self::Advisor(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Advisor(e) if e.retryable())
    }
}

/// Where one option came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionSource {
    Member { suggestion_id: Uuid, proposer: String },
    Advisor,
}

/// One poll option with the details shown above the poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOption {
    /// Poll-safe text (truncated to the platform limit).
    pub text: String,
    pub cuisine: String,
    pub description: String,
    pub source: OptionSource,
}

/// A merged option list whose `used` flags may not be committed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollDraft {
    pub options: Vec<PollOption>,
    /// How many AI candidates were requested.
    pub ai_requested: usize,
    committed: bool,
}

impl PollDraft {
    /// Option strings in poll order.
    #[must_use]
    pub fn option_texts(&self) -> Vec<String> {
        self.options.iter().map(|o| o.text.clone()).collect()
    }

    /// Ids of the member suggestions folded into this draft.
    #[must_use]
    pub fn suggestion_ids(&self) -> Vec<Uuid> {
        self.options
            .iter()
            .filter_map(|o| match o.source {
                OptionSource::Member { suggestion_id, .. } => Some(suggestion_id),
                OptionSource::Advisor => None,
            })
            .collect()
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Mark every folded suggestion used. Idempotent; per-item failures are
    /// logged and do not stop the rest.
    pub async fn commit(&mut self, pool: &dyn SuggestionPool) {
        if self.committed {
            return;
        }
        for id in self.suggestion_ids() {
            if let Err(e) = pool.mark_used(id).await {
                warn!(suggestion_id = %id, error = %e, code = e.error_code(), "mark_used failed");
            }
        }
        self.committed = true;
    }

    /// The numbered block posted before the poll.
    #[must_use]
    pub fn render_details(&self) -> String {
        let mut out = String::from("Tonight's options:\n");
        for (idx, option) in self.options.iter().enumerate() {
            out.push('\n');
            out.push_str(&format!("{}. {}", idx + 1, option.text));
            if !option.cuisine.is_empty() {
                out.push_str(&format!(" ({})", option.cuisine));
            }
            if let OptionSource::Member { proposer, .. } = &option.source {
                out.push_str(&format!(", suggested by {proposer}"));
            }
            if !option.description.is_empty() {
                out.push_str("\n   ");
                out.push_str(&option.description);
            }
            out.push('\n');
        }
        out.truncate(out.trim_end().len());
        out
    }
}

// =============================================================================
// MERGE
// =============================================================================

/// How many AI candidates to ask for given `unused` member suggestions.
#[must_use]
pub fn ai_request_count(unused: usize, desired_total: usize) -> usize {
    if unused == 0 { desired_total } else { MIN_OPTIONS.max(desired_total.saturating_sub(unused)) }
}

/// Merge member suggestions and AI candidates into poll order.
///
/// Suggestions come first. AI candidates whose name repeats an option
/// already present (ignoring case) are skipped. Never exceeds `max_options`.
#[must_use]
pub fn merge(suggestions: &[SuggestedDish], candidates: &[DishCandidate], max_options: usize) -> Vec<PollOption> {
    let mut options: Vec<PollOption> = Vec::with_capacity(max_options);
    for dish in suggestions.iter().take(max_options) {
        options.push(PollOption {
            text: truncate_option(&dish.name),
            cuisine: dish.cuisine.clone(),
            description: dish.description.clone(),
            source: OptionSource::Member { suggestion_id: dish.id, proposer: dish.proposer_name.clone() },
        });
    }
    for candidate in candidates {
        if options.len() >= max_options {
            break;
        }
        let text = truncate_option(&candidate.name);
        if text.is_empty() || options.iter().any(|o| o.text.to_lowercase() == text.to_lowercase()) {
            debug!(dish = %candidate.name, "skipping duplicate AI candidate");
            continue;
        }
        options.push(PollOption {
            text,
            cuisine: candidate.cuisine.clone(),
            description: candidate.description.clone(),
            source: OptionSource::Advisor,
        });
    }
    options
}

fn truncate_option(name: &str) -> String {
    name.trim().chars().take(OPTION_TEXT_LIMIT).collect::<String>().trim_end().to_string()
}

// =============================================================================
// BUILDER
// =============================================================================

/// Everything `build` reads from, borrowed for one call.
pub struct PollBuilder<'a> {
    pub suggestions: &'a dyn SuggestionPool,
    pub ingredients: &'a dyn IngredientStore,
    pub advisor: &'a dyn Advisor,
    pub max_options: usize,
    pub policy: CommitPolicy,
}

impl PollBuilder<'_> {
    /// Build the option list for a chat's next poll.
    ///
    /// # Errors
    ///
    /// `NoOptions` when neither source yields anything, `NotEnoughOptions`
    /// when the merge has a single option, and `Advisor` when the Advisor
    /// fails and there are no member suggestions to fall back on. No
    /// suggestion is marked used on any error.
    pub async fn build(
        &self,
        chat_id: ChatId,
        cuisines: &[String],
        desired_total: usize,
    ) -> Result<PollDraft, PollError> {
        let max_options = self.max_options.max(MIN_OPTIONS);
        let desired_total = desired_total.clamp(MIN_OPTIONS, max_options);

        let mut unused = self.suggestions.list_unused(chat_id).await.unwrap_or_else(|e| {
            log_degraded(chat_id, "list_unused", &e);
            Vec::new()
        });
        unused.truncate(max_options - MIN_OPTIONS);

        let ai_requested = ai_request_count(unused.len(), desired_total).min(max_options - unused.len());
        let candidates = if ai_requested == 0 {
            Vec::new()
        } else {
            let ingredient_names = match self.ingredients.list(chat_id).await {
                Ok(items) => fridge::names(&items),
                Err(e) => {
                    log_degraded(chat_id, "ingredients.list", &e);
                    Vec::new()
                }
            };
            match self.advisor.suggest_dishes(&ingredient_names, cuisines, ai_requested).await {
                Ok(candidates) => candidates,
                Err(e) if unused.is_empty() => return Err(PollError::Advisor(e)),
                Err(e) => {
                    warn!(%chat_id, error = %e, code = e.error_code(), "advisor failed; using member suggestions only");
                    Vec::new()
                }
            }
        };

        let options = merge(&unused, &candidates, max_options);
        debug!(%chat_id, suggestions = unused.len(), ai_requested, ai_returned = candidates.len(), total = options.len(), "merged poll options");
        match options.len() {
            0 => return Err(PollError::NoOptions),
            found if found < MIN_OPTIONS => return Err(PollError::NotEnoughOptions { found }),
            _ => {}
        }

        let mut draft = PollDraft { options, ai_requested, committed: false };
        if self.policy == CommitPolicy::Eager {
            draft.commit(self.suggestions).await;
        }
        Ok(draft)
    }
}

fn log_degraded(chat_id: ChatId, op: &str, e: &StoreError) {
    warn!(%chat_id, op, error = %e, code = e.error_code(), "store read failed; continuing without it");
}

#[cfg(test)]
#[path = "poll_test.rs"]
mod tests;
