//! Advisor — the AI backend behind dish suggestions and ingredient extraction.
//!
//! DESIGN
//! ======
//! [`Advisor`] is the narrow contract the workflow depends on. [`LlmAdvisor`]
//! implements it on top of any [`LlmChat`] by handing the model exactly one
//! tool per operation and reading the tool input back as the answer. When a
//! provider replies with prose instead, the first JSON value in the text is
//! used.
//!
//! ERROR HANDLING
//! ==============
//! Every call runs under a deadline. Timeouts and retryable provider errors
//! are retried with exponential backoff plus jitter, up to the configured
//! attempt count. Everything else fails straight through as an
//! [`AdvisorError`]; callers turn that into an apologetic chat message.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::AdvisorSettings;
use crate::error::ErrorCode;
use crate::llm::LlmChat;
use crate::llm::tools::{
    RECORD_DISH_INFO, RECORD_DISHES, RECORD_INGREDIENTS, record_dish_info_tool, record_dishes_tool,
    record_ingredients_tool,
};
use crate::llm::types::{Content, ContentBlock, LlmError, Message, Tool};

// =============================================================================
// TYPES
// =============================================================================

/// One AI-generated dinner idea.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DishCandidate {
    pub name: String,
    #[serde(default)]
    pub cuisine: String,
    #[serde(default)]
    pub description: String,
}

/// The Advisor's structured guess about one named dish.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DishInfo {
    pub name: String,
    #[serde(default)]
    pub cuisine: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "ingredients_needed")]
    pub ingredients: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AdvisorError {
    #[error("advisor is not configured")]
    NotConfigured,
    #[error("advisor timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("advisor request failed: {0}")]
    Llm(#[from] LlmError),
    #[error("advisor reply was malformed: {0}")]
    Malformed(String),
}

impl ErrorCode for AdvisorError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "E_ADVISOR_NOT_CONFIGURED",
            Self::Timeout { .. } => "E_ADVISOR_TIMEOUT",
            Self::Llm(e) => e.error_code(),
            Self::Malformed(_) => "E_ADVISOR_MALFORMED",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Llm(e) => e.retryable(),
            Self::NotConfigured | Self::Malformed(_) => false,
        }
    }
}

#[async_trait::async_trait]
pub trait Advisor: Send + Sync {
    /// Up to `count` dinner ideas for the given ingredients and cuisines.
    async fn suggest_dishes(
        &self,
        ingredients: &[String],
        cuisines: &[String],
        count: usize,
    ) -> Result<Vec<DishCandidate>, AdvisorError>;

    /// Ingredient names visible in the photo at `photo_url`.
    async fn extract_ingredients(&self, photo_url: &str) -> Result<Vec<String>, AdvisorError>;

    /// Ingredient names mentioned in free text.
    async fn parse_ingredients(&self, text: &str) -> Result<Vec<String>, AdvisorError>;

    /// Cuisine, description and needed ingredients for a named dish.
    async fn describe_dish(&self, name: &str) -> Result<DishInfo, AdvisorError>;
}

// =============================================================================
// PROMPTS
// =============================================================================

const SUGGEST_SYSTEM: &str = "You are a home cooking assistant for a family group chat. \
Suggest realistic dinners that can be cooked mostly from the listed ingredients. \
Keep names short enough to fit a poll option. Always answer with the record_dishes tool.";

const PHOTO_SYSTEM: &str = "You identify food ingredients in photos of fridges, pantries and groceries. \
List each distinct ingredient once, as a short capitalized singular name without quantities or brands. \
Ignore anything that is not food. Always answer with the record_ingredients tool.";

const TEXT_SYSTEM: &str = "You turn a free-form message about groceries into a list of ingredients. \
List each distinct ingredient once, as a short capitalized singular name without quantities. \
Always answer with the record_ingredients tool.";

const DESCRIBE_SYSTEM: &str = "You are a cooking encyclopedia. Given a dish name, state its cuisine, \
a one or two sentence description, and the main ingredients needed to cook it, \
as short capitalized singular names. Always answer with the record_dish_info tool.";

fn suggest_prompt(ingredients: &[String], cuisines: &[String], count: usize) -> String {
    format!(
        "Ingredients available: {}.\nPreferred cuisines: {}.\nSuggest exactly {count} different dinner dishes.",
        ingredients.join(", "),
        if cuisines.is_empty() { "any".to_string() } else { cuisines.join(", ") },
    )
}

// =============================================================================
// LLM ADVISOR
// =============================================================================

/// [`Advisor`] backed by an LLM. With no client configured every call fails
/// with [`AdvisorError::NotConfigured`].
pub struct LlmAdvisor {
    llm: Option<Arc<dyn LlmChat>>,
    settings: AdvisorSettings,
}

impl LlmAdvisor {
    #[must_use]
    pub fn new(llm: Option<Arc<dyn LlmChat>>, settings: AdvisorSettings) -> Self {
        Self { llm, settings }
    }

    /// Run one tool-forced request under the deadline and retry policy.
    async fn call_tool(&self, system: &str, message: Message, tool: Tool) -> Result<Value, AdvisorError> {
        let llm = self.llm.as_ref().ok_or(AdvisorError::NotConfigured)?;
        let messages = [message];
        let tools = [tool];
        let max_attempts = self.settings.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let outcome = tokio::time::timeout(
                self.settings.timeout,
                llm.chat(self.settings.max_tokens, system, &messages, Some(&tools[..])),
            )
            .await;

            let err = match outcome {
                Ok(Ok(response)) => {
                    debug!(
                        tool = %tools[0].name,
                        input_tokens = response.input_tokens,
                        output_tokens = response.output_tokens,
                        "advisor reply"
                    );
                    if let Some(input) = response.tool_input(&tools[0].name) {
                        return Ok(input.clone());
                    }
                    return extract_json(&response.text())
                        .ok_or_else(|| AdvisorError::Malformed(format!("no {} call and no JSON in reply", tools[0].name)));
                }
                Ok(Err(e)) => AdvisorError::Llm(e),
                Err(_) => AdvisorError::Timeout { secs: self.settings.timeout.as_secs() },
            };

            if !err.retryable() || attempt >= max_attempts {
                return Err(err);
            }
            let delay = backoff_delay(self.settings.retry_base, attempt);
            info!(tool = %tools[0].name, attempt, delay_ms = delay.as_millis(), error = %err, "retrying advisor call");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait::async_trait]
impl Advisor for LlmAdvisor {
    async fn suggest_dishes(
        &self,
        ingredients: &[String],
        cuisines: &[String],
        count: usize,
    ) -> Result<Vec<DishCandidate>, AdvisorError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let value = self
            .call_tool(
                SUGGEST_SYSTEM,
                Message::user_text(suggest_prompt(ingredients, cuisines, count)),
                record_dishes_tool(),
            )
            .await?;
        let mut dishes = parse_dishes(value)?;
        if dishes.len() > count {
            warn!(requested = count, returned = dishes.len(), "advisor returned extra dishes; truncating");
            dishes.truncate(count);
        }
        Ok(dishes)
    }

    async fn extract_ingredients(&self, photo_url: &str) -> Result<Vec<String>, AdvisorError> {
        let message = Message {
            role: "user".into(),
            content: Content::Blocks(vec![
                ContentBlock::Text { text: "List the ingredients you can see in this photo.".into() },
                ContentBlock::image_url(photo_url),
            ]),
        };
        let value = self.call_tool(PHOTO_SYSTEM, message, record_ingredients_tool()).await?;
        parse_ingredient_list(value)
    }

    async fn parse_ingredients(&self, text: &str) -> Result<Vec<String>, AdvisorError> {
        let value = self
            .call_tool(TEXT_SYSTEM, Message::user_text(text), record_ingredients_tool())
            .await?;
        parse_ingredient_list(value)
    }

    async fn describe_dish(&self, name: &str) -> Result<DishInfo, AdvisorError> {
        let value = self
            .call_tool(DESCRIBE_SYSTEM, Message::user_text(format!("Dish: {name}")), record_dish_info_tool())
            .await?;
        let mut info: DishInfo = serde_json::from_value(value)
            .map_err(|e| AdvisorError::Malformed(format!("{RECORD_DISH_INFO}: {e}")))?;
        if info.name.trim().is_empty() {
            info.name = name.to_string();
        }
        info.ingredients = clean_names(info.ingredients);
        Ok(info)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// `base * 2^(attempt-1)` plus up to half of `base` in random jitter.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1_u32 << attempt.saturating_sub(1).min(16));
    let jitter_cap = u64::try_from(base.as_millis() / 2).unwrap_or(u64::MAX);
    exp + Duration::from_millis(rand::rng().random_range(0..=jitter_cap))
}

/// Accepts `{"dishes": [...]}` or a bare array. Nameless entries are dropped.
fn parse_dishes(value: Value) -> Result<Vec<DishCandidate>, AdvisorError> {
    let list = match value {
        Value::Object(mut map) => map.remove("dishes").unwrap_or(Value::Null),
        other => other,
    };
    let dishes: Vec<DishCandidate> =
        serde_json::from_value(list).map_err(|e| AdvisorError::Malformed(format!("{RECORD_DISHES}: {e}")))?;
    Ok(dishes
        .into_iter()
        .filter_map(|mut d| {
            d.name = d.name.trim().to_string();
            (!d.name.is_empty()).then_some(d)
        })
        .collect())
}

/// Accepts `{"ingredients": [...]}` or a bare array of strings.
fn parse_ingredient_list(value: Value) -> Result<Vec<String>, AdvisorError> {
    let list = match value {
        Value::Object(mut map) => map.remove("ingredients").unwrap_or(Value::Null),
        other => other,
    };
    let names: Vec<String> =
        serde_json::from_value(list).map_err(|e| AdvisorError::Malformed(format!("{RECORD_INGREDIENTS}: {e}")))?;
    Ok(clean_names(names))
}

/// Trim, drop blanks, and drop exact repeats while keeping first-seen order.
fn clean_names(names: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|seen| seen == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// First JSON object or array embedded in free text, including fenced blocks.
fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) else {
            continue;
        };
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
#[path = "advisor_test.rs"]
mod tests;
