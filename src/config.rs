//! Bot configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! Everything is read once at startup through a key lookup closure, so
//! tests can feed a map instead of mutating the process environment.
//! Required values fail fast with a [`ConfigError`]; tuning knobs fall back
//! to their defaults when absent or unparseable.

use std::time::Duration;

use crate::rate_limit::RateLimitConfig;
use crate::services::poll::CommitPolicy;

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_TELEGRAM_POLL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CUISINES: &[&str] = &["Italian", "Mexican", "Asian", "Mediterranean", "American"];
pub const DEFAULT_POLL_SIZE: usize = 4;
/// Telegram refuses polls with more than ten options.
pub const TELEGRAM_MAX_POLL_OPTIONS: usize = 10;
pub const DEFAULT_ADVISOR_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_ADVISOR_MAX_ATTEMPTS: u32 = 2;
pub const DEFAULT_ADVISOR_RETRY_BASE_MS: u64 = 500;
pub const DEFAULT_ADVISOR_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_CHAT_WORKER_QUEUE: usize = 64;
pub const DEFAULT_CHAT_WORKER_IDLE_SECS: u64 = 600;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl crate::error::ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing(_) => "E_CONFIG_MISSING",
            Self::Invalid { .. } => "E_CONFIG_INVALID",
        }
    }
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Public URL Telegram should post updates to.
    pub url: String,
    /// Shared secret echoed back in `X-Telegram-Bot-Api-Secret-Token`.
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub token: String,
    pub api_base: String,
    pub poll_timeout_secs: u64,
    /// `Some` switches the bot from long polling to webhook delivery.
    pub webhook: Option<WebhookConfig>,
}

/// Knobs for the dinner poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DinnerConfig {
    pub cuisines: Vec<String>,
    /// Desired number of poll options.
    pub poll_size: usize,
    /// Hard ceiling on poll options.
    pub poll_max_options: usize,
    pub commit: CommitPolicy,
}

impl Default for DinnerConfig {
    fn default() -> Self {
        Self {
            cuisines: DEFAULT_CUISINES.iter().map(|c| (*c).to_string()).collect(),
            poll_size: DEFAULT_POLL_SIZE,
            poll_max_options: TELEGRAM_MAX_POLL_OPTIONS,
            commit: CommitPolicy::Eager,
        }
    }
}

/// Deadline and retry policy wrapped around every Advisor call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvisorSettings {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub max_tokens: u32,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_ADVISOR_TIMEOUT_SECS),
            max_attempts: DEFAULT_ADVISOR_MAX_ATTEMPTS,
            retry_base: Duration::from_millis(DEFAULT_ADVISOR_RETRY_BASE_MS),
            max_tokens: DEFAULT_ADVISOR_MAX_TOKENS,
        }
    }
}

/// Per-chat worker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Bounded queue depth per chat.
    pub queue: usize,
    /// How long a worker waits for its next event before exiting.
    pub idle: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { queue: DEFAULT_CHAT_WORKER_QUEUE, idle: Duration::from_secs(DEFAULT_CHAT_WORKER_IDLE_SECS) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub telegram: TelegramConfig,
    pub database_url: String,
    pub db_max_connections: u32,
    pub port: u16,
    pub dinner: DinnerConfig,
    pub advisor: AdvisorSettings,
    pub workers: WorkerConfig,
    pub rate_limit: RateLimitConfig,
}

// =============================================================================
// PARSING
// =============================================================================

impl BotConfig {
    /// Build the bot config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the bot config from an arbitrary key lookup.
    ///
    /// Required: `BOT_TOKEN`, `DATABASE_URL`. `WEBHOOK_URL` and
    /// `WEBHOOK_SECRET` must be set together or not at all.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = required(&lookup, "BOT_TOKEN")?;
        let database_url = required(&lookup, "DATABASE_URL")?;

        let webhook = match (non_empty(&lookup, "WEBHOOK_URL"), non_empty(&lookup, "WEBHOOK_SECRET")) {
            (Some(url), Some(secret)) => Some(WebhookConfig { url, secret }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("WEBHOOK_SECRET")),
            (None, Some(_)) => return Err(ConfigError::Missing("WEBHOOK_URL")),
        };

        let telegram = TelegramConfig {
            token,
            api_base: non_empty(&lookup, "TELEGRAM_API_BASE")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            poll_timeout_secs: parse_or(&lookup, "TELEGRAM_POLL_TIMEOUT_SECS", DEFAULT_TELEGRAM_POLL_TIMEOUT_SECS),
            webhook,
        };

        let poll_max_options = parse_or(&lookup, "POLL_MAX_OPTIONS", TELEGRAM_MAX_POLL_OPTIONS);
        if !(2..=TELEGRAM_MAX_POLL_OPTIONS).contains(&poll_max_options) {
            return Err(ConfigError::Invalid {
                var: "POLL_MAX_OPTIONS",
                reason: format!("must be between 2 and {TELEGRAM_MAX_POLL_OPTIONS}"),
            });
        }
        let poll_size = parse_or(&lookup, "POLL_SIZE", DEFAULT_POLL_SIZE).clamp(2, poll_max_options);

        let commit = match lookup("SUGGESTION_COMMIT") {
            Some(raw) => raw
                .parse::<CommitPolicy>()
                .map_err(|reason| ConfigError::Invalid { var: "SUGGESTION_COMMIT", reason })?,
            None => CommitPolicy::Eager,
        };

        let cuisines = lookup("CUISINES")
            .map(|raw| parse_cuisines(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| DinnerConfig::default().cuisines);

        let advisor = AdvisorSettings {
            timeout: Duration::from_secs(parse_or(&lookup, "ADVISOR_TIMEOUT_SECS", DEFAULT_ADVISOR_TIMEOUT_SECS)),
            max_attempts: parse_or(&lookup, "ADVISOR_MAX_ATTEMPTS", DEFAULT_ADVISOR_MAX_ATTEMPTS).max(1),
            retry_base: Duration::from_millis(parse_or(&lookup, "ADVISOR_RETRY_BASE_MS", DEFAULT_ADVISOR_RETRY_BASE_MS)),
            max_tokens: parse_or(&lookup, "ADVISOR_MAX_TOKENS", DEFAULT_ADVISOR_MAX_TOKENS),
        };

        let workers = WorkerConfig {
            queue: parse_or(&lookup, "CHAT_WORKER_QUEUE", DEFAULT_CHAT_WORKER_QUEUE).max(1),
            idle: Duration::from_secs(parse_or(&lookup, "CHAT_WORKER_IDLE_SECS", DEFAULT_CHAT_WORKER_IDLE_SECS)),
        };

        Ok(Self {
            telegram,
            database_url,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            dinner: DinnerConfig { cuisines, poll_size, poll_max_options, commit },
            advisor,
            workers,
            rate_limit: RateLimitConfig::from_lookup(&lookup),
        })
    }
}

/// Split a comma-separated cuisine list, dropping blanks and repeats.
#[must_use]
pub fn parse_cuisines(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for cuisine in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if !out.iter().any(|seen| seen.eq_ignore_ascii_case(cuisine)) {
            out.push(cuisine.to_string());
        }
    }
    out
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<String, ConfigError> {
    non_empty(lookup, key).ok_or(ConfigError::Missing(key))
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
