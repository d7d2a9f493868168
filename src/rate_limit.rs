//! In-memory rate limiting for Advisor calls.
//!
//! DESIGN
//! ======
//! Sliding-window counters backed by `HashMap<ChatId, VecDeque<Instant>>`.
//! Two limits are enforced:
//! - Per-chat: `RATE_LIMIT_PER_CHAT` Advisor calls per window (default 10/min)
//! - Global: `RATE_LIMIT_GLOBAL` Advisor calls per window (default 30/min)
//!
//! A chat that trips either limit gets a retry-later reply instead of an
//! Advisor round-trip. Stores and transport calls are never limited here.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::event::ChatId;

pub const DEFAULT_PER_CHAT_LIMIT: usize = 10;
pub const DEFAULT_GLOBAL_LIMIT: usize = 30;
pub const DEFAULT_WINDOW_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_chat_limit: usize,
    pub global_limit: usize,
    pub window: Duration,
}

impl RateLimitConfig {
    /// Read `RATE_LIMIT_PER_CHAT`, `RATE_LIMIT_GLOBAL` and
    /// `RATE_LIMIT_WINDOW_SECS`. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            per_chat_limit: lookup_parse(lookup, "RATE_LIMIT_PER_CHAT", DEFAULT_PER_CHAT_LIMIT),
            global_limit: lookup_parse(lookup, "RATE_LIMIT_GLOBAL", DEFAULT_GLOBAL_LIMIT),
            window: Duration::from_secs(lookup_parse(lookup, "RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS)),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_chat_limit: DEFAULT_PER_CHAT_LIMIT,
            global_limit: DEFAULT_GLOBAL_LIMIT,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

fn lookup_parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, Clone, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum RateLimitError {
    #[error("per-chat rate limit exceeded (max {limit} requests/{window_secs}s)")]
    PerChatExceeded { limit: usize, window_secs: u64 },
    #[error("global rate limit exceeded (max {limit} requests/{window_secs}s)")]
    GlobalExceeded { limit: usize, window_secs: u64 },
}

impl crate::error::ErrorCode for RateLimitError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::PerChatExceeded { .. } => "E_RATE_LIMIT_CHAT",
            Self::GlobalExceeded { .. } => "E_RATE_LIMIT_GLOBAL",
        }
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<RateLimiterInner>>,
    config: RateLimitConfig,
}

struct RateLimiterInner {
    /// Per-chat request timestamps.
    chat_requests: HashMap<ChatId, VecDeque<Instant>>,
    /// Global request timestamps.
    global_requests: VecDeque<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RateLimiterInner {
                chat_requests: HashMap::new(),
                global_requests: VecDeque::new(),
            })),
            config,
        }
    }

    /// Check both per-chat and global limits, then record the request.
    ///
    /// # Errors
    ///
    /// Returns which limit was hit; nothing is recorded in that case.
    pub fn check_and_record(&self, chat_id: ChatId) -> Result<(), RateLimitError> {
        self.check_and_record_at(chat_id, Instant::now())
    }

    fn check_and_record_at(&self, chat_id: ChatId, now: Instant) -> Result<(), RateLimitError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let cfg = self.config;

        prune_window(&mut inner.global_requests, now, cfg.window);
        if inner.global_requests.len() >= cfg.global_limit {
            return Err(RateLimitError::GlobalExceeded { limit: cfg.global_limit, window_secs: cfg.window.as_secs() });
        }

        let chat_deque = inner.chat_requests.entry(chat_id).or_default();
        prune_window(chat_deque, now, cfg.window);
        if chat_deque.len() >= cfg.per_chat_limit {
            return Err(RateLimitError::PerChatExceeded {
                limit: cfg.per_chat_limit,
                window_secs: cfg.window.as_secs(),
            });
        }

        chat_deque.push_back(now);
        inner.global_requests.push_back(now);

        // Drop chats whose windows have fully drained.
        inner.chat_requests.retain(|_, deque| {
            prune_window(deque, now, cfg.window);
            !deque.is_empty()
        });

        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) > window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
