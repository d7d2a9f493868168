//! Chat state — the per-chat conversational mode.
//!
//! DESIGN
//! ======
//! A chat with no stored row is `Idle`. Setting `Idle` deletes the row, so
//! the table only holds chats that are mid-flow. Per-chat serialization is
//! the dispatcher's job; this store only persists the latest value.

use sqlx::PgPool;
use tracing::warn;

use crate::db::StoreError;
use crate::event::ChatId;

/// How the next free text or photo in a chat is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Idle,
    AwaitingIngredientsText,
    AwaitingPhotos,
    /// Reserved: `/suggest` takes the dish as an argument, so nothing parks
    /// a chat here today.
    AwaitingDishName,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingIngredientsText => "awaiting_ingredients_text",
            Self::AwaitingPhotos => "awaiting_photos",
            Self::AwaitingDishName => "awaiting_dish_name",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "idle" => Some(Self::Idle),
            "awaiting_ingredients_text" => Some(Self::AwaitingIngredientsText),
            "awaiting_photos" => Some(Self::AwaitingPhotos),
            "awaiting_dish_name" => Some(Self::AwaitingDishName),
            _ => None,
        }
    }

    /// Whether free text and photos count as ingredient input.
    #[must_use]
    pub fn accepts_ingredients(self) -> bool {
        matches!(self, Self::AwaitingIngredientsText | Self::AwaitingPhotos)
    }
}

#[async_trait::async_trait]
pub trait ChatStateStore: Send + Sync {
    async fn get(&self, chat_id: ChatId) -> Result<Mode, StoreError>;
    async fn set(&self, chat_id: ChatId, mode: Mode) -> Result<(), StoreError>;
    async fn clear(&self, chat_id: ChatId) -> Result<(), StoreError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

pub struct PgChatStateStore {
    pool: PgPool,
}

impl PgChatStateStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ChatStateStore for PgChatStateStore {
    async fn get(&self, chat_id: ChatId) -> Result<Mode, StoreError> {
        let row = sqlx::query_scalar::<_, String>("SELECT mode FROM chat_modes WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(raw) = row else {
            return Ok(Mode::Idle);
        };
        // An unreadable row must not wedge the chat.
        Ok(Mode::parse(&raw).unwrap_or_else(|| {
            warn!(%chat_id, mode = %raw, "unknown stored mode; treating as idle");
            Mode::Idle
        }))
    }

    async fn set(&self, chat_id: ChatId, mode: Mode) -> Result<(), StoreError> {
        if mode == Mode::Idle {
            return self.clear(chat_id).await;
        }
        sqlx::query(
            "INSERT INTO chat_modes (chat_id, mode) VALUES ($1, $2)
             ON CONFLICT (chat_id) DO UPDATE SET mode = EXCLUDED.mode, updated_at = now()",
        )
        .bind(chat_id)
        .bind(mode.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self, chat_id: ChatId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM chat_modes WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
