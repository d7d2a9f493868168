//! Suggestion pool — dishes group members proposed with `/suggest`.
//!
//! DESIGN
//! ======
//! Suggestions are never deleted. `used` flips to true once a suggestion is
//! folded into a poll and never flips back, so `list_unused` is the whole
//! eligibility rule. Creation order comes from a sequence column rather
//! than timestamps, which can tie.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::StoreError;
use crate::event::ChatId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedDish {
    pub id: Uuid,
    pub chat_id: ChatId,
    pub proposer_id: i64,
    pub proposer_name: String,
    pub name: String,
    pub cuisine: String,
    pub description: String,
    pub used: bool,
    pub created_at: OffsetDateTime,
}

/// Fields supplied when a member proposes a dish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSuggestion {
    pub proposer_id: i64,
    pub proposer_name: String,
    pub name: String,
    pub cuisine: String,
    pub description: String,
}

#[async_trait::async_trait]
pub trait SuggestionPool: Send + Sync {
    /// Unused suggestions for a chat, oldest first.
    async fn list_unused(&self, chat_id: ChatId) -> Result<Vec<SuggestedDish>, StoreError>;
    async fn add(&self, chat_id: ChatId, suggestion: NewSuggestion) -> Result<SuggestedDish, StoreError>;
    async fn mark_used(&self, id: Uuid) -> Result<(), StoreError>;
    async fn count_unused(&self, chat_id: ChatId) -> Result<i64, StoreError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

type SuggestionRow = (Uuid, i64, i64, String, String, String, String, bool, OffsetDateTime);

fn from_row(row: SuggestionRow) -> SuggestedDish {
    let (id, chat_id, proposer_id, proposer_name, name, cuisine, description, used, created_at) = row;
    SuggestedDish { id, chat_id, proposer_id, proposer_name, name, cuisine, description, used, created_at }
}

pub struct PgSuggestionPool {
    pool: PgPool,
}

impl PgSuggestionPool {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SuggestionPool for PgSuggestionPool {
    async fn list_unused(&self, chat_id: ChatId) -> Result<Vec<SuggestedDish>, StoreError> {
        let rows = sqlx::query_as::<_, SuggestionRow>(
            "SELECT id, chat_id, proposer_id, proposer_name, name, cuisine, description, used, created_at
             FROM suggested_dishes
             WHERE chat_id = $1 AND NOT used
             ORDER BY seq ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn add(&self, chat_id: ChatId, suggestion: NewSuggestion) -> Result<SuggestedDish, StoreError> {
        let id = Uuid::new_v4();
        let created_at = sqlx::query_scalar::<_, OffsetDateTime>(
            "INSERT INTO suggested_dishes (id, chat_id, proposer_id, proposer_name, name, cuisine, description)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING created_at",
        )
        .bind(id)
        .bind(chat_id)
        .bind(suggestion.proposer_id)
        .bind(&suggestion.proposer_name)
        .bind(&suggestion.name)
        .bind(&suggestion.cuisine)
        .bind(&suggestion.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(SuggestedDish {
            id,
            chat_id,
            proposer_id: suggestion.proposer_id,
            proposer_name: suggestion.proposer_name,
            name: suggestion.name,
            cuisine: suggestion.cuisine,
            description: suggestion.description,
            used: false,
            created_at,
        })
    }

    async fn mark_used(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE suggested_dishes SET used = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_unused(&self, chat_id: ChatId) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM suggested_dishes WHERE chat_id = $1 AND NOT used")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
