//! Vote ledger — posted dinner polls and who voted for what.
//!
//! DESIGN
//! ======
//! One record per posted poll. Creating a poll closes any earlier open poll
//! for the same chat, so "the current poll" is simply the latest open one.
//! Poll answers arrive keyed by the transport poll id only; the ledger is
//! what maps them back to a chat.
//!
//! Each voter has at most one answer row per poll. A new answer replaces the
//! old one and an empty answer (a retracted vote) deletes it.

use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::StoreError;
use crate::event::ChatId;
use crate::transport::{MessageId, PostedPoll};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    pub id: Uuid,
    pub chat_id: ChatId,
    pub poll_id: String,
    pub message_id: MessageId,
    pub options: Vec<String>,
    pub open: bool,
}

/// Vote counts per option, in option order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub counts: Vec<(String, usize)>,
    pub voters: usize,
}

impl Tally {
    /// Options with the highest non-zero count.
    #[must_use]
    pub fn leaders(&self) -> Vec<&str> {
        let top = self.counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
        if top == 0 {
            return Vec::new();
        }
        self.counts
            .iter()
            .filter(|(_, n)| *n == top)
            .map(|(option, _)| option.as_str())
            .collect()
    }
}

/// Count answers against the option list. Out-of-range indices are ignored.
#[must_use]
pub fn tally<'a>(options: &[String], answers: impl IntoIterator<Item = &'a [u32]>) -> Tally {
    let mut counts = vec![0_usize; options.len()];
    let mut voters = 0;
    for answer in answers {
        if answer.is_empty() {
            continue;
        }
        voters += 1;
        for &idx in answer {
            if let Some(slot) = usize::try_from(idx).ok().and_then(|i| counts.get_mut(i)) {
                *slot += 1;
            }
        }
    }
    Tally { counts: options.iter().cloned().zip(counts).collect(), voters }
}

#[async_trait::async_trait]
pub trait VoteLedger: Send + Sync {
    /// Record a freshly posted poll, closing the chat's previous one.
    async fn create(&self, chat_id: ChatId, poll: &PostedPoll, options: &[String]) -> Result<VoteRecord, StoreError>;

    /// Which chat a transport poll id belongs to.
    async fn chat_for_poll(&self, poll_id: &str) -> Result<Option<ChatId>, StoreError>;

    /// Store a voter's latest choice. Returns false for unknown polls.
    async fn record_answer(&self, poll_id: &str, voter_id: i64, option_ids: &[u32]) -> Result<bool, StoreError>;

    /// The chat's open poll and its tally, if any.
    async fn current(&self, chat_id: ChatId) -> Result<Option<(VoteRecord, Tally)>, StoreError>;

    /// How many polls the chat has ever had.
    async fn count(&self, chat_id: ChatId) -> Result<i64, StoreError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

pub struct PgVoteLedger {
    pool: PgPool,
}

impl PgVoteLedger {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl VoteLedger for PgVoteLedger {
    async fn create(&self, chat_id: ChatId, poll: &PostedPoll, options: &[String]) -> Result<VoteRecord, StoreError> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE votes SET open = FALSE WHERE chat_id = $1 AND open")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO votes (id, chat_id, poll_id, message_id, options) VALUES ($1, $2, $3, $4, $5)")
            .bind(id)
            .bind(chat_id)
            .bind(&poll.poll_id)
            .bind(poll.message_id)
            .bind(options)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(VoteRecord {
            id,
            chat_id,
            poll_id: poll.poll_id.clone(),
            message_id: poll.message_id,
            options: options.to_vec(),
            open: true,
        })
    }

    async fn chat_for_poll(&self, poll_id: &str) -> Result<Option<ChatId>, StoreError> {
        let chat_id = sqlx::query_scalar::<_, i64>("SELECT chat_id FROM votes WHERE poll_id = $1")
            .bind(poll_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(chat_id)
    }

    async fn record_answer(&self, poll_id: &str, voter_id: i64, option_ids: &[u32]) -> Result<bool, StoreError> {
        let Some(vote_id) = sqlx::query_scalar::<_, Uuid>("SELECT id FROM votes WHERE poll_id = $1")
            .bind(poll_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(false);
        };

        if option_ids.is_empty() {
            sqlx::query("DELETE FROM vote_answers WHERE vote_id = $1 AND user_id = $2")
                .bind(vote_id)
                .bind(voter_id)
                .execute(&self.pool)
                .await?;
            return Ok(true);
        }

        let option_ids = option_ids
            .iter()
            .map(|&i| i32::try_from(i).map_err(|_| StoreError::Corrupt(format!("option index {i} out of range"))))
            .collect::<Result<Vec<i32>, _>>()?;
        sqlx::query(
            "INSERT INTO vote_answers (vote_id, user_id, option_ids) VALUES ($1, $2, $3)
             ON CONFLICT (vote_id, user_id) DO UPDATE SET option_ids = EXCLUDED.option_ids, updated_at = now()",
        )
        .bind(vote_id)
        .bind(voter_id)
        .bind(&option_ids)
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    async fn current(&self, chat_id: ChatId) -> Result<Option<(VoteRecord, Tally)>, StoreError> {
        let Some((id, poll_id, message_id, options)) = sqlx::query_as::<_, (Uuid, String, i64, Vec<String>)>(
            "SELECT id, poll_id, message_id, options FROM votes
             WHERE chat_id = $1 AND open
             ORDER BY seq DESC
             LIMIT 1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, (i64, Vec<i32>)>("SELECT user_id, option_ids FROM vote_answers WHERE vote_id = $1")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        let answers: HashMap<i64, Vec<u32>> = rows
            .into_iter()
            .map(|(user, ids)| (user, ids.into_iter().filter_map(|i| u32::try_from(i).ok()).collect()))
            .collect();

        let tally = tally(&options, answers.values().map(Vec::as_slice));
        let record = VoteRecord { id, chat_id, poll_id, message_id, options, open: true };
        Ok(Some((record, tally)))
    }

    async fn count(&self, chat_id: ChatId) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM votes WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
