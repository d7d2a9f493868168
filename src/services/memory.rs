//! In-memory implementations of every store trait, for tests.
//!
//! One [`MemoryStore`] backs all four traits so a test can seed fridge,
//! suggestions and votes through a single handle. Reads and writes can be
//! made to fail independently to exercise degraded paths. Mode and fridge
//! writes are logged per chat so tests can assert their relative order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::StoreError;
use crate::event::ChatId;
use crate::services::chat_state::{ChatStateStore, Mode};
use crate::services::fridge::{Ingredient, IngredientStore};
use crate::services::suggestions::{NewSuggestion, SuggestedDish, SuggestionPool};
use crate::services::votes::{Tally, VoteLedger, VoteRecord, tally};
use crate::transport::PostedPoll;

#[derive(Default)]
struct Inner {
    modes: HashMap<ChatId, Mode>,
    fridges: HashMap<ChatId, BTreeMap<String, String>>,
    suggestions: Vec<SuggestedDish>,
    votes: Vec<VoteRecord>,
    answers: HashMap<Uuid, BTreeMap<i64, Vec<u32>>>,
    /// Every mode written, in order, per chat.
    mode_history: HashMap<ChatId, Vec<Mode>>,
    /// Mode and fridge writes, in order, per chat.
    ops: HashMap<ChatId, Vec<StoreOp>>,
    /// Ingredient names whose upsert fails.
    failing_names: HashSet<String>,
}

/// A successful write, as recorded in [`MemoryStore::ops`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    SetMode(Mode),
    Upsert(String),
    ClearFridge,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

fn injected() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_check(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) { Err(injected()) } else { Ok(()) }
    }

    fn write_check(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) { Err(injected()) } else { Ok(()) }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every upsert of `name` fail.
    pub fn fail_upserts_of(&self, name: &str) {
        self.lock().failing_names.insert(name.to_string());
    }

    // ----- seeding and inspection -----

    pub fn seed_fridge(&self, chat_id: ChatId, names: &[&str]) {
        let mut inner = self.lock();
        let fridge = inner.fridges.entry(chat_id).or_default();
        for name in names {
            fridge.insert((*name).to_string(), String::new());
        }
    }

    pub fn seed_suggestion(&self, chat_id: ChatId, proposer: &str, name: &str) -> Uuid {
        let dish = SuggestedDish {
            id: Uuid::new_v4(),
            chat_id,
            proposer_id: 1,
            proposer_name: proposer.to_string(),
            name: name.to_string(),
            cuisine: String::new(),
            description: String::new(),
            used: false,
            created_at: OffsetDateTime::now_utc(),
        };
        let id = dish.id;
        self.lock().suggestions.push(dish);
        id
    }

    #[must_use]
    pub fn fridge_names(&self, chat_id: ChatId) -> Vec<String> {
        self.lock()
            .fridges
            .get(&chat_id)
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn fridge_item(&self, chat_id: ChatId, name: &str) -> Option<String> {
        self.lock().fridges.get(&chat_id).and_then(|f| f.get(name).cloned())
    }

    #[must_use]
    pub fn mode(&self, chat_id: ChatId) -> Mode {
        self.lock().modes.get(&chat_id).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn mode_history(&self, chat_id: ChatId) -> Vec<Mode> {
        self.lock().mode_history.get(&chat_id).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn ops(&self, chat_id: ChatId) -> Vec<StoreOp> {
        self.lock().ops.get(&chat_id).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn suggestions(&self, chat_id: ChatId) -> Vec<SuggestedDish> {
        self.lock()
            .suggestions
            .iter()
            .filter(|s| s.chat_id == chat_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn votes(&self, chat_id: ChatId) -> Vec<VoteRecord> {
        self.lock().votes.iter().filter(|v| v.chat_id == chat_id).cloned().collect()
    }

    #[must_use]
    pub fn answers(&self, poll_id: &str) -> BTreeMap<i64, Vec<u32>> {
        let inner = self.lock();
        inner
            .votes
            .iter()
            .find(|v| v.poll_id == poll_id)
            .and_then(|v| inner.answers.get(&v.id).cloned())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ChatStateStore for MemoryStore {
    async fn get(&self, chat_id: ChatId) -> Result<Mode, StoreError> {
        self.read_check()?;
        Ok(self.mode(chat_id))
    }

    async fn set(&self, chat_id: ChatId, mode: Mode) -> Result<(), StoreError> {
        self.write_check()?;
        let mut inner = self.lock();
        inner.modes.insert(chat_id, mode);
        inner.mode_history.entry(chat_id).or_default().push(mode);
        inner.ops.entry(chat_id).or_default().push(StoreOp::SetMode(mode));
        Ok(())
    }

    async fn clear(&self, chat_id: ChatId) -> Result<(), StoreError> {
        self.set(chat_id, Mode::Idle).await
    }
}

#[async_trait::async_trait]
impl IngredientStore for MemoryStore {
    async fn list(&self, chat_id: ChatId) -> Result<Vec<Ingredient>, StoreError> {
        self.read_check()?;
        Ok(self
            .lock()
            .fridges
            .get(&chat_id)
            .map(|f| {
                f.iter()
                    .map(|(name, quantity)| Ingredient { name: name.clone(), quantity: quantity.clone() })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert(&self, chat_id: ChatId, name: &str, quantity: &str) -> Result<(), StoreError> {
        self.write_check()?;
        let mut inner = self.lock();
        if inner.failing_names.contains(name) {
            return Err(injected());
        }
        inner.fridges.entry(chat_id).or_default().insert(name.to_string(), quantity.to_string());
        inner.ops.entry(chat_id).or_default().push(StoreOp::Upsert(name.to_string()));
        Ok(())
    }

    async fn clear(&self, chat_id: ChatId) -> Result<(), StoreError> {
        self.write_check()?;
        let mut inner = self.lock();
        inner.fridges.remove(&chat_id);
        inner.ops.entry(chat_id).or_default().push(StoreOp::ClearFridge);
        Ok(())
    }
}

#[async_trait::async_trait]
impl SuggestionPool for MemoryStore {
    async fn list_unused(&self, chat_id: ChatId) -> Result<Vec<SuggestedDish>, StoreError> {
        self.read_check()?;
        Ok(self
            .lock()
            .suggestions
            .iter()
            .filter(|s| s.chat_id == chat_id && !s.used)
            .cloned()
            .collect())
    }

    async fn add(&self, chat_id: ChatId, suggestion: NewSuggestion) -> Result<SuggestedDish, StoreError> {
        self.write_check()?;
        let dish = SuggestedDish {
            id: Uuid::new_v4(),
            chat_id,
            proposer_id: suggestion.proposer_id,
            proposer_name: suggestion.proposer_name,
            name: suggestion.name,
            cuisine: suggestion.cuisine,
            description: suggestion.description,
            used: false,
            created_at: OffsetDateTime::now_utc(),
        };
        self.lock().suggestions.push(dish.clone());
        Ok(dish)
    }

    async fn mark_used(&self, id: Uuid) -> Result<(), StoreError> {
        self.write_check()?;
        if let Some(dish) = self.lock().suggestions.iter_mut().find(|s| s.id == id) {
            dish.used = true;
        }
        Ok(())
    }

    async fn count_unused(&self, chat_id: ChatId) -> Result<i64, StoreError> {
        let unused = self.list_unused(chat_id).await?;
        Ok(i64::try_from(unused.len()).unwrap_or(i64::MAX))
    }
}

#[async_trait::async_trait]
impl VoteLedger for MemoryStore {
    async fn create(&self, chat_id: ChatId, poll: &PostedPoll, options: &[String]) -> Result<VoteRecord, StoreError> {
        self.write_check()?;
        let mut inner = self.lock();
        for vote in inner.votes.iter_mut().filter(|v| v.chat_id == chat_id) {
            vote.open = false;
        }
        let record = VoteRecord {
            id: Uuid::new_v4(),
            chat_id,
            poll_id: poll.poll_id.clone(),
            message_id: poll.message_id,
            options: options.to_vec(),
            open: true,
        };
        inner.votes.push(record.clone());
        Ok(record)
    }

    async fn chat_for_poll(&self, poll_id: &str) -> Result<Option<ChatId>, StoreError> {
        self.read_check()?;
        Ok(self.lock().votes.iter().find(|v| v.poll_id == poll_id).map(|v| v.chat_id))
    }

    async fn record_answer(&self, poll_id: &str, voter_id: i64, option_ids: &[u32]) -> Result<bool, StoreError> {
        self.write_check()?;
        let mut inner = self.lock();
        let Some(vote_id) = inner.votes.iter().find(|v| v.poll_id == poll_id).map(|v| v.id) else {
            return Ok(false);
        };
        let answers = inner.answers.entry(vote_id).or_default();
        if option_ids.is_empty() {
            answers.remove(&voter_id);
        } else {
            answers.insert(voter_id, option_ids.to_vec());
        }
        Ok(true)
    }

    async fn current(&self, chat_id: ChatId) -> Result<Option<(VoteRecord, Tally)>, StoreError> {
        self.read_check()?;
        let inner = self.lock();
        let Some(record) = inner.votes.iter().rev().find(|v| v.chat_id == chat_id && v.open).cloned() else {
            return Ok(None);
        };
        let empty = BTreeMap::new();
        let answers = inner.answers.get(&record.id).unwrap_or(&empty);
        let tally = tally(&record.options, answers.values().map(Vec::as_slice));
        Ok(Some((record, tally)))
    }

    async fn count(&self, chat_id: ChatId) -> Result<i64, StoreError> {
        self.read_check()?;
        let count = self.lock().votes.iter().filter(|v| v.chat_id == chat_id).count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }
}
