//! Ingredient store — what is in each chat's fridge.
//!
//! DESIGN
//! ======
//! `(chat_id, name)` is the natural key and names are stored exactly as
//! received, so "Eggs" and "eggs" are distinct entries. Re-adding a name
//! overwrites its quantity. The only removal is a whole-chat reset.
//!
//! ERROR HANDLING
//! ==============
//! [`add_all`] is fire-and-forget per item: a failed upsert is logged and
//! the loop moves on. Callers learn which names were stored and which were
//! not.

use sqlx::PgPool;
use tracing::warn;

use crate::db::StoreError;
use crate::error::ErrorCode;
use crate::event::ChatId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingredient {
    pub name: String,
    /// Free text; empty when unknown.
    pub quantity: String,
}

#[async_trait::async_trait]
pub trait IngredientStore: Send + Sync {
    async fn list(&self, chat_id: ChatId) -> Result<Vec<Ingredient>, StoreError>;
    async fn upsert(&self, chat_id: ChatId, name: &str, quantity: &str) -> Result<(), StoreError>;
    async fn clear(&self, chat_id: ChatId) -> Result<(), StoreError>;
}

/// Outcome of [`add_all`], names in input order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Added {
    pub stored: Vec<String>,
    pub failed: Vec<String>,
}

/// Upsert every name with an empty quantity.
pub async fn add_all(store: &dyn IngredientStore, chat_id: ChatId, names: &[String]) -> Added {
    let mut added = Added::default();
    for name in names {
        match store.upsert(chat_id, name, "").await {
            Ok(()) => added.stored.push(name.clone()),
            Err(e) => {
                warn!(%chat_id, ingredient = %name, error = %e, code = e.error_code(), "ingredient upsert failed");
                added.failed.push(name.clone());
            }
        }
    }
    added
}

/// Fridge listing sorted by name (byte order), one item per line.
#[must_use]
pub fn render_fridge(items: &[Ingredient]) -> String {
    if items.is_empty() {
        return "Your fridge is empty. Use /sync_fridge to add ingredients or /add_photo to snap a picture.".into();
    }
    let mut sorted: Vec<&Ingredient> = items.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::from("Your fridge:\n");
    for item in sorted {
        out.push_str("• ");
        out.push_str(&item.name);
        if !item.quantity.is_empty() {
            out.push_str(" (");
            out.push_str(&item.quantity);
            out.push(')');
        }
        out.push('\n');
    }
    out.truncate(out.trim_end().len());
    out
}

/// Ingredient names only, in store order.
#[must_use]
pub fn names(items: &[Ingredient]) -> Vec<String> {
    items.iter().map(|i| i.name.clone()).collect()
}

// =============================================================================
// POSTGRES
// =============================================================================

pub struct PgIngredientStore {
    pool: PgPool,
}

impl PgIngredientStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IngredientStore for PgIngredientStore {
    async fn list(&self, chat_id: ChatId) -> Result<Vec<Ingredient>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT name, quantity FROM ingredients WHERE chat_id = $1 ORDER BY name COLLATE \"C\"",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, quantity)| Ingredient { name, quantity })
            .collect())
    }

    async fn upsert(&self, chat_id: ChatId, name: &str, quantity: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO ingredients (chat_id, name, quantity) VALUES ($1, $2, $3)
             ON CONFLICT (chat_id, name) DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = now()",
        )
        .bind(chat_id)
        .bind(name)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self, chat_id: ChatId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM ingredients WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "fridge_test.rs"]
mod tests;
