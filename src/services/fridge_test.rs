use super::*;
use crate::services::memory::MemoryStore;

fn item(name: &str, quantity: &str) -> Ingredient {
    Ingredient { name: name.into(), quantity: quantity.into() }
}

#[test]
fn render_sorts_by_name_case_sensitively() {
    let text = render_fridge(&[item("tomato", ""), item("Milk", "1 l"), item("Eggs", "")]);
    assert_eq!(text, "Your fridge:\n• Eggs\n• Milk (1 l)\n• tomato");
}

#[test]
fn render_empty_fridge_points_at_commands() {
    let text = render_fridge(&[]);
    assert!(text.contains("empty"));
    assert!(text.contains("/sync_fridge"));
}

#[tokio::test]
async fn upsert_is_idempotent_on_name() {
    let store = MemoryStore::new();
    store.upsert(1, "Eggs", "6").await.unwrap();
    store.upsert(1, "Eggs", "12").await.unwrap();

    let items = store.list(1).await.unwrap();
    assert_eq!(items, vec![item("Eggs", "12")]);
}

#[tokio::test]
async fn names_are_case_sensitive_keys() {
    let store = MemoryStore::new();
    add_all(&store, 1, &["Eggs".into(), "eggs".into()]).await;
    assert_eq!(store.fridge_names(1), vec!["Eggs", "eggs"]);
}

#[tokio::test]
async fn add_all_reports_stored_items_and_keeps_going() {
    let store = MemoryStore::new();
    let added = add_all(&store, 1, &["Milk".into(), "Butter".into()]).await;
    assert_eq!(added.stored, vec!["Milk", "Butter"]);
    assert!(added.failed.is_empty());
    assert_eq!(store.fridge_item(1, "Milk").as_deref(), Some(""));

    store.fail_upserts_of("Flour");
    let added = add_all(&store, 1, &["Flour".into(), "Sugar".into()]).await;
    assert_eq!(added, Added { stored: vec!["Sugar".into()], failed: vec!["Flour".into()] });
    assert_eq!(store.fridge_names(1), vec!["Butter", "Milk", "Sugar"]);

    store.set_fail_writes(true);
    assert!(add_all(&store, 1, &["Bread".into()]).await.stored.is_empty());
}

#[tokio::test]
async fn clear_only_touches_one_chat() {
    let store = MemoryStore::new();
    store.seed_fridge(1, &["Milk"]);
    store.seed_fridge(2, &["Rice"]);
    IngredientStore::clear(&store, 1).await.unwrap();
    assert!(store.fridge_names(1).is_empty());
    assert_eq!(store.fridge_names(2), vec!["Rice"]);
}
