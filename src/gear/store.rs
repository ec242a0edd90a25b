//! Persistent CRUD over the gear closet
//!
//! The whole collection lives in one JSON array under `gear-closet`. Every
//! operation re-reads that document, so callers always work from a fresh
//! snapshot and never need to invalidate anything.
//!
//! Read-modify-write sequences are not transactional. Two writers racing on
//! the same backend (e.g. two `create` calls interleaved between their read
//! and their write) can lose one update. The store assumes a single logical
//! writer per backend.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{GearId, GearItem, GearPatch, NewGear};
use crate::clock::Clock;
use crate::storage::{set_json, StorageBackend, StorageError};

/// Storage key holding the closet document
pub const CLOSET_KEY: &str = "gear-closet";

/// Owner of the canonical gear collection
#[derive(Clone)]
pub struct GearStore {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
}

impl GearStore {
    pub fn new(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Returns a snapshot of every stored item
    ///
    /// A missing or unreadable document yields an empty list; the next write
    /// replaces it with a valid one. Inside a readable array, elements that
    /// are not gear items are skipped and the rest are kept.
    pub fn list(&self) -> Vec<GearItem> {
        let Some(raw) = self.backend.get(CLOSET_KEY) else {
            return Vec::new();
        };

        let elements = match serde_json::from_str::<Option<Vec<serde_json::Value>>>(&raw) {
            Ok(elements) => elements.unwrap_or_default(),
            Err(e) => {
                warn!(key = CLOSET_KEY, error = %e, "Closet document is malformed, treating as empty");
                return Vec::new();
            }
        };

        elements
            .into_iter()
            .enumerate()
            .filter_map(|(index, element)| match serde_json::from_value(element) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(key = CLOSET_KEY, index, error = %e, "Skipping unreadable gear item");
                    None
                }
            })
            .collect()
    }

    /// Looks up a single item
    pub fn get(&self, id: GearId) -> Option<GearItem> {
        self.list().into_iter().find(|item| item.id == id)
    }

    /// Adds a new item and returns it as stored
    pub fn create(&self, new: NewGear) -> Result<GearItem, StorageError> {
        let mut items = self.list();
        let now = self.clock.now();

        let item = GearItem {
            id: next_id(&items, now.timestamp_millis()),
            name: new.name,
            brand: new.brand,
            category: new.category,
            weight: super::sanitize_weight(new.weight),
            packed: new.packed,
            condition: new.condition,
            added_at: Some(now.to_rfc3339()),
            source: new.source,
        };

        items.push(item.clone());
        self.persist(&items)?;

        info!(id = %item.id, name = %item.name, "Added gear item");
        Ok(item)
    }

    /// Removes every item with `id`
    ///
    /// Returns whether anything was removed. Removing an unknown id leaves the
    /// stored document untouched.
    pub fn remove(&self, id: GearId) -> Result<bool, StorageError> {
        let mut items = self.list();
        let before = items.len();
        items.retain(|item| item.id != id);

        if items.len() == before {
            debug!(%id, "Remove ignored, no such item");
            return Ok(false);
        }

        self.persist(&items)?;
        info!(%id, "Removed gear item");
        Ok(true)
    }

    /// Shallow-merges `patch` into the item with `id`
    ///
    /// Returns the updated item, or `None` (without writing) if it does not exist.
    pub fn update(&self, id: GearId, patch: &GearPatch) -> Result<Option<GearItem>, StorageError> {
        let mut items = self.list();
        let Some(item) = items.iter_mut().find(|item| item.id == id) else {
            debug!(%id, "Update ignored, no such item");
            return Ok(None);
        };

        patch.apply_to(item);
        let updated = item.clone();
        self.persist(&items)?;
        Ok(Some(updated))
    }

    /// Marks an item packed or unpacked
    pub fn set_packed(&self, id: GearId, packed: bool) -> Result<Option<GearItem>, StorageError> {
        self.update(id, &GearPatch::packed(packed))
    }

    /// Destroys the whole collection
    pub fn clear(&self) -> Result<(), StorageError> {
        self.backend.remove(CLOSET_KEY)?;
        info!("Cleared gear closet");
        Ok(())
    }

    fn persist(&self, items: &[GearItem]) -> Result<(), StorageError> {
        set_json(self.backend.as_ref(), CLOSET_KEY, items)
    }
}

/// Picks a time-derived id that is unique within `items`
///
/// Uses the current epoch milliseconds unless an existing id is already at or
/// past it, in which case the id after the largest existing one is taken.
fn next_id(items: &[GearItem], now_millis: i64) -> GearId {
    let now = u64::try_from(now_millis).unwrap_or(0);
    let after_largest = items
        .iter()
        .map(|item| item.id.0.saturating_add(1))
        .max()
        .unwrap_or(0);
    GearId(now.max(after_largest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStorage;

    const START_MILLIS: i64 = 1_767_225_600_000;

    fn create_test_store() -> (GearStore, Arc<MemoryStorage>, Arc<ManualClock>) {
        let backend = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::at_millis(START_MILLIS));
        let store = GearStore::new(backend.clone(), clock.clone());
        (store, backend, clock)
    }

    fn tent() -> NewGear {
        NewGear {
            name: "Hubba Hubba".to_string(),
            brand: "MSR".to_string(),
            category: Some("Tents".to_string()),
            weight: 1500.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_list_is_empty_without_document() {
        let (store, _, _) = create_test_store();
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_list_is_empty_for_malformed_document() {
        let (store, backend, _) = create_test_store();
        backend.set(CLOSET_KEY, "{not json").expect("set");
        assert!(store.list().is_empty());

        backend.set(CLOSET_KEY, "null").expect("set");
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_unreadable_element_does_not_hide_the_rest() {
        let (store, backend, _) = create_test_store();
        backend
            .set(
                CLOSET_KEY,
                r#"[{"id":1,"name":"Tent"},{"id":2,"name":"Bag"},{"name":"no id"},{"id":3,"name":null}]"#,
            )
            .expect("set");

        let names: Vec<String> = store.list().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["Tent", "Bag"]);

        store.create(tent()).expect("create");

        let raw = backend.get(CLOSET_KEY).expect("document written");
        let persisted: Vec<GearItem> = serde_json::from_str(&raw).expect("valid document");
        let ids: Vec<GearId> = persisted.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![GearId(1), GearId(2), GearId(START_MILLIS as u64)]);
    }

    #[test]
    fn test_create_assigns_id_and_grows_list_by_one() {
        let (store, _, _) = create_test_store();
        let before = store.list().len();

        let item = store.create(tent()).expect("create");

        assert_eq!(item.id, GearId(START_MILLIS as u64));
        assert!(item.added_at.is_some());
        assert_eq!(store.list().len(), before + 1);
        assert_eq!(store.get(item.id), Some(item));
    }

    #[test]
    fn test_create_in_same_tick_never_collides() {
        let (store, _, _) = create_test_store();

        let first = store.create(tent()).expect("create");
        let second = store.create(tent()).expect("create");
        let third = store.create(tent()).expect("create");

        assert_ne!(first.id, second.id);
        assert_ne!(second.id, third.id);
        assert_ne!(first.id, third.id);
        assert_eq!(store.list().len(), 3);
    }

    #[test]
    fn test_create_self_heals_corrupt_document() {
        let (store, backend, _) = create_test_store();
        backend.set(CLOSET_KEY, "garbage").expect("set");

        store.create(tent()).expect("create");

        let raw = backend.get(CLOSET_KEY).expect("document written");
        let parsed: Vec<GearItem> = serde_json::from_str(&raw).expect("valid document");
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_remove_twice_second_is_noop() {
        let (store, backend, _) = create_test_store();
        let keep = store.create(tent()).expect("create");
        let gone = store.create(tent()).expect("create");

        assert!(store.remove(gone.id).expect("first remove"));
        let after_first = backend.get(CLOSET_KEY);

        assert!(!store.remove(gone.id).expect("second remove"));
        assert_eq!(backend.get(CLOSET_KEY), after_first);
        assert_eq!(store.list(), vec![keep]);
    }

    #[test]
    fn test_remove_matches_string_ids_from_old_documents() {
        let (store, backend, _) = create_test_store();
        backend
            .set(CLOSET_KEY, r#"[{"id":"42","name":"Spork"},{"id":43,"name":"Mug"}]"#)
            .expect("set");

        let id: GearId = " 42".parse().expect("parse");
        assert!(store.remove(id).expect("remove"));

        let names: Vec<String> = store.list().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["Mug"]);
    }

    #[test]
    fn test_update_merges_patch() {
        let (store, _, _) = create_test_store();
        let item = store.create(tent()).expect("create");

        let updated = store
            .set_packed(item.id, true)
            .expect("update")
            .expect("item exists");

        assert!(updated.packed);
        assert_eq!(updated.name, item.name);
        assert!(store.get(item.id).expect("stored").packed);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let (store, backend, _) = create_test_store();
        store.create(tent()).expect("create");
        let before = backend.get(CLOSET_KEY);

        let result = store.set_packed(GearId(1), true).expect("update");

        assert!(result.is_none());
        assert_eq!(backend.get(CLOSET_KEY), before);
    }

    #[test]
    fn test_snapshot_mutation_does_not_persist() {
        let (store, _, _) = create_test_store();
        store.create(tent()).expect("create");

        let mut snapshot = store.list();
        snapshot[0].name = "Changed".to_string();
        snapshot.clear();

        assert_eq!(store.list().len(), 1);
        assert_eq!(store.list()[0].name, "Hubba Hubba");
    }

    #[test]
    fn test_clear_destroys_collection() {
        let (store, backend, _) = create_test_store();
        store.create(tent()).expect("create");

        store.clear().expect("clear");

        assert!(backend.get(CLOSET_KEY).is_none());
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_ids_follow_the_clock_when_it_moves_ahead() {
        let (store, _, clock) = create_test_store();
        store.create(tent()).expect("create");

        clock.advance(chrono::Duration::seconds(10));
        let later = store.create(tent()).expect("create");

        assert_eq!(later.id, GearId(START_MILLIS as u64 + 10_000));
    }
}
