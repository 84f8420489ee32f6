//! Shared fixtures for merge engine tests.

#![allow(dead_code)]

use contentbank_merge::{MergeConfig, MergeEngine};
use contentbank_model::{EntityId, EntryId, VersionStatus};
use contentbank_store::{ContentStore, NewEntity, NewReference};
use rusqlite::params;

/// Routes engine logs to the test harness; set `RUST_LOG` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The payload every duplicate in a test shares.
pub fn question() -> NewEntity {
    NewEntity::html("choice", "Capital", "<p>What is the capital of France?</p>")
}

/// An in-memory content bank with one category.
pub struct Bank {
    pub store: ContentStore,
    pub category: i64,
}

impl Bank {
    pub fn new() -> Self {
        init_tracing();
        let store = ContentStore::open_in_memory().unwrap();
        let category = store.create_category("Default", 1).unwrap();
        Self { store, category }
    }

    pub fn engine(&self) -> MergeEngine {
        MergeEngine::new(&self.store, MergeConfig::default())
    }

    /// A new entry holding one ready copy of [`question`].
    pub fn duplicate(&self) -> (EntryId, EntityId) {
        self.store.create_item(self.category, &question()).unwrap()
    }

    /// Like [`Bank::duplicate`], in another category.
    pub fn duplicate_in(&self, category: i64) -> (EntryId, EntityId) {
        self.store.create_item(category, &question()).unwrap()
    }

    /// A duplicate stored under a fixed entry id.
    pub fn duplicate_with_id(&self, id: i64) -> (EntryId, EntityId) {
        self.exec_params(
            "INSERT INTO entries (id, category_id, context_id) VALUES (?1, ?2, 1)",
            params![id, self.category],
        );
        let entry = EntryId::new(id);
        let (entity, _) = self
            .store
            .add_version(entry, &question(), VersionStatus::Ready)
            .unwrap();
        (entry, entity)
    }

    pub fn attempts(&self, entity: EntityId, n: usize) {
        for _ in 0..n {
            self.store.record_attempt(entity, "right").unwrap();
        }
    }

    pub fn reference(&self, entry: EntryId, item_id: i64, pinned_version: Option<i64>) -> i64 {
        self.store
            .add_reference(&NewReference {
                context_id: 5,
                component: "assembly".into(),
                area: "slot".into(),
                item_id,
                entry_id: entry,
                pinned_version,
            })
            .unwrap()
    }

    pub fn exec(&self, sql: &str) {
        let conn = self.store.connection();
        let conn = conn.lock().unwrap();
        conn.execute_batch(sql).unwrap();
    }

    pub fn exec_params(&self, sql: &str, params: impl rusqlite::Params) {
        let conn = self.store.connection();
        let conn = conn.lock().unwrap();
        conn.execute(sql, params).unwrap();
    }

    pub fn query_i64(&self, sql: &str) -> i64 {
        let conn = self.store.connection();
        let conn = conn.lock().unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    pub fn count(&self, table: &str, column: &str, value: impl Into<i64>) -> u64 {
        self.store.count_where(table, column, value.into()).unwrap()
    }

    pub fn entity_exists(&self, id: EntityId) -> bool {
        self.store.get_entity(id).unwrap().is_some()
    }

    pub fn entry_exists(&self, id: EntryId) -> bool {
        self.store.get_entry(id).unwrap().is_some()
    }
}
