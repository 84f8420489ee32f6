mod common;

use common::Bank;
use contentbank_model::{
    CacheInvalidator, DeleteOutcome, EntityId, Error, MergeOptions, MergePhase, SafeDelete,
};
use contentbank_store::{CascadingDelete, EpochCache, SqliteAuditLog};
use pretty_assertions::assert_eq;
use rusqlite::Connection;
use std::sync::Arc;

const ADVANCED: MergeOptions = MergeOptions {
    advanced_discovery: true,
};

#[test]
fn merge_rewrites_references_and_deletes_duplicates() {
    let bank = Bank::new();
    let (a, a_entity) = bank.duplicate();
    let (b, b_entity) = bank.duplicate();
    let (c, c_entity) = bank.duplicate();
    bank.attempts(b_entity, 5);
    bank.store.add_slot(1, 1, a_entity).unwrap();
    bank.store.add_slot(1, 2, c_entity).unwrap();
    bank.store.add_slot(2, 1, b_entity).unwrap();
    bank.reference(a, 1, None);
    bank.reference(c, 2, None);

    let engine = bank.engine();
    let options = MergeOptions::default();
    let plan = engine.build_merge_plan(a_entity, &options);
    let outcome = engine.apply_merge_plan(&plan, &options);

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.phase, MergePhase::Committed);
    assert_eq!(outcome.message, format!("merged 2 entries into entry {b}"));
    assert_eq!(outcome.details.deleted, vec![a_entity, c_entity]);
    assert_eq!(outcome.details.updated["assembly_slots.entity_id"], 2);
    assert_eq!(outcome.details.updated["entry_references.entry_id"], 2);

    for entry in [a, c] {
        assert!(!bank.entry_exists(entry));
        assert_eq!(bank.count("assembly_slots", "entry_id", entry), 0);
        assert_eq!(bank.count("entry_references", "entry_id", entry), 0);
    }
    for entity in [a_entity, c_entity] {
        assert!(!bank.entity_exists(entity));
        assert_eq!(bank.count("versions", "entity_id", entity), 0);
    }
    assert!(bank.entry_exists(b));
    assert_eq!(bank.count("assembly_slots", "entity_id", b_entity), 3);
    assert_eq!(bank.count("assembly_slots", "entry_id", b), 3);
    assert_eq!(bank.count("entry_references", "entry_id", b), 2);
    assert_eq!(bank.count("attempts", "entity_id", b_entity), 5);
}

#[test]
fn reference_row_duplicating_an_existing_usage_is_dropped() {
    let bank = Bank::new();
    let (seven, rep) = bank.duplicate_with_id(7);
    let (ten, _) = bank.duplicate_with_id(10);
    let kept = bank.reference(seven, 5, None);
    bank.reference(ten, 5, None);

    let outcome = bank.engine().merge(rep, &MergeOptions::default());

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(bank.count("entry_references", "item_id", 5), 1);
    assert_eq!(bank.count("entry_references", "id", kept), 1);
    assert_eq!(bank.count("entry_references", "entry_id", ten), 0);
}

#[test]
fn moved_reference_loses_its_version_pin() {
    let bank = Bank::new();
    let (_, rep) = bank.duplicate();
    let (b, _) = bank.duplicate();
    let moved = bank.reference(b, 1, Some(1));

    let outcome = bank.engine().merge(rep, &MergeOptions::default());

    assert!(outcome.success, "{}", outcome.message);
    let pinned = bank.query_i64(&format!(
        "SELECT COUNT(*) FROM entry_references WHERE id = {moved} AND pinned_version IS NULL"
    ));
    assert_eq!(pinned, 1);
}

#[test]
fn leftover_reference_rolls_everything_back() {
    let bank = Bank::new();
    bank.exec(
        "CREATE TABLE legacy_usage (id INTEGER PRIMARY KEY, entity_id INTEGER);
         CREATE TRIGGER legacy_usage_frozen BEFORE UPDATE ON legacy_usage
         BEGIN SELECT RAISE(ABORT, 'read only'); END;",
    );
    let (_, a_entity) = bank.duplicate();
    let (b, b_entity) = bank.duplicate();
    bank.store.add_slot(1, 1, b_entity).unwrap();
    bank.exec_params(
        "INSERT INTO legacy_usage (entity_id) VALUES (?1)",
        [b_entity],
    );

    let engine = bank.engine();
    let plan = engine.build_merge_plan(a_entity, &ADVANCED);
    let outcome = engine.apply_merge_plan(&plan, &ADVANCED);

    assert!(!outcome.success);
    assert_eq!(outcome.phase, MergePhase::RolledBack);
    assert!(
        outcome.message.contains("during post-check"),
        "{}",
        outcome.message
    );
    assert!(outcome.message.contains("legacy_usage.entity_id"));
    assert!(bank.entity_exists(b_entity));
    assert!(bank.entry_exists(b));
    assert_eq!(bank.count("assembly_slots", "entity_id", b_entity), 1);
    assert_eq!(bank.count("assembly_slots", "entity_id", a_entity), 0);
}

#[test]
fn row_inserted_after_planning_is_still_rewritten() {
    let bank = Bank::new();
    let (_, a_entity) = bank.duplicate();
    let (_, b_entity) = bank.duplicate();

    let engine = bank.engine();
    let plan = engine.build_merge_plan(a_entity, &MergeOptions::default());
    assert_eq!(plan.total_impact(), 0);
    bank.store.add_slot(9, 1, b_entity).unwrap();

    let outcome = engine.apply_merge_plan(&plan, &MergeOptions::default());
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(bank.count("assembly_slots", "entity_id", a_entity), 1);
    assert!(!bank.entity_exists(b_entity));
}

#[test]
fn second_apply_is_a_no_op() {
    let bank = Bank::new();
    let (_, a_entity) = bank.duplicate();
    let (_, b_entity) = bank.duplicate();
    bank.store.add_slot(1, 1, b_entity).unwrap();

    let engine = bank.engine();
    let options = MergeOptions::default();
    let plan = engine.build_merge_plan(a_entity, &options);
    assert!(engine.apply_merge_plan(&plan, &options).success);

    let again = engine.apply_merge_plan(&plan, &options);
    assert!(again.success, "{}", again.message);
    assert_eq!(again.message, "nothing changed: the duplicates were already merged");
    assert!(again.details.deleted.is_empty());
    assert_eq!(bank.count("assembly_slots", "entity_id", a_entity), 1);

    let conn = bank.store.connection();
    let conn = conn.lock().unwrap();
    assert_eq!(SqliteAuditLog.count(&conn).unwrap(), 1);
}

#[test]
fn rebuilt_plan_after_merge_finds_no_group() {
    let bank = Bank::new();
    let (_, a_entity) = bank.duplicate();
    bank.duplicate();

    let engine = bank.engine();
    assert!(engine.merge(a_entity, &MergeOptions::default()).success);

    let plan = engine.build_merge_plan(a_entity, &MergeOptions::default());
    assert!(plan.has_errors());
    let outcome = engine.apply_merge_plan(&plan, &MergeOptions::default());
    assert!(!outcome.success);
    assert_eq!(outcome.phase, MergePhase::Idle);
    assert!(outcome.message.starts_with("plan has errors"));
}

#[test]
fn attempts_recorded_after_planning_abort_the_merge() {
    let bank = Bank::new();
    let (_, a_entity) = bank.duplicate();
    let (b, b_entity) = bank.duplicate();
    bank.store.add_slot(1, 1, b_entity).unwrap();

    let engine = bank.engine();
    let plan = engine.build_merge_plan(a_entity, &MergeOptions::default());
    bank.attempts(b_entity, 1);

    let outcome = engine.apply_merge_plan(&plan, &MergeOptions::default());
    assert!(!outcome.success);
    assert_eq!(outcome.phase, MergePhase::RolledBack);
    assert!(
        outcome
            .message
            .contains(&format!("entry {b} now has 1 attempt records")),
        "{}",
        outcome.message
    );
    assert!(bank.entity_exists(b_entity));
    assert_eq!(bank.count("assembly_slots", "entity_id", b_entity), 1);
}

struct RefusingDelete;

impl SafeDelete for RefusingDelete {
    fn delete(&self, _conn: &Connection, entity_id: EntityId) -> contentbank_model::Result<DeleteOutcome> {
        Err(Error::InUse(format!("entity {entity_id} is locked by an editor")))
    }
}

#[test]
fn delete_failure_rolls_back_rewrites() {
    let bank = Bank::new();
    let (_, a_entity) = bank.duplicate();
    let (b, b_entity) = bank.duplicate();
    bank.store.add_slot(1, 1, b_entity).unwrap();
    bank.reference(b, 1, Some(1));

    let engine = bank.engine().with_safe_delete(Arc::new(RefusingDelete));
    let outcome = engine.merge(a_entity, &MergeOptions::default());

    assert!(!outcome.success);
    assert!(outcome.message.contains("during deleting"), "{}", outcome.message);
    assert!(outcome.message.contains("locked by an editor"));
    assert_eq!(bank.count("assembly_slots", "entity_id", b_entity), 1);
    assert_eq!(bank.count("entry_references", "entry_id", b), 1);
    assert_eq!(bank.count("entry_references", "pinned_version", 1), 1);
}

/// Deletes normally after the first call, which reports the entity already gone.
struct HalfDoneDelete;

impl SafeDelete for HalfDoneDelete {
    fn delete(&self, conn: &Connection, entity_id: EntityId) -> contentbank_model::Result<DeleteOutcome> {
        CascadingDelete.delete(conn, entity_id)?;
        Ok(DeleteOutcome::AlreadyAbsent)
    }
}

#[test]
fn already_absent_entities_are_not_reported_deleted() {
    let bank = Bank::new();
    let (_, a_entity) = bank.duplicate();
    let (_, b_entity) = bank.duplicate();
    bank.store.add_slot(1, 1, b_entity).unwrap();

    let engine = bank.engine().with_safe_delete(Arc::new(HalfDoneDelete));
    let outcome = engine.merge(a_entity, &MergeOptions::default());

    assert!(outcome.success, "{}", outcome.message);
    assert!(outcome.details.deleted.is_empty());
    assert!(!bank.entity_exists(b_entity));
}

#[test]
fn reference_table_failure_is_fatal() {
    let bank = Bank::new();
    bank.exec(
        "CREATE TRIGGER references_frozen BEFORE UPDATE ON entry_references
         BEGIN SELECT RAISE(ABORT, 'references frozen'); END;",
    );
    let (_, a_entity) = bank.duplicate();
    let (b, b_entity) = bank.duplicate();
    bank.store.add_slot(1, 1, b_entity).unwrap();
    bank.reference(b, 1, None);

    let outcome = bank.engine().merge(a_entity, &MergeOptions::default());

    assert!(!outcome.success);
    assert!(outcome.message.contains("during rewriting"), "{}", outcome.message);
    assert!(outcome.message.contains("entry_references.entry_id"));
    assert_eq!(bank.count("assembly_slots", "entity_id", b_entity), 1);
    assert!(bank.entity_exists(b_entity));
}

#[test]
fn frozen_table_without_matches_does_not_block_merge() {
    let bank = Bank::new();
    bank.exec(
        "CREATE TABLE legacy_usage (id INTEGER PRIMARY KEY, entity_id INTEGER);
         CREATE TRIGGER legacy_usage_frozen BEFORE UPDATE ON legacy_usage
         BEGIN SELECT RAISE(ABORT, 'read only'); END;",
    );
    let (_, a_entity) = bank.duplicate();
    let (_, b_entity) = bank.duplicate();
    bank.store.add_slot(1, 1, b_entity).unwrap();

    let outcome = bank.engine().merge(a_entity, &ADVANCED);

    // No legacy_usage row points at the merged entity, so the UPDATE touches
    // nothing and the trigger never fires.
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.details.updated["legacy_usage.entity_id"], 0);
}

#[test]
fn advanced_discovery_rewrites_unlisted_tables() {
    let bank = Bank::new();
    bank.exec(
        "CREATE TABLE quiz_feedback (id INTEGER PRIMARY KEY, entity_id INTEGER, entry_id INTEGER);
         CREATE TABLE lesson_references (
             id INTEGER PRIMARY KEY,
             context_id INTEGER, component TEXT, area TEXT, item_id INTEGER,
             entry_id INTEGER, pinned_version INTEGER
         );",
    );
    let (a, a_entity) = bank.duplicate();
    let (b, b_entity) = bank.duplicate();
    bank.exec_params(
        "INSERT INTO quiz_feedback (entity_id, entry_id) VALUES (?1, ?2)",
        rusqlite::params![b_entity, b],
    );
    bank.exec_params(
        "INSERT INTO lesson_references (context_id, component, area, item_id, entry_id, pinned_version)
         VALUES (1, 'lesson', 'page', 1, ?1, 3), (1, 'lesson', 'page', 1, ?2, NULL)",
        rusqlite::params![a, b],
    );

    let outcome = bank.engine().merge(a_entity, &ADVANCED);

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(bank.count("quiz_feedback", "entity_id", a_entity), 1);
    assert_eq!(bank.count("quiz_feedback", "entry_id", a), 1);
    assert_eq!(bank.count("lesson_references", "entry_id", a), 1);
    assert_eq!(bank.count("lesson_references", "pinned_version", 3), 1);
    assert_eq!(bank.count("lesson_references", "entry_id", b), 0);
}

#[test]
fn whitelist_only_merge_ignores_unlisted_tables() {
    let bank = Bank::new();
    bank.exec("CREATE TABLE quiz_feedback (id INTEGER PRIMARY KEY, entity_id INTEGER);");
    let (_, a_entity) = bank.duplicate();
    let (_, b_entity) = bank.duplicate();
    bank.exec_params("INSERT INTO quiz_feedback (entity_id) VALUES (?1)", [b_entity]);

    let outcome = bank.engine().merge(a_entity, &MergeOptions::default());

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(bank.count("quiz_feedback", "entity_id", b_entity), 1);
}

#[test]
fn successful_merge_is_audited_and_purges_cache() {
    let bank = Bank::new();
    let (a, a_entity) = bank.duplicate();
    let (b, b_entity) = bank.duplicate();
    bank.store.add_slot(1, 1, b_entity).unwrap();

    let cache = Arc::new(EpochCache::new());
    let seen = cache.epoch();
    let engine = bank
        .engine()
        .with_cache(Arc::clone(&cache) as Arc<dyn CacheInvalidator>);
    let outcome = engine.merge(a_entity, &MergeOptions::default());
    assert!(outcome.success, "{}", outcome.message);
    assert!(!cache.is_current(seen));

    let conn = bank.store.connection();
    let conn = conn.lock().unwrap();
    let events = SqliteAuditLog.recent(&conn, 10).unwrap();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.canonical_entry_id, a);
    assert_eq!(event.canonical_entity_id, a_entity);
    assert_eq!(event.merged_entry_ids, vec![b]);
    assert_eq!(event.deleted_entity_ids, vec![b_entity]);
    assert_eq!(event.updated["assembly_slots.entity_id"], 1);
    assert!(!event.event_id.is_empty());
}

#[test]
fn failed_merge_leaves_cache_and_audit_alone() {
    let bank = Bank::new();
    let (_, a_entity) = bank.duplicate();
    let (_, b_entity) = bank.duplicate();
    bank.store.add_slot(1, 1, b_entity).unwrap();

    let cache = Arc::new(EpochCache::new());
    let seen = cache.epoch();
    let engine = bank
        .engine()
        .with_cache(Arc::clone(&cache) as Arc<dyn CacheInvalidator>)
        .with_safe_delete(Arc::new(RefusingDelete));
    assert!(!engine.merge(a_entity, &MergeOptions::default()).success);

    assert!(cache.is_current(seen));
    let conn = bank.store.connection();
    let conn = conn.lock().unwrap();
    assert_eq!(SqliteAuditLog.count(&conn).unwrap(), 0);
}

#[test]
fn blocklisted_whitelist_entries_are_ignored() {
    let bank = Bank::new();
    let mut config = contentbank_merge::MergeConfig::default();
    config.whitelist.push(contentbank_merge::WhitelistEntry {
        table: "attempts".into(),
        role: Default::default(),
        columns: vec![contentbank_merge::WhitelistColumn::new(
            "entity_id",
            contentbank_model::TargetKind::Entity,
        )],
    });
    let (_, a_entity) = bank.duplicate();
    bank.duplicate();

    let engine = contentbank_merge::MergeEngine::new(&bank.store, config);
    let plan = engine.build_merge_plan(a_entity, &MergeOptions::default());
    assert!(!plan.targets.iter().any(|t| t.table == "attempts"));
    assert!(engine.apply_merge_plan(&plan, &MergeOptions::default()).success);
}

#[test]
fn vanished_canonical_aborts_before_rewriting() {
    let bank = Bank::new();
    let (a, a_entity) = bank.duplicate();
    let (b, b_entity) = bank.duplicate();
    bank.store.add_slot(1, 1, b_entity).unwrap();
    bank.reference(b, 1, None);

    let engine = bank.engine();
    let plan = engine.build_merge_plan(a_entity, &MergeOptions::default());
    assert_eq!(plan.canonical_entry_id, Some(a));
    {
        let conn = bank.store.connection();
        let conn = conn.lock().unwrap();
        CascadingDelete.delete(&conn, a_entity).unwrap();
    }

    let outcome = engine.apply_merge_plan(&plan, &MergeOptions::default());

    assert!(!outcome.success);
    assert_eq!(outcome.phase, MergePhase::RolledBack);
    assert!(
        outcome
            .message
            .contains(&format!("canonical entry {a} no longer exists")),
        "{}",
        outcome.message
    );
    assert!(bank.entity_exists(b_entity));
    assert!(bank.entry_exists(b));
    assert_eq!(bank.count("assembly_slots", "entity_id", b_entity), 1);
    assert_eq!(bank.count("assembly_slots", "entity_id", a_entity), 0);
    assert_eq!(bank.count("entry_references", "entry_id", b), 1);
    assert_eq!(bank.count("entry_references", "entry_id", a), 0);
}

#[test]
fn replaced_canonical_version_aborts() {
    let bank = Bank::new();
    let (a, a_entity) = bank.duplicate();
    let (_, b_entity) = bank.duplicate();
    bank.store.add_slot(1, 1, b_entity).unwrap();

    let engine = bank.engine();
    let plan = engine.build_merge_plan(a_entity, &MergeOptions::default());
    let canonical_version = plan.canonical().unwrap().version_id;
    bank.exec_params(
        "DELETE FROM versions WHERE id = ?1",
        [canonical_version],
    );
    bank.store
        .add_version(a, &common::question(), contentbank_model::VersionStatus::Ready)
        .unwrap();

    let outcome = engine.apply_merge_plan(&plan, &MergeOptions::default());

    assert!(!outcome.success);
    assert!(
        outcome
            .message
            .contains(&format!("canonical version {canonical_version} no longer exists")),
        "{}",
        outcome.message
    );
    assert!(bank.entity_exists(b_entity));
    assert_eq!(bank.count("assembly_slots", "entity_id", b_entity), 1);
}
