use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{Language, LinkedRecord, LinkedTable, NaturalKey, RecordId};
use crate::registry::TranslationRegistry;
use crate::store::LinkedRecordStore;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl ReconcileReport {
    pub fn writes(&self) -> usize {
        self.inserted + self.updated
    }

    pub fn merge(&mut self, other: ReconcileReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }
}

/// Copies the rows of one parent onto another, matched by natural key.
///
/// Reconciliation only inserts and updates. Rows present on the target but
/// not on the source are kept; removal goes through
/// [`LinkedRecordReconciler::remove_from_translations`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkedRecordReconciler;

impl LinkedRecordReconciler {
    pub fn new() -> Self {
        Self
    }

    pub fn reconcile(
        &self,
        store: &dyn LinkedRecordStore,
        table: LinkedTable,
        source: RecordId,
        target: RecordId,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        if source == target {
            return Ok(report);
        }

        let source_rows = store.query(table, source)?;
        if source_rows.is_empty() {
            debug!("No {} rows on {}, nothing to reconcile", table, source);
            return Ok(report);
        }

        let existing: HashMap<NaturalKey, LinkedRecord> = store
            .query(table, target)?
            .into_iter()
            .map(|row| (row.natural_key.clone(), row))
            .collect();

        for row in source_rows {
            match existing.get(&row.natural_key) {
                None => {
                    let mut copy = row;
                    copy.id = None;
                    copy.parent_id = target;
                    let natural_key = copy.natural_key.clone();
                    let id = store.insert(table, copy)?;
                    debug!("Copied {} row {} to {} as {}", table, natural_key, target, id);
                    report.inserted += 1;
                }
                Some(current) => {
                    let fields = row.mutable_fields();
                    if current.mutable_fields() == fields {
                        report.unchanged += 1;
                        continue;
                    }
                    store.update(table, target, &row.natural_key, &fields)?;
                    debug!(
                        "Updated {} row {} on {} (order {} -> {})",
                        table, row.natural_key, target, current.sort_order, fields.sort_order
                    );
                    report.updated += 1;
                }
            }
        }

        info!(
            "Reconciled {} {} -> {}: {} inserted, {} updated, {} unchanged",
            table, source, target, report.inserted, report.updated, report.unchanged
        );
        Ok(report)
    }

    /// Delete a row from every other translation of `product`.
    ///
    /// `key_for` maps the language of each translation to the natural key of
    /// the row to remove there. Returns the number of rows removed.
    pub fn remove_from_translations<F>(
        &self,
        store: &dyn LinkedRecordStore,
        registry: &dyn TranslationRegistry,
        table: LinkedTable,
        product: RecordId,
        key_for: F,
    ) -> Result<usize>
    where
        F: Fn(&Language) -> NaturalKey,
    {
        let mut removed = 0;
        for (language, translation) in registry.translation_group(product) {
            // The caller removes the row of the edited product itself.
            if translation == product {
                continue;
            }
            let natural_key = key_for(&language);
            let count = store.delete(table, translation, &natural_key)?;
            debug!("Removed {} {} row(s) {} from {}", count, table, natural_key, translation);
            removed += count;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::model::AvailabilityRule;
    use crate::registry::MemoryRegistry;
    use crate::store::{MemoryLinkedStore, MockLinkedRecordStore};
    use std::collections::HashSet;

    const P1: RecordId = RecordId(1);
    const P2: RecordId = RecordId(2);

    fn staff(parent: RecordId, staff_id: u64, order: i64) -> LinkedRecord {
        LinkedRecord::relationship(parent, RecordId(staff_id), order)
    }

    fn sorted_staff(store: &MemoryLinkedStore, parent: RecordId) -> Vec<(String, i64)> {
        let mut rows: Vec<(String, i64)> = store
            .query(LinkedTable::Relationships, parent)
            .unwrap()
            .into_iter()
            .map(|r| (r.natural_key.0, r.sort_order))
            .collect();
        rows.sort();
        rows
    }

    fn scenario() -> MemoryLinkedStore {
        let store = MemoryLinkedStore::new();
        let table = LinkedTable::Relationships;
        store.insert(table, staff(P1, 1, 0)).unwrap();
        store.insert(table, staff(P1, 2, 1)).unwrap();
        store.insert(table, staff(P2, 2, 9)).unwrap();
        store.insert(table, staff(P2, 3, 2)).unwrap();
        store
    }

    #[test]
    fn test_reconcile_inserts_updates_and_keeps_target_only_rows() {
        let store = scenario();
        let report = LinkedRecordReconciler::new()
            .reconcile(&store, LinkedTable::Relationships, P1, P2)
            .unwrap();

        assert_eq!(report, ReconcileReport { inserted: 1, updated: 1, unchanged: 0 });
        assert_eq!(
            sorted_staff(&store, P2),
            vec![
                ("staff:1".to_string(), 0),
                ("staff:2".to_string(), 1),
                ("staff:3".to_string(), 2),
            ]
        );
        // Source untouched.
        assert_eq!(sorted_staff(&store, P1).len(), 2);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let store = scenario();
        let reconciler = LinkedRecordReconciler::new();
        reconciler.reconcile(&store, LinkedTable::Relationships, P1, P2).unwrap();
        let after_first = sorted_staff(&store, P2);
        let writes = store.write_count();

        let second = reconciler.reconcile(&store, LinkedTable::Relationships, P1, P2).unwrap();
        assert_eq!(second.writes(), 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(store.write_count(), writes);
        assert_eq!(sorted_staff(&store, P2), after_first);
    }

    #[test]
    fn test_reconcile_never_duplicates_natural_keys() {
        let store = scenario();
        let reconciler = LinkedRecordReconciler::new();
        for _ in 0..3 {
            reconciler.reconcile(&store, LinkedTable::Relationships, P1, P2).unwrap();
            reconciler.reconcile(&store, LinkedTable::Relationships, P2, P1).unwrap();
        }

        for parent in [P1, P2] {
            let rows = store.query(LinkedTable::Relationships, parent).unwrap();
            let keys: HashSet<_> = rows.iter().map(|r| r.natural_key.clone()).collect();
            assert_eq!(keys.len(), rows.len());
        }
    }

    #[test]
    fn test_inserted_rows_get_fresh_identity() {
        let store = scenario();
        LinkedRecordReconciler::new()
            .reconcile(&store, LinkedTable::Relationships, P1, P2)
            .unwrap();

        let source_ids: HashSet<_> = store
            .query(LinkedTable::Relationships, P1)
            .unwrap()
            .into_iter()
            .filter_map(|r| r.id)
            .collect();
        for row in store.query(LinkedTable::Relationships, P2).unwrap() {
            assert_eq!(row.parent_id, P2);
            assert!(!source_ids.contains(&row.id.unwrap()));
        }
    }

    #[test]
    fn test_empty_source_and_self_are_noops() {
        let store = scenario();
        let reconciler = LinkedRecordReconciler::new();
        let writes = store.write_count();

        assert_eq!(
            reconciler.reconcile(&store, LinkedTable::Relationships, RecordId(50), P2).unwrap(),
            ReconcileReport::default()
        );
        assert_eq!(
            reconciler.reconcile(&store, LinkedTable::Relationships, P1, P1).unwrap(),
            ReconcileReport::default()
        );
        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn test_availability_rules_reconcile_by_rule() {
        let store = MemoryLinkedStore::new();
        let table = LinkedTable::Availability;
        let weekdays = AvailabilityRule {
            kind: "availability#product".to_string(),
            range_type: "days".to_string(),
            from_range: "1".to_string(),
            to_range: "5".to_string(),
            appointable: true,
            priority: 10,
            qty: 0,
        };
        let holiday = AvailabilityRule {
            range_type: "custom".to_string(),
            from_range: "2026-12-25".to_string(),
            to_range: "2026-12-26".to_string(),
            appointable: false,
            ..weekdays.clone()
        };
        store.insert(table, LinkedRecord::availability(P1, &weekdays, 0)).unwrap();
        store.insert(table, LinkedRecord::availability(P1, &holiday, 1)).unwrap();
        store.insert(table, LinkedRecord::availability(P2, &weekdays, 5)).unwrap();

        let report = LinkedRecordReconciler::new().reconcile(&store, table, P1, P2).unwrap();
        assert_eq!(report, ReconcileReport { inserted: 1, updated: 1, unchanged: 0 });

        let mut orders: Vec<i64> = store.query(table, P2).unwrap().iter().map(|r| r.sort_order).collect();
        orders.sort();
        assert_eq!(orders, vec![0, 1]);
    }

    #[test]
    fn test_store_failure_is_surfaced_after_partial_application() {
        let mut store = MockLinkedRecordStore::new();
        store
            .expect_query()
            .withf(|_, parent| *parent == P1)
            .returning(|_, _| Ok(vec![staff(P1, 1, 0), staff(P1, 2, 1)]));
        store
            .expect_query()
            .withf(|_, parent| *parent == P2)
            .returning(|_, _| Ok(Vec::new()));
        let mut calls = 0;
        store.expect_insert().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(10)
            } else {
                Err(SyncError::Store("disk full".to_string()))
            }
        });

        let result = LinkedRecordReconciler::new().reconcile(&store, LinkedTable::Relationships, P1, P2);
        assert!(matches!(result, Err(SyncError::Store(_))));
    }

    #[test]
    fn test_remove_from_translations_skips_edited_product() {
        let en = Language::parse("en").unwrap();
        let fr = Language::parse("fr").unwrap();
        let registry = MemoryRegistry::new();
        registry.register(P1, en);
        registry.register(P2, fr);
        registry.link(&[P1, P2]).unwrap();

        let store = scenario();
        let removed = LinkedRecordReconciler::new()
            .remove_from_translations(&store, &registry, LinkedTable::Relationships, P1, |_| {
                NaturalKey::staff(RecordId(2))
            })
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(sorted_staff(&store, P2), vec![("staff:3".to_string(), 2)]);
        assert_eq!(sorted_staff(&store, P1).len(), 2);
    }
}
