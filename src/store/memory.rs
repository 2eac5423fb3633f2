use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use tracing::debug;

use super::{ContentStore, LinkedRecordStore, MetadataStore};
use crate::error::{Result, SyncError};
use crate::model::{
    as_record_id, ContentRecord, LinkedRecord, LinkedTable, MetaMap, MetaValue, NaturalKey, RecordId,
    RecordKind, RowId, RowUpdate,
};

/// Two stored values designate the same thing ("10" and 10 do).
fn same_value(a: &MetaValue, b: &MetaValue) -> bool {
    if a == b {
        return true;
    }
    match (as_record_id(a), as_record_id(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// In-process metadata store keeping per-owner insertion order
#[derive(Debug, Default)]
pub struct MemoryMetaStore {
    entries: RefCell<BTreeMap<RecordId, Vec<(String, MetaValue)>>>,
    writes: Cell<usize>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes since creation
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    pub fn owners(&self) -> Vec<RecordId> {
        self.entries.borrow().keys().copied().collect()
    }

    /// Every owner's `(key, value)` pairs in insertion order
    pub fn entries(&self) -> BTreeMap<RecordId, Vec<(String, MetaValue)>> {
        self.entries.borrow().clone()
    }

    pub fn from_entries(entries: BTreeMap<RecordId, Vec<(String, MetaValue)>>) -> Self {
        Self {
            entries: RefCell::new(entries),
            writes: Cell::new(0),
        }
    }

    fn record_write(&self) {
        self.writes.set(self.writes.get() + 1);
    }
}

impl MetadataStore for MemoryMetaStore {
    fn get(&self, owner: RecordId, key: &str) -> Result<Vec<MetaValue>> {
        Ok(self
            .entries
            .borrow()
            .get(&owner)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_all(&self, owner: RecordId) -> Result<MetaMap> {
        let mut all = MetaMap::new();
        if let Some(entries) = self.entries.borrow().get(&owner) {
            for (key, value) in entries {
                all.entry(key.clone()).or_default().push(value.clone());
            }
        }
        Ok(all)
    }

    fn add(&self, owner: RecordId, key: &str, value: MetaValue) -> Result<()> {
        self.entries
            .borrow_mut()
            .entry(owner)
            .or_default()
            .push((key.to_string(), value));
        self.record_write();
        Ok(())
    }

    fn update(&self, owner: RecordId, key: &str, value: MetaValue, prev: Option<&MetaValue>) -> Result<bool> {
        let mut entries = self.entries.borrow_mut();
        let owned = entries.entry(owner).or_default();

        let updated = match prev {
            Some(prev) => match owned.iter_mut().find(|(k, v)| k == key && v == prev) {
                Some(entry) => {
                    entry.1 = value;
                    true
                }
                None => false,
            },
            None => match owned.iter().position(|(k, _)| k == key) {
                Some(first) => {
                    owned[first].1 = value;
                    let mut index = 0;
                    owned.retain(|(k, _)| {
                        let keep = k != key || index == first;
                        index += 1;
                        keep
                    });
                    true
                }
                None => {
                    owned.push((key.to_string(), value));
                    true
                }
            },
        };

        drop(entries);
        if updated {
            self.record_write();
        }
        Ok(updated)
    }

    fn delete(&self, owner: RecordId, key: &str, value: Option<&MetaValue>) -> Result<usize> {
        let mut entries = self.entries.borrow_mut();
        let Some(owned) = entries.get_mut(&owner) else {
            return Ok(0);
        };

        let removed = match value {
            Some(value) => match owned.iter().position(|(k, v)| k == key && v == value) {
                Some(index) => {
                    owned.remove(index);
                    1
                }
                None => 0,
            },
            None => {
                let before = owned.len();
                owned.retain(|(k, _)| k != key);
                before - owned.len()
            }
        };

        drop(entries);
        if removed > 0 {
            self.record_write();
        }
        Ok(removed)
    }

    fn find_owners(&self, key: &str, values: &[MetaValue]) -> Result<Vec<RecordId>> {
        Ok(self
            .entries
            .borrow()
            .iter()
            .filter(|(_, entries)| {
                entries
                    .iter()
                    .any(|(k, v)| k == key && values.iter().any(|wanted| same_value(v, wanted)))
            })
            .map(|(owner, _)| *owner)
            .collect())
    }
}

/// In-process linked-record tables.
///
/// Inserting a second row with the same `(parent, natural_key)` fails.
#[derive(Debug, Default)]
pub struct MemoryLinkedStore {
    tables: RefCell<BTreeMap<LinkedTable, Vec<LinkedRecord>>>,
    next_id: Cell<RowId>,
    writes: Cell<usize>,
}

impl MemoryLinkedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    pub fn rows(&self, table: LinkedTable) -> Vec<LinkedRecord> {
        self.tables.borrow().get(&table).cloned().unwrap_or_default()
    }

    /// Rebuild a store from persisted rows, keeping their ids
    pub fn from_rows(rows: impl IntoIterator<Item = (LinkedTable, LinkedRecord)>) -> Result<Self> {
        let rows: Vec<(LinkedTable, LinkedRecord)> = rows.into_iter().collect();
        let store = Self::new();
        let max_id = rows.iter().filter_map(|(_, row)| row.id).max().unwrap_or(0);
        store.next_id.set(max_id + 1);

        for (table, mut row) in rows {
            if row.id.is_none() {
                row.id = Some(store.allocate_id());
            }
            store.push_row(table, row)?;
        }
        Ok(store)
    }

    fn allocate_id(&self) -> RowId {
        let id = self.next_id.get().max(1);
        self.next_id.set(id + 1);
        id
    }

    fn push_row(&self, table: LinkedTable, row: LinkedRecord) -> Result<()> {
        let mut tables = self.tables.borrow_mut();
        let rows = tables.entry(table).or_default();

        if rows
            .iter()
            .any(|r| r.parent_id == row.parent_id && r.natural_key == row.natural_key)
        {
            return Err(SyncError::Store(format!(
                "Duplicate {} row for parent {} and key {}",
                table, row.parent_id, row.natural_key
            )));
        }

        rows.push(row);
        Ok(())
    }

    fn record_write(&self) {
        self.writes.set(self.writes.get() + 1);
    }
}

impl LinkedRecordStore for MemoryLinkedStore {
    fn query(&self, table: LinkedTable, parent: RecordId) -> Result<Vec<LinkedRecord>> {
        Ok(self
            .tables
            .borrow()
            .get(&table)
            .map(|rows| rows.iter().filter(|r| r.parent_id == parent).cloned().collect())
            .unwrap_or_default())
    }

    fn insert(&self, table: LinkedTable, mut row: LinkedRecord) -> Result<RowId> {
        let id = self.allocate_id();
        row.id = Some(id);
        let parent = row.parent_id;
        self.push_row(table, row)?;

        debug!("Inserted {} row {} for parent {}", table, id, parent);
        self.record_write();
        Ok(id)
    }

    fn update(
        &self,
        table: LinkedTable,
        parent: RecordId,
        natural_key: &NaturalKey,
        fields: &RowUpdate,
    ) -> Result<usize> {
        let mut tables = self.tables.borrow_mut();
        let mut count = 0;
        if let Some(rows) = tables.get_mut(&table) {
            for row in rows
                .iter_mut()
                .filter(|r| r.parent_id == parent && &r.natural_key == natural_key)
            {
                row.sort_order = fields.sort_order;
                row.payload = fields.payload.clone();
                count += 1;
            }
        }

        drop(tables);
        if count > 0 {
            self.record_write();
        }
        Ok(count)
    }

    fn delete(&self, table: LinkedTable, parent: RecordId, natural_key: &NaturalKey) -> Result<usize> {
        let mut tables = self.tables.borrow_mut();
        let removed = match tables.get_mut(&table) {
            Some(rows) => {
                let before = rows.len();
                rows.retain(|r| !(r.parent_id == parent && &r.natural_key == natural_key));
                before - rows.len()
            }
            None => 0,
        };

        drop(tables);
        if removed > 0 {
            self.record_write();
        }
        Ok(removed)
    }
}

/// In-process content records
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    records: RefCell<BTreeMap<RecordId, ContentRecord>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ContentRecord) {
        self.records.borrow_mut().insert(record.id, record);
    }

    pub fn records(&self) -> Vec<ContentRecord> {
        self.records.borrow().values().cloned().collect()
    }
}

impl ContentStore for MemoryContentStore {
    fn kind_of(&self, id: RecordId) -> Result<Option<RecordKind>> {
        Ok(self.records.borrow().get(&id).map(|r| r.kind.clone()))
    }

    fn parent_of(&self, id: RecordId) -> Result<Option<RecordId>> {
        Ok(self.records.borrow().get(&id).and_then(|r| r.parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OWNER: RecordId = RecordId(1);

    #[test]
    fn test_meta_values_keep_insertion_order() {
        let store = MemoryMetaStore::new();
        store.add(OWNER, "_ref", json!(3)).unwrap();
        store.add(OWNER, "_other", json!("x")).unwrap();
        store.add(OWNER, "_ref", json!(1)).unwrap();

        assert_eq!(store.get(OWNER, "_ref").unwrap(), vec![json!(3), json!(1)]);
        assert_eq!(store.get_single(OWNER, "_ref").unwrap(), Some(json!(3)));
        assert_eq!(store.get_all(OWNER).unwrap().len(), 2);
        assert!(store.get(RecordId(2), "_ref").unwrap().is_empty());
    }

    #[test]
    fn test_update_with_prev_replaces_first_match_only() {
        let store = MemoryMetaStore::new();
        store.add(OWNER, "_ref", json!(10)).unwrap();
        store.add(OWNER, "_ref", json!(10)).unwrap();

        assert!(store.update(OWNER, "_ref", json!(11), Some(&json!(10))).unwrap());
        assert_eq!(store.get(OWNER, "_ref").unwrap(), vec![json!(11), json!(10)]);
        assert!(!store.update(OWNER, "_ref", json!(12), Some(&json!(99))).unwrap());
    }

    #[test]
    fn test_update_without_prev_collapses_key() {
        let store = MemoryMetaStore::new();
        store.add(OWNER, "_ref", json!(10)).unwrap();
        store.add(OWNER, "_keep", json!(1)).unwrap();
        store.add(OWNER, "_ref", json!(11)).unwrap();

        assert!(store.update(OWNER, "_ref", json!(12), None).unwrap());
        assert_eq!(store.get(OWNER, "_ref").unwrap(), vec![json!(12)]);
        assert_eq!(store.get(OWNER, "_keep").unwrap(), vec![json!(1)]);

        assert!(store.update(OWNER, "_new", json!("v"), None).unwrap());
        assert_eq!(store.get(OWNER, "_new").unwrap(), vec![json!("v")]);
    }

    #[test]
    fn test_delete_single_and_all() {
        let store = MemoryMetaStore::new();
        store.add(OWNER, "_ref", json!(10)).unwrap();
        store.add(OWNER, "_ref", json!(10)).unwrap();
        store.add(OWNER, "_ref", json!(11)).unwrap();

        assert_eq!(store.delete(OWNER, "_ref", Some(&json!(10))).unwrap(), 1);
        assert_eq!(store.get(OWNER, "_ref").unwrap(), vec![json!(10), json!(11)]);
        assert_eq!(store.delete(OWNER, "_ref", None).unwrap(), 2);
        assert_eq!(store.delete(RecordId(9), "_ref", None).unwrap(), 0);
    }

    #[test]
    fn test_find_owners_matches_numeric_strings() {
        let store = MemoryMetaStore::new();
        store.add(RecordId(1), "_ref", json!("10")).unwrap();
        store.add(RecordId(2), "_ref", json!(11)).unwrap();
        store.add(RecordId(3), "_other", json!(10)).unwrap();

        let owners = store.find_owners("_ref", &[json!(10)]).unwrap();
        assert_eq!(owners, vec![RecordId(1)]);
    }

    #[test]
    fn test_linked_store_rejects_duplicates() {
        let store = MemoryLinkedStore::new();
        let row = LinkedRecord::relationship(RecordId(1), RecordId(7), 0);
        store.insert(LinkedTable::Relationships, row.clone()).unwrap();
        assert!(store.insert(LinkedTable::Relationships, row).is_err());
        // Same natural key under another table or parent is fine.
        store
            .insert(LinkedTable::Relationships, LinkedRecord::relationship(RecordId(2), RecordId(7), 0))
            .unwrap();
        assert_eq!(store.rows(LinkedTable::Relationships).len(), 2);
    }

    #[test]
    fn test_linked_store_update_and_delete() {
        let store = MemoryLinkedStore::new();
        let row = LinkedRecord::relationship(RecordId(1), RecordId(7), 0);
        let key = row.natural_key.clone();
        store.insert(LinkedTable::Relationships, row.clone()).unwrap();

        let mut fields = row.mutable_fields();
        fields.sort_order = 4;
        assert_eq!(store.update(LinkedTable::Relationships, RecordId(1), &key, &fields).unwrap(), 1);
        assert_eq!(store.query(LinkedTable::Relationships, RecordId(1)).unwrap()[0].sort_order, 4);

        assert_eq!(store.delete(LinkedTable::Relationships, RecordId(1), &key).unwrap(), 1);
        assert!(store.query(LinkedTable::Relationships, RecordId(1)).unwrap().is_empty());
    }

    #[test]
    fn test_linked_store_from_rows_keeps_ids() {
        let mut row = LinkedRecord::relationship(RecordId(1), RecordId(7), 0);
        row.id = Some(40);
        let store = MemoryLinkedStore::from_rows(vec![(LinkedTable::Relationships, row)]).unwrap();
        assert_eq!(store.rows(LinkedTable::Relationships)[0].id, Some(40));
        assert_eq!(store.write_count(), 0);

        let next = store
            .insert(LinkedTable::Relationships, LinkedRecord::relationship(RecordId(1), RecordId(8), 1))
            .unwrap();
        assert_eq!(next, 41);
    }

    #[test]
    fn test_content_store_kind_and_parent() {
        let store = MemoryContentStore::new();
        store.insert(ContentRecord {
            id: RecordId(5),
            kind: RecordKind::new("wc_appointment"),
            parent: Some(RecordId(4)),
        });
        assert_eq!(store.kind_of(RecordId(5)).unwrap(), Some(RecordKind::new("wc_appointment")));
        assert_eq!(store.parent_of(RecordId(5)).unwrap(), Some(RecordId(4)));
        assert_eq!(store.kind_of(RecordId(6)).unwrap(), None);
    }
}
