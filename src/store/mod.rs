// Host storage collaborators
//
// The synchronization engine never owns storage. It talks to three stores:
// - MetadataStore: multi-valued key/value metadata per record
// - LinkedRecordStore: tabular rows owned by a parent record
// - ContentStore: kinds and parents of content records
//
// Host-wide metadata filters are modeled by MetaInterceptor; an
// InterceptedMetaStore runs the interceptor before delegating to the real store.

pub mod memory;
pub mod snapshot;

pub use memory::{MemoryContentStore, MemoryLinkedStore, MemoryMetaStore};
pub use snapshot::{Snapshot, StoreParts};

use crate::error::Result;
use crate::model::{LinkedRecord, LinkedTable, MetaMap, MetaValue, NaturalKey, RecordId, RecordKind, RowId, RowUpdate};
use crate::reader::{CallerContext, MetaRead};

/// Generic metadata store of the host platform
pub trait MetadataStore {
    /// All values of `key`, in insertion order
    fn get(&self, owner: RecordId, key: &str) -> Result<Vec<MetaValue>>;

    /// First value of `key`
    fn get_single(&self, owner: RecordId, key: &str) -> Result<Option<MetaValue>> {
        Ok(self.get(owner, key)?.into_iter().next())
    }

    /// Every key of the owner
    fn get_all(&self, owner: RecordId) -> Result<MetaMap>;

    /// Append a value to `key`
    fn add(&self, owner: RecordId, key: &str, value: MetaValue) -> Result<()>;

    /// With `prev`, replace the first entry equal to `prev` and return false if there is none.
    /// Without `prev`, collapse `key` to the single `value`, adding it if absent.
    fn update(&self, owner: RecordId, key: &str, value: MetaValue, prev: Option<&MetaValue>) -> Result<bool>;

    /// With `value`, remove the first matching entry; without, remove every entry of `key`.
    fn delete(&self, owner: RecordId, key: &str, value: Option<&MetaValue>) -> Result<usize>;

    /// Owners holding any of `values` under `key`
    fn find_owners(&self, key: &str, values: &[MetaValue]) -> Result<Vec<RecordId>>;
}

/// Table-style store for rows attached to a parent record
#[cfg_attr(test, mockall::automock)]
pub trait LinkedRecordStore {
    fn query(&self, table: LinkedTable, parent: RecordId) -> Result<Vec<LinkedRecord>>;

    /// Insert a row; its `id` is ignored and a fresh one returned
    fn insert(&self, table: LinkedTable, row: LinkedRecord) -> Result<RowId>;

    /// Overwrite the mutable fields of rows matching `(parent, natural_key)`
    fn update(
        &self,
        table: LinkedTable,
        parent: RecordId,
        natural_key: &NaturalKey,
        fields: &RowUpdate,
    ) -> Result<usize>;

    fn delete(&self, table: LinkedTable, parent: RecordId, natural_key: &NaturalKey) -> Result<usize>;
}

/// Content records of the host platform
pub trait ContentStore {
    fn kind_of(&self, id: RecordId) -> Result<Option<RecordKind>>;

    fn parent_of(&self, id: RecordId) -> Result<Option<RecordId>>;
}

/// Explicit form of the host's metadata read/write filters.
///
/// Each method receives the store the interceptor should read and write
/// through, so nested operations pass through interception again.
pub trait MetaInterceptor {
    /// `Some(result)` short-circuits the write
    fn intercept_update(
        &self,
        store: &dyn MetadataStore,
        owner: RecordId,
        key: &str,
        value: &MetaValue,
    ) -> Result<Option<bool>>;

    fn intercept_get(
        &self,
        store: &dyn MetadataStore,
        owner: RecordId,
        key: &str,
        single: bool,
        context: CallerContext,
    ) -> Result<MetaRead>;

    /// `Some(map)` replaces the full metadata read
    fn intercept_get_all(
        &self,
        store: &dyn MetadataStore,
        owner: RecordId,
        context: CallerContext,
    ) -> Result<Option<MetaMap>>;
}

/// Metadata store view that runs an interceptor around the real store
pub struct InterceptedMetaStore<'a> {
    inner: &'a dyn MetadataStore,
    interceptor: &'a dyn MetaInterceptor,
    context: CallerContext,
}

impl<'a> InterceptedMetaStore<'a> {
    pub fn new(
        inner: &'a dyn MetadataStore,
        interceptor: &'a dyn MetaInterceptor,
        context: CallerContext,
    ) -> Self {
        Self {
            inner,
            interceptor,
            context,
        }
    }

    pub fn context(&self) -> CallerContext {
        self.context
    }
}

impl MetadataStore for InterceptedMetaStore<'_> {
    fn get(&self, owner: RecordId, key: &str) -> Result<Vec<MetaValue>> {
        match self.interceptor.intercept_get(self, owner, key, false, self.context)? {
            MetaRead::Values(values) => Ok(values),
            MetaRead::NotHandled => self.inner.get(owner, key),
        }
    }

    fn get_single(&self, owner: RecordId, key: &str) -> Result<Option<MetaValue>> {
        match self.interceptor.intercept_get(self, owner, key, true, self.context)? {
            MetaRead::Values(values) => Ok(values.into_iter().next()),
            MetaRead::NotHandled => self.inner.get_single(owner, key),
        }
    }

    fn get_all(&self, owner: RecordId) -> Result<MetaMap> {
        match self.interceptor.intercept_get_all(self, owner, self.context)? {
            Some(all) => Ok(all),
            None => self.inner.get_all(owner),
        }
    }

    fn add(&self, owner: RecordId, key: &str, value: MetaValue) -> Result<()> {
        self.inner.add(owner, key, value)
    }

    fn update(&self, owner: RecordId, key: &str, value: MetaValue, prev: Option<&MetaValue>) -> Result<bool> {
        match self.interceptor.intercept_update(self, owner, key, &value)? {
            Some(handled) => Ok(handled),
            None => self.inner.update(owner, key, value, prev),
        }
    }

    fn delete(&self, owner: RecordId, key: &str, value: Option<&MetaValue>) -> Result<usize> {
        self.inner.delete(owner, key, value)
    }

    fn find_owners(&self, key: &str, values: &[MetaValue]) -> Result<Vec<RecordId>> {
        self.inner.find_owners(key, values)
    }
}
