use std::collections::HashSet;
use tracing::{debug, info};

use crate::error::Result;
use crate::latch::Latch;
use crate::model::{as_record_id, reference_like, MetaValue, RecordId};
use crate::registry::TranslationRegistry;
use crate::store::MetadataStore;

/// What a synchronization pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub kept: usize,
    pub replaced: usize,
    pub added: usize,
    pub removed: usize,
}

impl SyncReport {
    pub fn writes(&self) -> usize {
        self.replaced + self.added + self.removed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A pass for the same owner and key is already running further up the stack
    Skipped,
    Applied(SyncReport),
}

/// Keeps a multi-valued cross-reference key holding the whole translation
/// group of the referenced record.
#[derive(Debug, Default)]
pub struct CrossReferenceSynchronizer {
    latch: Latch<(RecordId, String)>,
}

impl CrossReferenceSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pass for `(owner, key)` is in progress
    pub fn in_progress(&self, owner: RecordId, key: &str) -> bool {
        self.latch.is_held(&(owner, key.to_string()))
    }

    /// Point `(owner, key)` at every translation of `referenced`.
    ///
    /// Stale values are overwritten in place, paired by position with the
    /// missing translations, so a store that keeps insertion order keeps the
    /// slots of the values it already had.
    pub fn sync(
        &self,
        store: &dyn MetadataStore,
        registry: &dyn TranslationRegistry,
        owner: RecordId,
        key: &str,
        referenced: RecordId,
    ) -> Result<SyncOutcome> {
        let Some(_guard) = self.latch.try_acquire((owner, key.to_string())) else {
            debug!("Sync of {} on {} already running, passing through", key, owner);
            return Ok(SyncOutcome::Skipped);
        };

        // The written record comes first so a raw single read still returns it.
        let mut group: Vec<RecordId> = vec![referenced];
        group.extend(
            registry
                .translation_group(referenced)
                .into_values()
                .filter(|id| *id != referenced),
        );

        let current = store.get(owner, key)?;
        let mut report = SyncReport::default();

        if current.is_empty() {
            for id in &group {
                store.add(owner, key, MetaValue::from(id.0))?;
                report.added += 1;
            }
            info!("Populated {} on {} with {} translation(s)", key, owner, report.added);
            return Ok(SyncOutcome::Applied(report));
        }

        let members: HashSet<RecordId> = group.iter().copied().collect();
        let mut kept: HashSet<RecordId> = HashSet::new();
        let mut stale: Vec<MetaValue> = Vec::new();
        for value in current {
            match as_record_id(&value) {
                Some(id) if members.contains(&id) && kept.insert(id) => report.kept += 1,
                _ => stale.push(value),
            }
        }

        let fresh: Vec<RecordId> = group.into_iter().filter(|id| !kept.contains(id)).collect();

        let mut stale = stale.into_iter();
        let mut fresh = fresh.into_iter();
        loop {
            match (stale.next(), fresh.next()) {
                (Some(old), Some(new)) => {
                    store.update(owner, key, reference_like(&old, new), Some(&old))?;
                    debug!("Replaced {} with {} in {} on {}", old, new, key, owner);
                    report.replaced += 1;
                }
                (None, Some(new)) => {
                    store.add(owner, key, MetaValue::from(new.0))?;
                    debug!("Added {} to {} on {}", new, key, owner);
                    report.added += 1;
                }
                (Some(old), None) => {
                    store.delete(owner, key, Some(&old))?;
                    debug!("Removed {} from {} on {}", old, key, owner);
                    report.removed += 1;
                }
                (None, None) => break,
            }
        }

        if report.writes() > 0 {
            info!(
                "Synchronized {} on {}: {} kept, {} replaced, {} added, {} removed",
                key, owner, report.kept, report.replaced, report.added, report.removed
            );
        }
        Ok(SyncOutcome::Applied(report))
    }

    /// Reference a freshly saved translation from every owner that already
    /// references one of its sibling translations.
    ///
    /// Returns the number of owners updated.
    pub fn backfill_new_translation(
        &self,
        store: &dyn MetadataStore,
        key: &str,
        new_id: RecordId,
        other_translations: &[RecordId],
    ) -> Result<usize> {
        // An empty sibling list would match nothing useful.
        if other_translations.is_empty() {
            return Ok(0);
        }

        let siblings: Vec<MetaValue> = other_translations.iter().map(|id| MetaValue::from(id.0)).collect();
        let referencing = store.find_owners(key, &siblings)?;
        let already: HashSet<RecordId> = store
            .find_owners(key, &[MetaValue::from(new_id.0)])?
            .into_iter()
            .collect();

        let mut updated = 0;
        for owner in referencing.into_iter().filter(|owner| !already.contains(owner)) {
            store.add(owner, key, MetaValue::from(new_id.0))?;
            updated += 1;
        }

        if updated > 0 {
            info!("Linked new translation {} into {} on {} owner(s)", new_id, key, updated);
        }
        Ok(updated)
    }
}
