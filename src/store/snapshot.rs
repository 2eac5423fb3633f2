use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use super::memory::{MemoryContentStore, MemoryLinkedStore, MemoryMetaStore};
use crate::error::Result;
use crate::model::{ContentRecord, Language, LinkedRecord, LinkedTable, MetaValue, RecordId};
use crate::registry::{MemoryRegistry, RegistryEntry};

/// JSON image of the in-process stores, used by the command line between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub current_language: Option<Language>,
    #[serde(default)]
    pub registry: Vec<RegistryEntry>,
    #[serde(default)]
    pub records: Vec<ContentRecord>,
    #[serde(default)]
    pub meta: BTreeMap<RecordId, Vec<(String, MetaValue)>>,
    #[serde(default)]
    pub relationships: Vec<LinkedRecord>,
    #[serde(default)]
    pub availability: Vec<LinkedRecord>,
}

/// Stores rebuilt from a snapshot
pub struct StoreParts {
    pub registry: MemoryRegistry,
    pub meta: MemoryMetaStore,
    pub linked: MemoryLinkedStore,
    pub content: MemoryContentStore,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            saved_at: Utc::now(),
            current_language: None,
            registry: Vec::new(),
            records: Vec::new(),
            meta: BTreeMap::new(),
            relationships: Vec::new(),
            availability: Vec::new(),
        }
    }
}

impl Snapshot {
    /// Load a snapshot; a missing file is an empty state
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No state file at {}, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        info!(
            "Loaded state from {} (saved {})",
            path.display(),
            snapshot.saved_at.format("%Y-%m-%d %H:%M:%S")
        );
        Ok(snapshot)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        debug!("Saved state to {}", path.display());
        Ok(())
    }

    pub fn from_parts(
        registry: &MemoryRegistry,
        meta: &MemoryMetaStore,
        linked: &MemoryLinkedStore,
        content: &MemoryContentStore,
    ) -> Self {
        Self {
            saved_at: Utc::now(),
            current_language: registry.current(),
            registry: registry.entries(),
            records: content.records(),
            meta: meta.entries(),
            relationships: linked.rows(LinkedTable::Relationships),
            availability: linked.rows(LinkedTable::Availability),
        }
    }

    pub fn into_parts(self) -> Result<StoreParts> {
        let rows = self
            .relationships
            .into_iter()
            .map(|row| (LinkedTable::Relationships, row))
            .chain(self.availability.into_iter().map(|row| (LinkedTable::Availability, row)));

        let content = MemoryContentStore::new();
        for record in self.records {
            content.insert(record);
        }

        Ok(StoreParts {
            registry: MemoryRegistry::from_entries(self.registry, self.current_language),
            meta: MemoryMetaStore::from_entries(self.meta),
            linked: MemoryLinkedStore::from_rows(rows)?,
            content,
        })
    }
}
