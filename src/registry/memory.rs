use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::TranslationRegistry;
use crate::error::{Result, SyncError};
use crate::model::{Language, RecordId, TranslationGroup};

/// Persisted form of one registry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<u64>,
}

/// In-process translation registry
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    current: RefCell<Option<Language>>,
    languages: RefCell<BTreeMap<RecordId, Language>>,
    groups: RefCell<BTreeMap<RecordId, u64>>,
    next_group: Cell<u64>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_current(&self, language: Option<Language>) {
        *self.current.borrow_mut() = language;
    }

    /// Register a record with its language, outside any translation group
    pub fn register(&self, id: RecordId, language: Language) {
        self.languages.borrow_mut().insert(id, language);
    }

    /// Join records (and the groups they already belong to) into one translation group.
    ///
    /// Fails without changes when two members would share a language.
    pub fn link(&self, ids: &[RecordId]) -> Result<()> {
        let mut members: Vec<RecordId> = Vec::new();
        for id in ids {
            for member in self.group_members(*id) {
                if !members.contains(&member) {
                    members.push(member);
                }
            }
        }

        let languages = self.languages.borrow();
        let mut seen: BTreeMap<&Language, RecordId> = BTreeMap::new();
        for member in &members {
            let Some(lang) = languages.get(member) else {
                return Err(SyncError::Registry(format!("Record {} has no language", member)));
            };
            if let Some(other) = seen.insert(lang, *member) {
                return Err(SyncError::Registry(format!(
                    "Records {} and {} are both in language '{}'",
                    other, member, lang
                )));
            }
        }
        drop(seen);
        drop(languages);

        let group = self.allocate_group();
        let count = members.len();
        let mut groups = self.groups.borrow_mut();
        for member in members {
            groups.insert(member, group);
        }
        debug!("Linked translation group {} with {} members", group, count);
        Ok(())
    }

    pub fn entries(&self) -> Vec<RegistryEntry> {
        let languages = self.languages.borrow();
        let groups = self.groups.borrow();

        let mut ids: Vec<RecordId> = languages.keys().chain(groups.keys()).copied().collect();
        ids.sort();
        ids.dedup();

        ids.into_iter()
            .map(|id| RegistryEntry {
                id,
                language: languages.get(&id).cloned(),
                group: groups.get(&id).copied(),
            })
            .collect()
    }

    pub fn from_entries(entries: Vec<RegistryEntry>, current: Option<Language>) -> Self {
        let registry = Self::new();
        let mut max_group = 0;
        {
            let mut languages = registry.languages.borrow_mut();
            let mut groups = registry.groups.borrow_mut();
            for entry in entries {
                if let Some(lang) = entry.language {
                    languages.insert(entry.id, lang);
                }
                if let Some(group) = entry.group {
                    max_group = max_group.max(group + 1);
                    groups.insert(entry.id, group);
                }
            }
        }
        registry.next_group.set(max_group);
        registry.set_current(current);
        registry
    }

    pub fn current(&self) -> Option<Language> {
        self.current.borrow().clone()
    }

    fn allocate_group(&self) -> u64 {
        let group = self.next_group.get();
        self.next_group.set(group + 1);
        group
    }

    fn group_members(&self, id: RecordId) -> Vec<RecordId> {
        let groups = self.groups.borrow();
        match groups.get(&id) {
            Some(group) => groups
                .iter()
                .filter(|(_, g)| *g == group)
                .map(|(member, _)| *member)
                .collect(),
            None => vec![id],
        }
    }
}

impl TranslationRegistry for MemoryRegistry {
    fn current_language(&self) -> Option<Language> {
        self.current()
    }

    fn language_of(&self, id: RecordId) -> Option<Language> {
        self.languages.borrow().get(&id).cloned()
    }

    fn sibling(&self, id: RecordId, language: &Language) -> Option<RecordId> {
        self.translation_group(id).get(language).copied()
    }

    fn translation_group(&self, id: RecordId) -> TranslationGroup {
        let languages = self.languages.borrow();
        self.group_members(id)
            .into_iter()
            .filter_map(|member| languages.get(&member).map(|lang| (lang.clone(), member)))
            .collect()
    }

    fn set_language(&self, id: RecordId, language: &Language) -> Result<()> {
        let conflict = self
            .translation_group(id)
            .get(language)
            .is_some_and(|other| *other != id);

        if conflict {
            // One record per language in a group: the record leaves its group.
            warn!(
                "Record {} moves to '{}' which its group already has; detaching it",
                id, language
            );
            self.groups.borrow_mut().remove(&id);
        }

        self.languages.borrow_mut().insert(id, language.clone());
        Ok(())
    }
}
