use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

use crate::config::MetaConfig;
use crate::model::{Language, MetaValue, RecordId};
use crate::registry::TranslationRegistry;

/// How the synchronization engine treats a metadata key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    /// Copied as-is between translations of a product
    PlainCopy,
    /// Holds ids of other records; follows their translation group
    CrossReference,
    /// Left alone
    Unmanaged,
}

/// Static key lookup built from configuration
#[derive(Debug, Clone)]
pub struct MetaKeyClassifier {
    plain_copy: Vec<String>,
    cross_reference: Vec<String>,
    plain_set: HashSet<String>,
    cross_set: HashSet<String>,
    id_keyed_maps: HashSet<String>,
}

impl MetaKeyClassifier {
    pub fn from_config(config: &MetaConfig) -> Self {
        let mut plain_copy: Vec<String> = Vec::new();
        for key in &config.plain_copy {
            if !plain_copy.contains(key) {
                plain_copy.push(key.clone());
            }
        }
        let mut cross_reference: Vec<String> = Vec::new();
        for key in &config.cross_reference {
            if !cross_reference.contains(key) {
                cross_reference.push(key.clone());
            }
        }

        Self {
            plain_set: plain_copy.iter().cloned().collect(),
            cross_set: cross_reference.iter().cloned().collect(),
            id_keyed_maps: config.id_keyed_maps.iter().cloned().collect(),
            plain_copy,
            cross_reference,
        }
    }

    pub fn classify(&self, key: &str) -> KeyClass {
        if self.cross_set.contains(key) {
            KeyClass::CrossReference
        } else if self.plain_set.contains(key) {
            KeyClass::PlainCopy
        } else {
            KeyClass::Unmanaged
        }
    }

    pub fn is_cross_reference(&self, key: &str) -> bool {
        self.classify(key) == KeyClass::CrossReference
    }

    pub fn is_plain_copy(&self, key: &str) -> bool {
        self.classify(key) == KeyClass::PlainCopy
    }

    pub fn is_id_keyed_map(&self, key: &str) -> bool {
        self.id_keyed_maps.contains(key)
    }

    pub fn plain_copy_keys(&self) -> &[String] {
        &self.plain_copy
    }

    pub fn cross_reference_keys(&self) -> &[String] {
        &self.cross_reference
    }

    /// Append the plain-copy keys to a host-provided list of keys to copy
    pub fn merge_copy_list(&self, existing: &[String]) -> Vec<String> {
        let mut merged = existing.to_vec();
        for key in &self.plain_copy {
            if !merged.contains(key) {
                merged.push(key.clone());
            }
        }
        merged
    }

    /// Prepare a plain-copy value for the translation in `language`.
    ///
    /// Id-keyed maps have their keys replaced by the sibling records; entries
    /// without a sibling are dropped. Every other value is returned unchanged.
    pub fn translate_value(
        &self,
        key: &str,
        value: &MetaValue,
        language: &Language,
        registry: &dyn TranslationRegistry,
    ) -> MetaValue {
        if !self.is_id_keyed_map(key) {
            return value.clone();
        }
        retarget_id_keyed_map(value, language, registry)
    }
}

/// Replace record-id keys of an object with their siblings in `language`.
pub fn retarget_id_keyed_map(
    value: &MetaValue,
    language: &Language,
    registry: &dyn TranslationRegistry,
) -> MetaValue {
    let Value::Object(entries) = value else {
        return value.clone();
    };

    let mut translated = Map::new();
    for (id, amount) in entries {
        let sibling = id
            .parse::<u64>()
            .ok()
            .and_then(|id| registry.sibling(RecordId(id), language));

        match sibling {
            Some(sibling) => {
                translated.insert(sibling.to_string(), amount.clone());
            }
            None => debug!("Dropping entry {} without a '{}' translation", id, language),
        }
    }
    Value::Object(translated)
}
