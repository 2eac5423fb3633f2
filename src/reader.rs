use tracing::{debug, warn};

use crate::classify::MetaKeyClassifier;
use crate::error::Result;
use crate::latch::Latch;
use crate::model::{as_record_id, reference_like, Language, MetaMap, MetaValue, RecordId};
use crate::registry::TranslationRegistry;
use crate::store::MetadataStore;

/// Who is reading: decides which language a cross-reference resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallerContext {
    /// Front-end request; resolves to the visitor's current language
    Visitor,
    /// Back-office or background work; resolves to the owner's own language
    #[default]
    Admin,
}

/// Result of an intercepted read
#[derive(Debug, Clone, PartialEq)]
pub enum MetaRead {
    /// The normal store read should proceed
    NotHandled,
    Values(Vec<MetaValue>),
}

/// Substitutes cross-reference values with the translation matching the
/// caller's language.
#[derive(Debug)]
pub struct LanguageAwareMetaReader {
    classifier: MetaKeyClassifier,
    latch: Latch<()>,
}

impl LanguageAwareMetaReader {
    pub fn new(classifier: MetaKeyClassifier) -> Self {
        Self {
            classifier,
            latch: Latch::new(),
        }
    }

    pub fn resolution_language(
        &self,
        registry: &dyn TranslationRegistry,
        owner: RecordId,
        context: CallerContext,
    ) -> Option<Language> {
        match context {
            CallerContext::Visitor => registry.current_language(),
            CallerContext::Admin => registry.language_of(owner),
        }
    }

    /// Intercept a keyed read.
    ///
    /// Only single-value reads are resolved. Multi-valued reads expose the
    /// stored translation group as-is, which is what the write path relies on.
    pub fn read(
        &self,
        store: &dyn MetadataStore,
        registry: &dyn TranslationRegistry,
        owner: RecordId,
        key: &str,
        single: bool,
        context: CallerContext,
    ) -> Result<MetaRead> {
        if !single || !self.classifier.is_cross_reference(key) {
            return Ok(MetaRead::NotHandled);
        }
        let Some(_guard) = self.latch.try_acquire(()) else {
            return Ok(MetaRead::NotHandled);
        };

        let Some(stored) = store.get_single(owner, key)? else {
            return Ok(MetaRead::Values(Vec::new()));
        };

        let resolved = match self.resolution_language(registry, owner, context) {
            Some(language) => resolve_value(registry, &stored, &language),
            None => {
                debug!("No resolution language for {}, returning stored {}", owner, key);
                stored
            }
        };
        Ok(MetaRead::Values(vec![resolved]))
    }

    /// Intercept a full metadata read, resolving every cross-reference key.
    ///
    /// `None` when the read is already being resolved further up the stack.
    pub fn read_all(
        &self,
        store: &dyn MetadataStore,
        registry: &dyn TranslationRegistry,
        owner: RecordId,
        context: CallerContext,
    ) -> Result<Option<MetaMap>> {
        let Some(_guard) = self.latch.try_acquire(()) else {
            return Ok(None);
        };

        let mut all = store.get_all(owner)?;
        let Some(language) = self.resolution_language(registry, owner, context) else {
            return Ok(Some(all));
        };

        for key in self.classifier.cross_reference_keys() {
            let Some(values) = all.get_mut(key) else {
                continue;
            };
            let mut resolved: Vec<MetaValue> = Vec::with_capacity(values.len());
            for value in values.iter() {
                let value = resolve_value(registry, value, &language);
                if !resolved.contains(&value) {
                    resolved.push(value);
                }
            }
            *values = resolved;
        }
        Ok(Some(all))
    }
}

/// Sibling of the referenced record in `language`, or the value unchanged.
pub fn resolve_value(registry: &dyn TranslationRegistry, value: &MetaValue, language: &Language) -> MetaValue {
    let Some(id) = as_record_id(value) else {
        return value.clone();
    };

    match registry.sibling(id, language) {
        Some(sibling) => reference_like(value, sibling),
        None => {
            warn!("Record {} has no '{}' translation, keeping it", id, language);
            value.clone()
        }
    }
}
