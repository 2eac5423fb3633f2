// Translation registry adapter
//
// The registry owns languages and translation groups. The synchronization
// engine only reads groups; the single write it performs is assigning a
// record's language.
// - Memory: in-process registry backed by translation groups

pub mod memory;

pub use memory::{MemoryRegistry, RegistryEntry};

use crate::error::Result;
use crate::model::{Language, RecordId, TranslationGroup};

/// Language service of the host platform
#[cfg_attr(test, mockall::automock)]
pub trait TranslationRegistry {
    /// Active resolution language of the current request
    fn current_language(&self) -> Option<Language>;

    /// Language assigned to a record
    fn language_of(&self, id: RecordId) -> Option<Language>;

    /// Record of the same translation group in `language`
    fn sibling(&self, id: RecordId, language: &Language) -> Option<RecordId>;

    /// Whole translation group of a record, empty when the record is unknown
    fn translation_group(&self, id: RecordId) -> TranslationGroup;

    /// Assign a record's language
    fn set_language(&self, id: RecordId, language: &Language) -> Result<()>;
}
