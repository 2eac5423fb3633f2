use tracing::{debug, info, warn};

use crate::classify::MetaKeyClassifier;
use crate::config::Config;
use crate::crossref::{CrossReferenceSynchronizer, SyncOutcome};
use crate::error::Result;
use crate::model::{as_record_id, is_empty_value, Language, LinkedTable, MetaMap, MetaValue, NaturalKey, RecordId};
use crate::reader::{CallerContext, LanguageAwareMetaReader, MetaRead};
use crate::reconcile::{LinkedRecordReconciler, ReconcileReport};
use crate::registry::TranslationRegistry;
use crate::store::{ContentStore, InterceptedMetaStore, LinkedRecordStore, MetaInterceptor, MetadataStore};

/// Appointment status a booking holds while it sits in a cart
pub const STATUS_IN_CART: &str = "in-cart";

/// Statuses reached when the visitor completes checkout
pub const CHECKOUT_STATUSES: [&str; 2] = ["unpaid", "pending-confirmation"];

/// Host collaborators the integration works against
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub registry: &'a dyn TranslationRegistry,
    pub meta: &'a dyn MetadataStore,
    pub linked: &'a dyn LinkedRecordStore,
    pub content: &'a dyn ContentStore,
}

/// What copying a product to another language changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub relationships: ReconcileReport,
    pub availability: ReconcileReport,
    pub metas_copied: usize,
}

/// Entry points called by the host platform's lifecycle events
pub struct Integration<'a> {
    config: Config,
    classifier: MetaKeyClassifier,
    registry: &'a dyn TranslationRegistry,
    meta: &'a dyn MetadataStore,
    linked: &'a dyn LinkedRecordStore,
    content: &'a dyn ContentStore,
    reconciler: LinkedRecordReconciler,
    synchronizer: CrossReferenceSynchronizer,
    reader: LanguageAwareMetaReader,
}

impl<'a> Integration<'a> {
    pub fn new(config: Config, collaborators: Collaborators<'a>) -> Result<Self> {
        config.validate()?;
        let classifier = MetaKeyClassifier::from_config(&config.meta);

        Ok(Self {
            reader: LanguageAwareMetaReader::new(classifier.clone()),
            classifier,
            config,
            registry: collaborators.registry,
            meta: collaborators.meta,
            linked: collaborators.linked,
            content: collaborators.content,
            reconciler: LinkedRecordReconciler::new(),
            synchronizer: CrossReferenceSynchronizer::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn classifier(&self) -> &MetaKeyClassifier {
        &self.classifier
    }

    /// Metadata store as the host sees it, with interception in place
    pub fn metadata(&self, context: CallerContext) -> InterceptedMetaStore<'_> {
        InterceptedMetaStore::new(self.meta, self, context)
    }

    /// Reconcile a single linked table from one product to another
    pub fn reconcile(&self, table: LinkedTable, source: RecordId, target: RecordId) -> Result<ReconcileReport> {
        self.reconciler.reconcile(self.linked, table, source, target)
    }

    /// A product was copied or synchronized to its translation `to` in `language`.
    pub fn on_product_copied(&self, from: RecordId, to: RecordId, language: &Language) -> Result<CopyReport> {
        info!("Copying appointment data of product {} to {} ({})", from, to, language);

        let relationships = self.reconcile(LinkedTable::Relationships, from, to)?;
        let availability = self.reconcile(LinkedTable::Availability, from, to)?;
        let metas_copied = self.copy_plain_metas(from, to, language)?;

        Ok(CopyReport {
            relationships,
            availability,
            metas_copied,
        })
    }

    /// Copy plain-copy metadata onto a translation; returns the number of keys written.
    ///
    /// Keys the source lacks are left alone on the target.
    pub fn copy_plain_metas(&self, from: RecordId, to: RecordId, language: &Language) -> Result<usize> {
        let mut copied = 0;
        for key in self.classifier.plain_copy_keys() {
            let source = self.meta.get(from, key)?;
            if source.is_empty() {
                continue;
            }

            let desired: Vec<MetaValue> = source
                .iter()
                .map(|value| self.classifier.translate_value(key, value, language, self.registry))
                .collect();
            if self.meta.get(to, key)? == desired {
                continue;
            }

            self.meta.delete(to, key, None)?;
            for value in desired {
                self.meta.add(to, key, value)?;
            }
            debug!("Copied {} from {} to {}", key, from, to);
            copied += 1;
        }
        Ok(copied)
    }

    /// A staff member was detached from `product`; detach it from the translations too.
    pub fn on_staff_removed(&self, product: RecordId, staff: RecordId) -> Result<usize> {
        let removed = self.reconciler.remove_from_translations(
            self.linked,
            self.registry,
            LinkedTable::Relationships,
            product,
            |language| NaturalKey::staff(self.registry.sibling(staff, language).unwrap_or(staff)),
        )?;
        info!("Removed staff {} from {} translation(s) of {}", staff, removed, product);
        Ok(removed)
    }

    /// A translation was saved; appointments booked on its siblings now reference it too.
    pub fn on_translation_saved(&self, post: RecordId) -> Result<usize> {
        let kind = self.content.kind_of(post)?;
        if kind.as_ref().map(|k| k.as_str()) != Some(self.config.content.product_kind.as_str()) {
            return Ok(0);
        }

        let others: Vec<RecordId> = self
            .registry
            .translation_group(post)
            .into_values()
            .filter(|id| *id != post)
            .collect();

        self.synchronizer.backfill_new_translation(
            self.meta,
            &self.config.content.product_reference_key,
            post,
            &others,
        )
    }

    /// A new appointment takes the language of its product, as does its order.
    pub fn on_new_appointment(&self, appointment: RecordId) -> Result<Option<Language>> {
        let product = self
            .meta
            .get_single(appointment, &self.config.content.product_reference_key)?
            .and_then(|value| as_record_id(&value));
        let Some(product) = product else {
            warn!("Appointment {} has no product, language left unset", appointment);
            return Ok(None);
        };
        let Some(language) = self.registry.language_of(product) else {
            warn!("Product {} has no language, appointment {} left unset", product, appointment);
            return Ok(None);
        };

        self.registry.set_language(appointment, &language)?;
        if let Some(order) = self.content.parent_of(appointment)? {
            let is_order = self
                .content
                .kind_of(order)?
                .is_some_and(|kind| kind.as_str() == self.config.content.order_kind);
            if is_order {
                self.registry.set_language(order, &language)?;
                debug!("Order {} set to '{}'", order, language);
            }
        }

        info!("Appointment {} set to '{}' from product {}", appointment, language, product);
        Ok(Some(language))
    }

    /// The visitor may switch language between adding to cart and checking out.
    ///
    /// Returns whether the appointment language changed.
    pub fn on_status_transition(&self, appointment: RecordId, from: &str, to: &str) -> Result<bool> {
        if from != STATUS_IN_CART || !CHECKOUT_STATUSES.contains(&to) {
            return Ok(false);
        }
        let Some(current) = self.registry.current_language() else {
            return Ok(false);
        };
        if self.registry.language_of(appointment).as_ref() == Some(&current) {
            return Ok(false);
        }

        self.registry.set_language(appointment, &current)?;
        info!("Appointment {} switched to '{}' at checkout", appointment, current);
        Ok(true)
    }

    /// Content kinds whose language the registry manages.
    ///
    /// With `hide`, the configured kinds are removed instead (settings screens).
    pub fn managed_kinds(&self, kinds: &[String], hide: bool) -> Vec<String> {
        let ours = &self.config.content.translated_kinds;
        if hide {
            return kinds.iter().filter(|k| !ours.contains(k)).cloned().collect();
        }

        let mut merged = kinds.to_vec();
        for kind in ours {
            if !merged.contains(kind) {
                merged.push(kind.clone());
            }
        }
        merged
    }

    fn is_appointment(&self, owner: RecordId) -> Result<bool> {
        Ok(self
            .content
            .kind_of(owner)?
            .is_some_and(|kind| kind.as_str() == self.config.content.appointment_kind))
    }
}

impl MetaInterceptor for Integration<'_> {
    fn intercept_update(
        &self,
        store: &dyn MetadataStore,
        owner: RecordId,
        key: &str,
        value: &MetaValue,
    ) -> Result<Option<bool>> {
        if !self.classifier.is_cross_reference(key) || is_empty_value(value) {
            return Ok(None);
        }
        let Some(referenced) = as_record_id(value) else {
            return Ok(None);
        };

        match self.synchronizer.sync(store, self.registry, owner, key, referenced)? {
            SyncOutcome::Skipped => Ok(None),
            SyncOutcome::Applied(_) => Ok(Some(true)),
        }
    }

    fn intercept_get(
        &self,
        store: &dyn MetadataStore,
        owner: RecordId,
        key: &str,
        single: bool,
        context: CallerContext,
    ) -> Result<MetaRead> {
        self.reader.read(store, self.registry, owner, key, single, context)
    }

    fn intercept_get_all(
        &self,
        store: &dyn MetadataStore,
        owner: RecordId,
        context: CallerContext,
    ) -> Result<Option<MetaMap>> {
        if !self.is_appointment(owner)? {
            return Ok(None);
        }
        self.reader.read_all(store, self.registry, owner, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentRecord, LinkedRecord, RecordKind};
    use crate::registry::MemoryRegistry;
    use crate::store::{MemoryContentStore, MemoryLinkedStore, MemoryMetaStore};
    use serde_json::json;

    const PRODUCT_EN: RecordId = RecordId(10);
    const PRODUCT_FR: RecordId = RecordId(11);
    const STAFF_EN: RecordId = RecordId(20);
    const STAFF_FR: RecordId = RecordId(21);
    const APPOINTMENT: RecordId = RecordId(100);
    const ORDER: RecordId = RecordId(90);
    const PRODUCT_KEY: &str = "_appointment_product_id";

    fn lang(slug: &str) -> Language {
        Language::parse(slug).unwrap()
    }

    struct Fixture {
        registry: MemoryRegistry,
        meta: MemoryMetaStore,
        linked: MemoryLinkedStore,
        content: MemoryContentStore,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = MemoryRegistry::new();
            registry.register(PRODUCT_EN, lang("en"));
            registry.register(PRODUCT_FR, lang("fr"));
            registry.link(&[PRODUCT_EN, PRODUCT_FR]).unwrap();
            registry.register(STAFF_EN, lang("en"));
            registry.register(STAFF_FR, lang("fr"));
            registry.link(&[STAFF_EN, STAFF_FR]).unwrap();

            let content = MemoryContentStore::new();
            for (id, kind, parent) in [
                (PRODUCT_EN, "product", None),
                (PRODUCT_FR, "product", None),
                (APPOINTMENT, "wc_appointment", Some(ORDER)),
                (ORDER, "shop_order", None),
            ] {
                content.insert(ContentRecord {
                    id,
                    kind: RecordKind::new(kind),
                    parent,
                });
            }

            Self {
                registry,
                meta: MemoryMetaStore::new(),
                linked: MemoryLinkedStore::new(),
                content,
            }
        }

        fn integration(&self) -> Integration<'_> {
            Integration::new(
                Config::default(),
                Collaborators {
                    registry: &self.registry,
                    meta: &self.meta,
                    linked: &self.linked,
                    content: &self.content,
                },
            )
            .unwrap()
        }
    }

    #[test]
    fn test_update_of_cross_reference_populates_group() {
        let fixture = Fixture::new();
        let integration = fixture.integration();
        let meta = integration.metadata(CallerContext::Admin);

        assert!(meta.update(APPOINTMENT, PRODUCT_KEY, json!(PRODUCT_FR.0), None).unwrap());
        let mut stored = fixture.meta.get(APPOINTMENT, PRODUCT_KEY).unwrap();
        stored.sort_by_key(|v| as_record_id(v));
        assert_eq!(stored, vec![json!(10), json!(11)]);
    }

    #[test]
    fn test_update_of_other_keys_passes_through() {
        let fixture = Fixture::new();
        let integration = fixture.integration();
        let meta = integration.metadata(CallerContext::Admin);

        meta.update(APPOINTMENT, "_appointment_cost", json!("25"), None).unwrap();
        meta.update(APPOINTMENT, PRODUCT_KEY, json!(0), None).unwrap();
        assert_eq!(fixture.meta.get(APPOINTMENT, "_appointment_cost").unwrap(), vec![json!("25")]);
        assert_eq!(fixture.meta.get(APPOINTMENT, PRODUCT_KEY).unwrap(), vec![json!(0)]);
    }

    #[test]
    fn test_repeated_update_writes_nothing_new() {
        let fixture = Fixture::new();
        let integration = fixture.integration();
        let meta = integration.metadata(CallerContext::Admin);

        meta.update(APPOINTMENT, PRODUCT_KEY, json!(10), None).unwrap();
        let writes = fixture.meta.write_count();
        meta.update(APPOINTMENT, PRODUCT_KEY, json!(11), None).unwrap();
        assert_eq!(fixture.meta.write_count(), writes);
        assert_eq!(fixture.meta.get(APPOINTMENT, PRODUCT_KEY).unwrap().len(), 2);
    }

    #[test]
    fn test_single_read_follows_owner_language() {
        let fixture = Fixture::new();
        fixture.registry.register(APPOINTMENT, lang("fr"));
        let integration = fixture.integration();
        let meta = integration.metadata(CallerContext::Admin);

        meta.update(APPOINTMENT, PRODUCT_KEY, json!(10), None).unwrap();
        assert_eq!(meta.get_single(APPOINTMENT, PRODUCT_KEY).unwrap(), Some(json!(11)));
        // Multi-valued reads see the stored group.
        assert_eq!(meta.get(APPOINTMENT, PRODUCT_KEY).unwrap().len(), 2);
    }

    #[test]
    fn test_get_all_only_resolves_appointments() {
        let fixture = Fixture::new();
        fixture.registry.set_current(Some(lang("fr")));
        fixture.meta.add(APPOINTMENT, PRODUCT_KEY, json!(10)).unwrap();
        fixture.meta.add(PRODUCT_EN, PRODUCT_KEY, json!(10)).unwrap();
        let integration = fixture.integration();
        let meta = integration.metadata(CallerContext::Visitor);

        assert_eq!(meta.get_all(APPOINTMENT).unwrap()[PRODUCT_KEY], vec![json!(11)]);
        assert_eq!(meta.get_all(PRODUCT_EN).unwrap()[PRODUCT_KEY], vec![json!(10)]);
    }

    #[test]
    fn test_product_copy_reconciles_and_copies_metas() {
        let fixture = Fixture::new();
        fixture
            .linked
            .insert(LinkedTable::Relationships, LinkedRecord::relationship(PRODUCT_EN, STAFF_EN, 0))
            .unwrap();
        fixture.meta.add(PRODUCT_EN, "_wc_appointment_duration", json!("30")).unwrap();
        fixture
            .meta
            .add(PRODUCT_EN, "_staff_qtys", json!({ "20": 2 }))
            .unwrap();
        fixture.meta.add(PRODUCT_EN, "_edit_lock", json!("x")).unwrap();

        let integration = fixture.integration();
        let report = integration.on_product_copied(PRODUCT_EN, PRODUCT_FR, &lang("fr")).unwrap();

        assert_eq!(report.relationships.inserted, 1);
        assert_eq!(report.metas_copied, 2);
        assert_eq!(fixture.meta.get(PRODUCT_FR, "_wc_appointment_duration").unwrap(), vec![json!("30")]);
        assert_eq!(fixture.meta.get(PRODUCT_FR, "_staff_qtys").unwrap(), vec![json!({ "21": 2 })]);
        assert!(fixture.meta.get(PRODUCT_FR, "_edit_lock").unwrap().is_empty());

        let again = integration.on_product_copied(PRODUCT_EN, PRODUCT_FR, &lang("fr")).unwrap();
        assert_eq!(again.metas_copied, 0);
        assert_eq!(again.relationships.writes(), 0);
    }

    #[test]
    fn test_staff_removal_reaches_translations() {
        let fixture = Fixture::new();
        for product in [PRODUCT_EN, PRODUCT_FR] {
            fixture
                .linked
                .insert(LinkedTable::Relationships, LinkedRecord::relationship(product, STAFF_EN, 0))
                .unwrap();
            fixture
                .linked
                .insert(LinkedTable::Relationships, LinkedRecord::relationship(product, STAFF_FR, 1))
                .unwrap();
        }

        let removed = fixture.integration().on_staff_removed(PRODUCT_EN, STAFF_EN).unwrap();
        assert_eq!(removed, 1);
        // The French product loses the French sibling of the staff member.
        let fr_rows = fixture.linked.query(LinkedTable::Relationships, PRODUCT_FR).unwrap();
        assert_eq!(fr_rows.len(), 1);
        assert_eq!(fr_rows[0].natural_key, NaturalKey::staff(STAFF_EN));
        assert_eq!(fixture.linked.query(LinkedTable::Relationships, PRODUCT_EN).unwrap().len(), 2);
    }

    #[test]
    fn test_new_translation_backfills_appointments() {
        let fixture = Fixture::new();
        fixture.meta.add(APPOINTMENT, PRODUCT_KEY, json!(10)).unwrap();
        let integration = fixture.integration();

        assert_eq!(integration.on_translation_saved(PRODUCT_FR).unwrap(), 1);
        assert_eq!(
            fixture.meta.get(APPOINTMENT, PRODUCT_KEY).unwrap(),
            vec![json!(10), json!(11)]
        );
        // Not a product.
        assert_eq!(integration.on_translation_saved(ORDER).unwrap(), 0);
    }

    #[test]
    fn test_new_appointment_takes_product_language() {
        let fixture = Fixture::new();
        fixture.meta.add(APPOINTMENT, PRODUCT_KEY, json!("11")).unwrap();

        let language = fixture.integration().on_new_appointment(APPOINTMENT).unwrap();
        assert_eq!(language, Some(lang("fr")));
        assert_eq!(fixture.registry.language_of(APPOINTMENT), Some(lang("fr")));
        assert_eq!(fixture.registry.language_of(ORDER), Some(lang("fr")));
    }

    #[test]
    fn test_new_appointment_without_product_is_left_alone() {
        let fixture = Fixture::new();
        assert_eq!(fixture.integration().on_new_appointment(APPOINTMENT).unwrap(), None);
        assert_eq!(fixture.registry.language_of(APPOINTMENT), None);
    }

    #[test]
    fn test_checkout_transition_switches_language() {
        let fixture = Fixture::new();
        fixture.registry.register(APPOINTMENT, lang("en"));
        fixture.registry.set_current(Some(lang("fr")));
        let integration = fixture.integration();

        assert!(!integration.on_status_transition(APPOINTMENT, "unpaid", "paid").unwrap());
        assert!(integration.on_status_transition(APPOINTMENT, "in-cart", "unpaid").unwrap());
        assert_eq!(fixture.registry.language_of(APPOINTMENT), Some(lang("fr")));
        assert!(!integration
            .on_status_transition(APPOINTMENT, "in-cart", "pending-confirmation")
            .unwrap());
    }

    #[test]
    fn test_managed_kinds() {
        let fixture = Fixture::new();
        let integration = fixture.integration();
        let kinds = vec!["post".to_string(), "page".to_string()];

        assert_eq!(integration.managed_kinds(&kinds, false), vec!["post", "page", "wc_appointment"]);
        let shown = vec!["post".to_string(), "wc_appointment".to_string()];
        assert_eq!(integration.managed_kinds(&shown, true), vec!["post"]);
    }
}
