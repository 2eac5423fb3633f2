use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use crate::error::{Result, SyncError};

// Default values for content configuration
fn default_product_kind() -> String {
    "product".to_string()
}

fn default_appointment_kind() -> String {
    "wc_appointment".to_string()
}

fn default_order_kind() -> String {
    "shop_order".to_string()
}

fn default_translated_kinds() -> Vec<String> {
    vec![default_appointment_kind()]
}

fn default_product_reference_key() -> String {
    "_appointment_product_id".to_string()
}

fn default_staff_reference_key() -> String {
    "_appointment_staff_id".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    /// Keys copied verbatim from a product to its translations
    pub plain_copy: Vec<String>,
    /// Keys whose values are ids of other records and must follow the translation group
    pub cross_reference: Vec<String>,
    /// Plain-copy keys holding an object keyed by record id; the ids are re-targeted on copy
    #[serde(default)]
    pub id_keyed_maps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Kind of the translated appointable product
    #[serde(default = "default_product_kind")]
    pub product_kind: String,
    /// Kind of appointment records, which hold the cross-reference metadata
    #[serde(default = "default_appointment_kind")]
    pub appointment_kind: String,
    /// Kind of the order an appointment belongs to
    #[serde(default = "default_order_kind")]
    pub order_kind: String,
    /// Extra kinds whose language and translations are managed by the registry
    #[serde(default = "default_translated_kinds")]
    pub translated_kinds: Vec<String>,
    /// Meta key linking an appointment to its product
    #[serde(default = "default_product_reference_key")]
    pub product_reference_key: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        let plain_copy = [
            "_wc_appointment_has_pricing",
            "_wc_appointment_pricing",
            "_wc_appointment_qty",
            "_wc_appointment_qty_min",
            "_wc_appointment_qty_max",
            "_wc_appointment_staff_assignment",
            "_wc_appointment_duration",
            "_wc_appointment_duration_unit",
            "_wc_appointment_interval",
            "_wc_appointment_interval_unit",
            "_wc_appointment_min_date",
            "_wc_appointment_min_date_unit",
            "_wc_appointment_max_date",
            "_wc_appointment_max_date_unit",
            "_wc_appointment_padding_duration",
            "_wc_appointment_padding_duration_unit",
            "_wc_appointment_user_can_cancel",
            "_wc_appointment_cancel_limit",
            "_wc_appointment_cancel_limit_unit",
            "_wc_appointment_user_can_reschedule",
            "_wc_appointment_reschedule_limit_unit",
            "_wc_appointment_reschedule_limit",
            "_wc_appointment_customer_timezones",
            "_wc_appointment_cal_color",
            "_wc_appointment_requires_confirmation",
            "_wc_appointment_availability_span",
            "_wc_appointment_availability_autoselect",
            "_wc_appointment_has_restricted_days",
            "_wc_appointment_restricted_days",
            "_wc_appointment_staff_nopref",
            "_staff_base_costs",
            "_staff_qtys",
            "_product_addons",
            "_product_addons_exclude_global",
        ];

        Self {
            plain_copy: plain_copy.iter().map(|k| k.to_string()).collect(),
            cross_reference: vec![default_product_reference_key(), default_staff_reference_key()],
            id_keyed_maps: vec!["_staff_base_costs".to_string(), "_staff_qtys".to_string()],
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            product_kind: default_product_kind(),
            appointment_kind: default_appointment_kind(),
            order_kind: default_order_kind(),
            translated_kinds: default_translated_kinds(),
            product_reference_key: default_product_reference_key(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig::default(),
            content: ContentConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SyncError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SyncError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// A key belongs to at most one classification, id-keyed maps must be
    /// plain-copy keys and the product reference must be a cross-reference key.
    pub fn validate(&self) -> Result<()> {
        let plain: HashSet<&str> = self.meta.plain_copy.iter().map(String::as_str).collect();

        if let Some(key) = self.meta.cross_reference.iter().find(|k| plain.contains(k.as_str())) {
            return Err(SyncError::Config(format!(
                "Meta key '{}' is listed as both plain-copy and cross-reference",
                key
            )));
        }

        if let Some(key) = self.meta.id_keyed_maps.iter().find(|k| !plain.contains(k.as_str())) {
            return Err(SyncError::Config(format!(
                "Id-keyed map '{}' must also be a plain-copy key",
                key
            )));
        }

        if !self.meta.cross_reference.contains(&self.content.product_reference_key) {
            return Err(SyncError::Config(format!(
                "Product reference '{}' must be a cross-reference key",
                self.content.product_reference_key
            )));
        }

        Ok(())
    }
}
