// WHY: Label vocabulary is injected configuration, never process-wide state.
// File loading lives here so the pipeline core only sees a ready LabelConfig

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Canonical type returned for labels missing from the map
pub const UNSUPPORTED: &str = "UNSUPPORTED";

/// Template used by the bundled presets; `{}` receives the entity type
pub const DEFAULT_EXPLANATION: &str =
    "Identified as {} by transformers's Named Entity Recognition";

/// Entity types accepted by the bundled presets
pub const DEFAULT_SUPPORTED_ENTITIES: &[&str] = &[
    "LOCATION",
    "PERSON",
    "ORGANIZATION",
    "AGE",
    "ID",
    "PHONE_NUMBER",
    "EMAIL",
    "DATE_TIME",
];

/// Raw model label -> canonical entity type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelMap(BTreeMap<String, String>);

impl LabelMap {
    pub fn insert(&mut self, label: impl Into<String>, entity_type: impl Into<String>) {
        self.0.insert(label.into(), entity_type.into());
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.0.get(label).map(String::as_str)
    }

    /// Canonical type for a label, or [`UNSUPPORTED`] when unmapped
    pub fn resolve(&self, label: &str) -> &str {
        self.get(label).unwrap_or(UNSUPPORTED)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn default_ignore_labels() -> BTreeSet<String> {
    BTreeSet::from(["O".to_string()])
}

fn default_explanation_template() -> String {
    DEFAULT_EXPLANATION.to_string()
}

/// Everything the normalizer needs to canonicalize model labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelConfig {
    pub label_map: LabelMap,
    pub supported_entities: BTreeSet<String>,
    /// Labels meaning "no entity", dropped before lookup
    #[serde(default = "default_ignore_labels")]
    pub ignore_labels: BTreeSet<String>,
    /// `{}` or `{entity_type}` receives the type, `{score}` the rounded score
    #[serde(default = "default_explanation_template")]
    pub explanation_template: String,
}

impl LabelConfig {
    pub fn new(label_map: LabelMap, supported_entities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            label_map,
            supported_entities: supported_entities.into_iter().map(Into::into).collect(),
            ignore_labels: default_ignore_labels(),
            explanation_template: default_explanation_template(),
        }
    }

    /// Mapping for the Stanford AIMI de-identifier model
    pub fn stanford_deidentifier() -> Self {
        let label_map = LabelMap::from_iter([
            ("PER", "PERSON"),
            ("PERSON", "PERSON"),
            ("LOC", "LOCATION"),
            ("ORG", "ORGANIZATION"),
            ("AGE", "AGE"),
            ("ID", "ID"),
            ("PATIENT", "PERSON"),
            ("HCW", "PERSON"),
            ("HOSPITAL", "LOCATION"),
            ("PATORG", "ORGANIZATION"),
            ("DATE", "DATE_TIME"),
            ("PHONE", "PHONE_NUMBER"),
            ("VENDOR", "ORGANIZATION"),
        ]);
        Self::new(label_map, DEFAULT_SUPPORTED_ENTITIES.iter().copied())
    }

    /// Mapping for the `obi/deid_roberta_i2b2` model
    pub fn bert_deid() -> Self {
        let label_map = LabelMap::from_iter([
            ("PER", "PERSON"),
            ("LOC", "LOCATION"),
            ("ORG", "ORGANIZATION"),
            ("AGE", "AGE"),
            ("ID", "ID"),
            ("EMAIL", "EMAIL"),
            ("PATIENT", "PERSON"),
            ("STAFF", "PERSON"),
            ("HOSP", "ORGANIZATION"),
            ("PATORG", "ORGANIZATION"),
            ("DATE", "DATE_TIME"),
            ("PHONE", "PHONE_NUMBER"),
        ]);
        Self::new(label_map, DEFAULT_SUPPORTED_ENTITIES.iter().copied())
    }

    /// Look up a bundled preset by name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "stanford" => Some(Self::stanford_deidentifier()),
            "bert-deid" => Some(Self::bert_deid()),
            _ => None,
        }
    }

    /// Map every supported type onto itself unless already mapped, so
    /// canonical output can be normalized again
    pub fn with_canonical_passthrough(mut self) -> Self {
        for entity_type in &self.supported_entities {
            if self.label_map.get(entity_type).is_none() {
                self.label_map.insert(entity_type.clone(), entity_type.clone());
            }
        }
        self
    }

    pub fn with_ignore_labels(mut self, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ignore_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_explanation_template(mut self, template: impl Into<String>) -> Self {
        self.explanation_template = template.into();
        self
    }

    pub fn is_ignored(&self, label: &str) -> bool {
        self.ignore_labels.contains(label)
    }

    pub fn is_supported(&self, entity_type: &str) -> bool {
        self.supported_entities.contains(entity_type)
    }

    /// Load from a `.toml` or `.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read label config {}", path.display()))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON label config {}", path.display())),
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML label config {}", path.display())),
            other => anyhow::bail!(
                "Unsupported label config extension {:?} for {} (expected .toml or .json)",
                other,
                path.display()
            ),
        }
    }
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self::stanford_deidentifier()
    }
}
