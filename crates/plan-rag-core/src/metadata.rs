//! Typed document metadata and the schema that guards the merge boundary.
//!
//! Metadata is a flat mapping from keys to scalar [`MetadataValue`]s. Keys
//! produced by the metadata synthesizer are validated against a
//! [`MetadataSchema`] before they are merged into a document; anything else
//! (the reserved plan keys, caller-supplied extras) is carried through as-is.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{RagError, Result};
use crate::models::{format_number, META_DESCRIPTION, META_TABLE, META_TITLE, META_URL};

/// Keys owned by the pipeline. Schema fields may not use them.
pub const RESERVED_KEYS: &[&str] = &[
    META_TITLE,
    META_DESCRIPTION,
    META_TABLE,
    META_URL,
    "user_id",
    "plan_id",
    "source",
];

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The string form compared against search filter values.
    pub fn filter_string(&self) -> String {
        match self {
            MetadataValue::Bool(b) => b.to_string(),
            MetadataValue::Integer(i) => i.to_string(),
            MetadataValue::Float(f) => format_number(*f),
            MetadataValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

/// Flat, ordered key → value mapping attached to a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetadataValue>);

impl Metadata {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    /// Merge `other` into `self`. Incoming keys overwrite existing ones,
    /// except keys listed in `protected`, which keep their current value.
    pub fn merge(&mut self, other: Metadata, protected: &[&str]) {
        for (key, value) in other.0 {
            if protected.contains(&key.as_str()) && self.0.contains_key(&key) {
                continue;
            }
            self.0.insert(key, value);
        }
    }

    /// True when every filter key is present with an equal value.
    /// An empty filter matches everything.
    pub fn matches(&self, filter: &HashMap<String, String>) -> bool {
        filter.iter().all(|(key, expected)| {
            self.0
                .get(key)
                .map(|v| v.filter_string() == *expected)
                .unwrap_or(false)
        })
    }
}

/// Value kinds a schema field can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Bool,
    /// One of the field's `options`.
    Enum,
    /// A JSON array of strings, stored joined by `", "`.
    Tags,
}

/// One schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl FieldSpec {
    fn new(name: &str, kind: FieldKind, required: bool, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required,
            options: Vec::new(),
            description: description.to_string(),
        }
    }

    fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    fn convert(&self, value: &serde_json::Value) -> Result<MetadataValue> {
        let mismatch = |expected: &str| {
            RagError::SchemaMismatch(format!(
                "field '{}' expects {}, got {}",
                self.name, expected, value
            ))
        };
        match self.kind {
            FieldKind::Text => value
                .as_str()
                .map(|s| MetadataValue::Text(s.trim().to_string()))
                .ok_or_else(|| mismatch("a string")),
            FieldKind::Integer => value
                .as_i64()
                .or_else(|| {
                    value
                        .as_f64()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| f as i64)
                })
                .map(MetadataValue::Integer)
                .ok_or_else(|| mismatch("an integer")),
            FieldKind::Float => value
                .as_f64()
                .map(MetadataValue::Float)
                .ok_or_else(|| mismatch("a number")),
            FieldKind::Bool => value
                .as_bool()
                .map(MetadataValue::Bool)
                .ok_or_else(|| mismatch("a boolean")),
            FieldKind::Enum => {
                let raw = value.as_str().ok_or_else(|| mismatch("a string"))?;
                self.options
                    .iter()
                    .find(|o| o.eq_ignore_ascii_case(raw.trim()))
                    .map(|o| MetadataValue::Text(o.clone()))
                    .ok_or_else(|| mismatch(&format!("one of [{}]", self.options.join(", "))))
            }
            FieldKind::Tags => {
                let items = value.as_array().ok_or_else(|| mismatch("a list of strings"))?;
                let mut tags = Vec::with_capacity(items.len());
                for item in items {
                    let tag = item.as_str().ok_or_else(|| mismatch("a list of strings"))?;
                    let tag = tag.trim();
                    if !tag.is_empty() {
                        tags.push(tag.to_string());
                    }
                }
                Ok(MetadataValue::Text(tags.join(", ")))
            }
        }
    }

    fn describe(&self) -> String {
        let kind = match self.kind {
            FieldKind::Text => "string".to_string(),
            FieldKind::Integer => "integer".to_string(),
            FieldKind::Float => "number".to_string(),
            FieldKind::Bool => "boolean".to_string(),
            FieldKind::Enum => format!("one of: {}", self.options.join(" | ")),
            FieldKind::Tags => "array of strings".to_string(),
        };
        let required = if self.required { ", required" } else { "" };
        if self.description.is_empty() {
            format!("- \"{}\" ({}{})", self.name, kind, required)
        } else {
            format!(
                "- \"{}\" ({}{}): {}",
                self.name, kind, required, self.description
            )
        }
    }
}

/// The set of fields the metadata synthesizer may produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSchema {
    pub fields: Vec<FieldSpec>,
}

impl Default for MetadataSchema {
    /// Fields describing a training plan.
    fn default() -> Self {
        Self {
            fields: vec![
                FieldSpec::new(
                    "category",
                    FieldKind::Text,
                    true,
                    "kind of plan, e.g. endurance, sprint, technique, recovery",
                ),
                FieldSpec::new(
                    "difficulty",
                    FieldKind::Enum,
                    true,
                    "who the plan is suitable for",
                )
                .with_options(&["beginner", "intermediate", "advanced"]),
                FieldSpec::new("focus", FieldKind::Text, false, "main skill or energy system trained"),
                FieldSpec::new(
                    "duration_minutes",
                    FieldKind::Integer,
                    false,
                    "estimated time to complete the plan",
                ),
                FieldSpec::new("tags", FieldKind::Tags, false, "short keywords"),
                FieldSpec::new(
                    "for_competition",
                    FieldKind::Bool,
                    false,
                    "whether the plan targets race preparation",
                ),
            ],
        }
    }
}

impl MetadataSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Check the schema definition itself: unique, non-reserved names and
    /// options for every enum field.
    pub fn check(&self) -> anyhow::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            anyhow::ensure!(!field.name.trim().is_empty(), "metadata field name must not be empty");
            anyhow::ensure!(
                !RESERVED_KEYS.contains(&field.name.as_str()),
                "metadata field '{}' uses a reserved key",
                field.name
            );
            anyhow::ensure!(
                seen.insert(field.name.as_str()),
                "duplicate metadata field '{}'",
                field.name
            );
            if field.kind == FieldKind::Enum {
                anyhow::ensure!(
                    !field.options.is_empty(),
                    "enum field '{}' needs options",
                    field.name
                );
            }
        }
        Ok(())
    }

    fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Human-readable description embedded in synthesizer prompts.
    pub fn describe(&self) -> String {
        let lines: Vec<String> = self.fields.iter().map(FieldSpec::describe).collect();
        format!(
            "A JSON object with the following keys and no others:\n{}",
            lines.join("\n")
        )
    }

    /// Validate a parsed JSON object and convert it into typed metadata.
    ///
    /// Fails on non-objects, unknown keys, values of the wrong kind, and
    /// missing required fields. `null` values count as absent.
    pub fn validate(&self, value: &serde_json::Value) -> Result<Metadata> {
        let object = value.as_object().ok_or_else(|| {
            RagError::SchemaMismatch(format!("expected a JSON object, got {}", value))
        })?;

        let mut meta = Metadata::new();
        for (key, raw) in object {
            let field = self
                .field(key)
                .ok_or_else(|| RagError::SchemaMismatch(format!("unknown field '{}'", key)))?;
            if raw.is_null() {
                continue;
            }
            meta.insert(key.clone(), field.convert(raw)?);
        }

        for field in self.fields.iter().filter(|f| f.required) {
            if !meta.contains_key(&field.name) {
                return Err(RagError::SchemaMismatch(format!(
                    "missing required field '{}'",
                    field.name
                )));
            }
        }

        Ok(meta)
    }

    /// Parse raw model output and validate it.
    pub fn parse(&self, raw: &str) -> Result<Metadata> {
        let value: serde_json::Value = serde_json::from_str(crate::generation::json_payload(raw))
            .map_err(|e| RagError::SchemaMismatch(format!("invalid JSON: {}", e)))?;
        self.validate(&value)
    }
}
