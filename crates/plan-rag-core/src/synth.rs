//! Metadata synthesizer.
//!
//! Asks a [`Generator`] for structured metadata about a plan and validates
//! the reply against a [`MetadataSchema`] before anything is merged into a
//! document.
//!
//! Two entry points:
//!
//! - [`MetadataSynthesizer::enrich`] is best-effort. Any failure is logged
//!   and the document is left untouched, so enrichment never fails an
//!   ingestion.
//! - [`MetadataSynthesizer::describe_table`] backs donations that arrive
//!   without a title or description. Here a failure is an error, because
//!   the caller needs the title and description to continue.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{RagError, Result, UpstreamContext};
use crate::generation::{json_payload, GenerateOptions, Generator};
use crate::metadata::{Metadata, MetadataSchema, RESERVED_KEYS};
use crate::models::{Plan, Table};
use crate::prompts;

/// Title, description and metadata proposed for a bare table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescription {
    pub title: String,
    pub description: String,
    pub metadata: Metadata,
}

#[derive(Clone)]
pub struct MetadataSynthesizer {
    generator: Arc<dyn Generator>,
    schema: MetadataSchema,
    temperature: Option<f32>,
}

impl MetadataSynthesizer {
    pub fn new(generator: Arc<dyn Generator>, schema: MetadataSchema) -> Self {
        Self {
            generator,
            schema,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn options(&self) -> GenerateOptions {
        GenerateOptions {
            temperature: self.temperature,
            ..GenerateOptions::json()
        }
    }

    /// Ask the model for schema fields describing `plan`.
    ///
    /// A failed call is [`RagError::Upstream`]; a reply that does not parse
    /// or validate is [`RagError::SchemaMismatch`].
    pub async fn generate_metadata(&self, plan: &Plan) -> Result<Metadata> {
        let prompt = prompts::enrich(plan, &self.schema);
        let raw = self
            .generator
            .generate(&prompt, &self.options())
            .await
            .upstream("generate metadata")?;
        self.schema.parse(&raw)
    }

    /// Merge synthesized metadata into `metadata`, skipping on any failure.
    ///
    /// Reserved keys already present in `metadata` are never overwritten.
    /// Returns whether anything was merged.
    pub async fn enrich(&self, plan: &Plan, metadata: &mut Metadata) -> bool {
        match self.generate_metadata(plan).await {
            Ok(extra) => {
                metadata.merge(extra, RESERVED_KEYS);
                true
            }
            Err(e) => {
                tracing::warn!(title = %plan.title, error = %e, "metadata enrichment skipped");
                false
            }
        }
    }

    /// Ask the model to title and describe `table`.
    ///
    /// The reply must carry non-empty `title` and `description` strings. A
    /// `metadata` part that fails the schema is dropped with a warning.
    pub async fn describe_table(&self, table: &Table) -> Result<TableDescription> {
        let prompt = prompts::describe_table(table, &self.schema);
        let raw = self
            .generator
            .generate(&prompt, &self.options())
            .await
            .upstream("describe table")?;

        let value: Value = serde_json::from_str(json_payload(&raw))
            .map_err(|e| RagError::upstream_msg("describe table", format!("invalid JSON reply: {}", e)))?;

        let title = required_text(&value, "title")?;
        let description = required_text(&value, "description")?;

        let metadata = match value.get("metadata") {
            None | Some(Value::Null) => Metadata::new(),
            Some(meta) => self.schema.validate(meta).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "dropping metadata from table description");
                Metadata::new()
            }),
        };

        Ok(TableDescription {
            title,
            description,
            metadata,
        })
    }
}

fn required_text(value: &Value, key: &str) -> Result<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            RagError::upstream_msg("describe table", format!("reply is missing '{}'", key))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataValue;
    use crate::models::{Cell, Row};
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct Canned(std::result::Result<String, String>);

    #[async_trait]
    impl Generator for Canned {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _prompt: &str, options: &GenerateOptions) -> anyhow::Result<String> {
            assert_eq!(options.format, crate::generation::ResponseFormat::Json);
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }

    fn synth(reply: std::result::Result<&str, &str>) -> MetadataSynthesizer {
        let reply = reply.map(str::to_string).map_err(str::to_string);
        MetadataSynthesizer::new(Arc::new(Canned(reply)), MetadataSchema::default())
    }

    fn plan() -> Plan {
        Plan {
            title: "Easy 1500".into(),
            description: "Aerobic base".into(),
            table: Table(vec![Row::new(vec![Cell::Number(3.0), Cell::Number(500.0)])]),
        }
    }

    #[tokio::test]
    async fn test_enrich_merges_valid_reply() {
        let s = synth(Ok(r#"{"category": "endurance", "difficulty": "beginner"}"#));
        let mut meta = plan().to_metadata();
        assert!(s.enrich(&plan(), &mut meta).await);
        assert_eq!(meta.get("category"), Some(&MetadataValue::Text("endurance".into())));
        assert_eq!(meta.get("title"), Some(&MetadataValue::Text("Easy 1500".into())));
    }

    #[tokio::test]
    async fn test_enrich_invalid_json_leaves_metadata_unchanged() {
        let s = synth(Ok("not json at all"));
        let mut meta = plan().to_metadata();
        let before = meta.clone();
        assert!(!s.enrich(&plan(), &mut meta).await);
        assert_eq!(meta, before);
    }

    #[tokio::test]
    async fn test_enrich_model_failure_is_skipped() {
        let s = synth(Err("quota exceeded"));
        let mut meta = plan().to_metadata();
        let before = meta.clone();
        assert!(!s.enrich(&plan(), &mut meta).await);
        assert_eq!(meta, before);
    }

    #[tokio::test]
    async fn test_generate_metadata_schema_mismatch() {
        let s = synth(Ok(r#"{"difficulty": "impossible"}"#));
        let err = s.generate_metadata(&plan()).await.unwrap_err();
        assert!(matches!(err, RagError::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn test_describe_table() {
        let s = synth(Ok(
            r#"```json
{"title": "Pyramid", "description": "Up and down", "metadata": {"category": "sprint", "difficulty": "advanced"}}
```"#,
        ));
        let desc = s.describe_table(&plan().table).await.unwrap();
        assert_eq!(desc.title, "Pyramid");
        assert_eq!(desc.description, "Up and down");
        assert_eq!(desc.metadata.len(), 2);
    }

    #[tokio::test]
    async fn test_describe_table_drops_bad_metadata() {
        let s = synth(Ok(r#"{"title": "Pyramid", "description": "Up and down", "metadata": {"colour": "red"}}"#));
        let desc = s.describe_table(&plan().table).await.unwrap();
        assert!(desc.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_describe_table_requires_title() {
        let s = synth(Ok(r#"{"description": "Up and down"}"#));
        let err = s.describe_table(&plan().table).await.unwrap_err();
        assert!(matches!(err, RagError::Upstream { .. }));
    }
}
