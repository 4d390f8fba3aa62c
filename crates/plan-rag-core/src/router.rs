//! Query router.
//!
//! A query runs one similarity search, builds one augmented prompt and makes
//! exactly one model call. The reply is validated for the requested
//! [`QueryMethod`] and handed to the answer assembler, which recomputes all
//! sums. Nothing is retried.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use crate::answer;
use crate::error::{RagError, Result, UpstreamContext};
use crate::generation::{json_payload, GenerateOptions, Generator};
use crate::models::{Answer, Plan, Table};
use crate::prompts;
use crate::store::{DocumentStore, MetadataFilter};

/// Default number of documents retrieved per query.
pub const DEFAULT_TOP_K: usize = 10;

/// How the answer is produced from the retrieved plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMethod {
    /// Return one retrieved plan verbatim.
    Choose,
    /// Synthesize a new plan using the retrieved ones as context.
    Generate,
}

impl QueryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMethod::Choose => "choose",
            QueryMethod::Generate => "generate",
        }
    }
}

impl fmt::Display for QueryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryMethod {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "choose" => Ok(QueryMethod::Choose),
            "generate" => Ok(QueryMethod::Generate),
            other => Err(RagError::validation(format!("unsupported method: {}", other))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlanReply {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    table: Table,
}

pub struct QueryRouter {
    store: DocumentStore,
    generator: Arc<dyn Generator>,
    top_k: usize,
    temperature: Option<f32>,
}

impl QueryRouter {
    pub fn new(store: DocumentStore, generator: Arc<dyn Generator>) -> Self {
        Self {
            store,
            generator,
            top_k: DEFAULT_TOP_K,
            temperature: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Answer `content` using plans matching `filter`.
    ///
    /// `method` must be `"choose"` or `"generate"`; anything else, or empty
    /// content, is rejected before the store or model is touched.
    pub async fn query(&self, content: &str, filter: &MetadataFilter, method: &str) -> Result<Answer> {
        let method: QueryMethod = method.parse()?;
        if content.trim().is_empty() {
            return Err(RagError::validation("content must not be empty"));
        }

        let hits = self.store.similarity_search(content, self.top_k, filter).await?;
        tracing::debug!(method = %method, hits = hits.len(), "retrieved context");

        let retrieved: Vec<Plan> = hits
            .iter()
            .filter_map(|h| Plan::from_document(&h.document))
            .collect();
        if method == QueryMethod::Choose && retrieved.is_empty() {
            return Err(RagError::upstream_msg(
                "choose plan",
                "no stored plans match the query",
            ));
        }

        let prompt = prompts::query(content, method, &hits);
        let options = GenerateOptions {
            temperature: self.temperature,
            ..GenerateOptions::json()
        };
        let raw = self
            .generator
            .generate(&prompt, &options)
            .await
            .upstream("generate answer")?;

        let reply: PlanReply = serde_json::from_str(json_payload(&raw)).map_err(|e| {
            RagError::upstream_msg("parse answer", format!("malformed model output: {}", e))
        })?;

        let plan = match method {
            QueryMethod::Choose => choose(reply, retrieved)?,
            QueryMethod::Generate => generated(reply)?,
        };
        Ok(answer::assemble(plan))
    }
}

/// The reply must reproduce one retrieved table; that stored plan is returned.
fn choose(reply: PlanReply, retrieved: Vec<Plan>) -> Result<Plan> {
    retrieved
        .into_iter()
        .find(|p| p.table.same_cells(&reply.table))
        .ok_or_else(|| {
            RagError::upstream_msg("parse answer", "chosen table does not match any retrieved plan")
        })
}

fn generated(reply: PlanReply) -> Result<Plan> {
    if reply.table.is_empty() {
        return Err(RagError::upstream_msg("parse answer", "generated table is empty"));
    }
    if reply.table.uniform_width().is_none() {
        return Err(RagError::upstream_msg(
            "parse answer",
            "generated rows have differing column counts",
        ));
    }
    Ok(Plan {
        title: reply.title,
        description: reply.description,
        table: reply.table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!("choose".parse::<QueryMethod>().unwrap(), QueryMethod::Choose);
        assert_eq!("generate".parse::<QueryMethod>().unwrap(), QueryMethod::Generate);
        let err = "summarize".parse::<QueryMethod>().unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "invalid argument: unsupported method: summarize");
        assert!("Choose".parse::<QueryMethod>().is_err());
    }

    #[test]
    fn test_generated_requires_uniform_rows() {
        let reply: PlanReply = serde_json::from_str(
            r#"{"title": "t", "description": "d", "table": [{"cells": [1, 2]}, {"cells": [3]}]}"#,
        )
        .unwrap();
        assert!(generated(reply).is_err());

        let empty: PlanReply = serde_json::from_str(r#"{"title": "t", "table": []}"#).unwrap();
        assert!(generated(empty).is_err());
    }
}
