//! Prompt templates.
//!
//! Every prompt asks for a single JSON object so that replies can be
//! parsed with serde. Retrieved context is always listed best match first.

use crate::metadata::MetadataSchema;
use crate::models::{Plan, Table};
use crate::router::QueryMethod;
use crate::store::ScoredDocument;

const PLAN_REPLY_SHAPE: &str = r#"{"title": string, "description": string, "table": [{"cells": [number | string, ...], "sum": number}, ...]}"#;

/// Ask for structured metadata describing an existing plan.
pub fn enrich(plan: &Plan, schema: &MetadataSchema) -> String {
    format!(
        "You classify training plans.\n\
         \n\
         Title: {}\n\
         Description: {}\n\
         Table (one row per line, cells separated by '|', row sum after '='):\n{}\n\
         Reply with {}\n\
         Use only information present in the plan. Omit optional keys you cannot infer.",
        plan.title,
        plan.description,
        plan.table,
        schema.describe()
    )
}

/// Ask for a title, description and metadata for a bare table.
pub fn describe_table(table: &Table, schema: &MetadataSchema) -> String {
    format!(
        "You name and describe training plans.\n\
         \n\
         Table (one row per line, cells separated by '|', row sum after '='):\n{}\n\
         Reply with a JSON object with exactly these keys:\n\
         - \"title\": a short title for the plan\n\
         - \"description\": one or two sentences describing the plan\n\
         - \"metadata\": {}",
        table,
        schema.describe()
    )
}

/// Augmented query prompt for the given method.
pub fn query(content: &str, method: QueryMethod, context: &[ScoredDocument]) -> String {
    let mut prompt = String::new();
    prompt.push_str("You answer requests for training plans using the plans below.\n\n");
    prompt.push_str("Request: ");
    prompt.push_str(content);
    prompt.push_str("\n\n");

    match method {
        QueryMethod::Choose => prompt.push_str(
            "Pick the single plan below that best fits the request and return it unchanged. \
             Copy every table cell exactly as written.\n",
        ),
        QueryMethod::Generate => prompt.push_str(
            "Write a new plan that fits the request, using the plans below as reference. \
             Every table row must have the same number of cells.\n",
        ),
    }

    prompt.push_str("Reply with a JSON object of the form ");
    prompt.push_str(PLAN_REPLY_SHAPE);
    prompt.push_str("\n\nPlans:\n");

    if context.is_empty() {
        prompt.push_str("(none)\n");
    }
    for (i, hit) in context.iter().enumerate() {
        prompt.push_str(&format!("--- plan {} ---\n{}\n", i + 1, hit.document.text.trim_end()));
    }
    prompt
}
