//! Core data models: plans, tables, documents, and answers.
//!
//! Plans are transient: they are built per request and either persisted as
//! [`Document`]s or returned as [`Answer`]s. A document's metadata always
//! carries the plan it was built from under the reserved keys `title`,
//! `description` and `table`, so retrieved documents can be turned back into
//! plans by the query router.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::metadata::{Metadata, MetadataValue};

/// Reserved metadata key holding the plan title.
pub const META_TITLE: &str = "title";
/// Reserved metadata key holding the plan description.
pub const META_DESCRIPTION: &str = "description";
/// Reserved metadata key holding the JSON-encoded table.
pub const META_TABLE: &str = "table";
/// Reserved metadata key holding the page a scraped plan came from.
pub const META_URL: &str = "url";

/// A single table cell: either a number or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(_) => None,
        }
    }

    /// Parse scraped cell text, treating anything numeric as a number.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Cell::Number(n),
            _ => Cell::Text(trimmed.to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(n) => write!(f, "{}", format_number(*n)),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

/// Format a float without a trailing `.0` for integral values.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// One table row. `sum` is never trusted from outside; see [`Row::update_sum`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub sum: f64,
}

impl Row {
    /// Build a row with its sum already computed.
    pub fn new(cells: Vec<Cell>) -> Self {
        let mut row = Self { cells, sum: 0.0 };
        row.update_sum();
        row
    }

    /// Arithmetic sum of the numeric cells.
    pub fn cell_sum(&self) -> f64 {
        self.cells.iter().filter_map(Cell::as_number).sum()
    }

    /// Replace `sum` with the sum of the numeric cells.
    pub fn update_sum(&mut self) {
        self.sum = self.cell_sum();
    }
}

/// An ordered sequence of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table(pub Vec<Row>);

impl Table {
    pub fn rows(&self) -> &[Row] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Column count shared by every row, or `None` for empty or ragged tables.
    pub fn uniform_width(&self) -> Option<usize> {
        let width = self.0.first()?.cells.len();
        self.0
            .iter()
            .all(|r| r.cells.len() == width)
            .then_some(width)
    }

    /// Compare cell contents only, ignoring sums.
    pub fn same_cells(&self, other: &Table) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.cells == b.cells)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[]".to_string())
    }
}

impl fmt::Display for Table {
    /// One line per row: `cell | cell | ... | = sum`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.0 {
            let cells: Vec<String> = row.cells.iter().map(|c| c.to_string()).collect();
            writeln!(f, "{} | = {}", cells.join(" | "), format_number(row.sum))?;
        }
        Ok(())
    }
}

/// A titled, described table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub title: String,
    pub description: String,
    pub table: Table,
}

impl Plan {
    /// Canonical text used as embedding input. Deterministic for a given plan.
    pub fn to_text(&self) -> String {
        format!("{}\n{}\n{}", self.title, self.description, self.table)
    }

    /// Metadata describing the plan itself (reserved keys only).
    pub fn to_metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert(META_TITLE, MetadataValue::Text(self.title.clone()));
        meta.insert(
            META_DESCRIPTION,
            MetadataValue::Text(self.description.clone()),
        );
        meta.insert(META_TABLE, MetadataValue::Text(self.table.to_json()));
        meta
    }

    /// Build the document stored for this plan.
    pub fn to_document(&self) -> Document {
        Document {
            text: self.to_text(),
            metadata: self.to_metadata(),
        }
    }

    /// Reconstruct a plan from a stored document's reserved metadata keys.
    pub fn from_document(doc: &Document) -> Option<Plan> {
        let table_json = doc.metadata.get(META_TABLE)?.as_text()?;
        let table: Table = serde_json::from_str(table_json).ok()?;
        Some(Plan {
            title: doc
                .metadata
                .get(META_TITLE)
                .and_then(|v| v.as_text())
                .unwrap_or_default()
                .to_string(),
            description: doc
                .metadata
                .get(META_DESCRIPTION)
                .and_then(|v| v.as_text())
                .unwrap_or_default()
                .to_string(),
            table,
        })
    }
}

/// A unit of text plus flat metadata, as stored in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A plan discovered by a scraper at `url`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedPlan {
    pub url: String,
    pub plan: Plan,
}

/// A user-contributed plan. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonatedPlan {
    pub user_id: String,
    pub plan_id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub table: Table,
}

impl DonatedPlan {
    pub fn plan(&self) -> Plan {
        Plan {
            title: self.title.clone(),
            description: self.description.clone(),
            table: self.table.clone(),
        }
    }
}

/// The response to a query: a plan whose sums have been recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub title: String,
    pub description: String,
    pub table: Table,
    /// Sum of all row sums.
    pub total: f64,
}
