//! Plan export to PDF.
//!
//! Rendering and storage are separate capabilities so the HTTP handler and
//! the `prag export` command can share [`export_plan`] while tests swap in
//! their own uploader.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};

use plan_rag_core::answer;
use plan_rag_core::models::{format_number, Plan};

use crate::config::Config;

/// Turns a plan into a document.
pub trait PlanRenderer: Send + Sync {
    fn content_type(&self) -> &str;
    fn extension(&self) -> &str;
    fn render(&self, plan: &Plan) -> Result<Vec<u8>>;
}

/// Stores rendered bytes and returns where they can be fetched.
#[async_trait]
pub trait PlanUploader: Send + Sync {
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<String>;
}

/// Render `plan` and upload it under a fresh `plan-<uuid>` name.
pub async fn export_plan(
    renderer: &dyn PlanRenderer,
    uploader: &dyn PlanUploader,
    plan: &Plan,
) -> Result<String> {
    let bytes = renderer.render(plan).context("Failed to render plan")?;
    let name = format!("plan-{}.{}", uuid::Uuid::new_v4(), renderer.extension());
    let uri = uploader
        .upload(&name, bytes)
        .await
        .context("Failed to upload plan")?;
    tracing::info!(uri = %uri, content_type = renderer.content_type(), "plan exported");
    Ok(uri)
}

// ============ PDF ============

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const FONT_SIZE: i64 = 10;
const LEADING: i64 = 14;
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;
const WRAP_COLUMNS: usize = 85;

/// A4 pages of monospaced text: title, description, one line per row with
/// its recomputed sum, and the grand total.
#[derive(Default)]
pub struct PdfRenderer;

impl PdfRenderer {
    pub fn new() -> Self {
        Self
    }

    fn lines(plan: &Plan) -> Vec<String> {
        let answer = answer::assemble(plan.clone());
        let mut lines = Vec::new();
        lines.extend(wrap(&answer.title, WRAP_COLUMNS));
        lines.push(String::new());
        lines.extend(wrap(&answer.description, WRAP_COLUMNS));
        lines.push(String::new());
        for row in answer.table.rows() {
            let cells: Vec<String> = row.cells.iter().map(|c| c.to_string()).collect();
            let line = format!("{} | = {}", cells.join(" | "), format_number(row.sum));
            lines.extend(wrap(&line, WRAP_COLUMNS));
        }
        lines.push(String::new());
        lines.push(format!("Total: {}", format_number(answer.total)));
        lines
    }
}

impl PlanRenderer for PdfRenderer {
    fn content_type(&self) -> &str {
        "application/pdf"
    }

    fn extension(&self) -> &str {
        "pdf"
    }

    fn render(&self, plan: &Plan) -> Result<Vec<u8>> {
        let lines = Self::lines(plan);

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for page_lines in lines.chunks(LINES_PER_PAGE) {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
                Operation::new("TL", vec![LEADING.into()]),
                Operation::new("Td", vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN).into()]),
            ];
            for line in page_lines {
                operations.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new("ET", vec![]));

            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

/// Greedy word wrap. Words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(width).collect();
            word = word.chars().skip(width).collect();
            lines.push(head);
        }
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

// ============ Local uploader ============

/// Writes files into a directory and returns `file://` URIs.
pub struct LocalUploader {
    dir: PathBuf,
}

impl LocalUploader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl PlanUploader for LocalUploader {
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        let absolute = tokio::fs::canonicalize(&path).await?;
        let uri = url::Url::from_file_path(&absolute)
            .map_err(|_| anyhow::anyhow!("Cannot build file URI for {}", absolute.display()))?;
        Ok(uri.to_string())
    }
}

/// `prag export <file>`: render a plan JSON file to PDF in `export.dir`.
pub async fn run_export(config: &Config, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let plan: Plan = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a plan (title, description, table)", file.display()))?;

    let uri = export_plan(
        &PdfRenderer::new(),
        &LocalUploader::new(&config.export.dir),
        &plan,
    )
    .await?;
    println!("{}", uri);
    Ok(())
}
