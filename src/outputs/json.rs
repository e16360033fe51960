//! JSON output: stage result files and the per-item article tables.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── images/
//! │   └── qwhzkeptma.png
//! ├── articles_0.json
//! └── articles_1.json
//! ```

use crate::errors::CaptureError;
use crate::models::EnrichedArticle;
use crate::workitems::{WorkItemOutcome, as_object, require_keys};
use chrono::DateTime;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// One row of an exported article table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub title: String,
    /// RFC 3339, `null` when the article had no date.
    pub date: Option<String>,
    pub description: String,
    pub image_path: Option<String>,
    pub search_phrase_occurrences: usize,
    pub has_amount: bool,
}

impl From<EnrichedArticle> for ExportRow {
    fn from(article: EnrichedArticle) -> Self {
        let date = article
            .record
            .date
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|d| d.to_rfc3339());
        Self {
            title: article.record.title,
            date,
            description: article.record.description,
            image_path: article.image_path,
            search_phrase_occurrences: article.search_phrase_occurrences,
            has_amount: article.has_amount,
        }
    }
}

pub fn export_rows(payload: &Value) -> Result<Vec<ExportRow>, CaptureError> {
    let map = as_object(payload)?;
    require_keys(map, &["search_result"])?;
    let articles: Vec<EnrichedArticle> = serde_json::from_value(map["search_result"].clone())?;
    Ok(articles.into_iter().map(ExportRow::from).collect())
}

/// Write the article table of work item `index` into `output_dir`.
pub async fn write_table(
    index: usize,
    payload: &Value,
    output_dir: &Path,
) -> Result<PathBuf, CaptureError> {
    let rows = export_rows(payload)?;
    let path = output_dir.join(format!("articles_{index}.json"));
    fs::write(&path, serde_json::to_string_pretty(&rows)?).await?;
    info!(path = %path.display(), rows = rows.len(), "Wrote article table");
    Ok(path)
}

/// Export every done item. Items that already failed pass through.
#[instrument(level = "info", skip_all, fields(items = items.len(), output_dir = %output_dir.display()))]
pub async fn export_all(items: Vec<WorkItemOutcome>, output_dir: &Path) -> Vec<WorkItemOutcome> {
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if !item.is_done() {
            out.push(item);
            continue;
        }
        match write_table(index, &item.payload, output_dir).await {
            Ok(_) => out.push(item),
            Err(e) => {
                error!(index, code = %e.code(), error = %e, "Failed to export work item");
                out.push(WorkItemOutcome::failed(item.payload, &e));
            }
        }
    }
    out
}

/// Write a stage's outcomes as a JSON array.
#[instrument(level = "info", skip_all, fields(path = %path.display(), items = outcomes.len()))]
pub async fn write_outcomes(outcomes: &[WorkItemOutcome], path: &Path) -> Result<(), CaptureError> {
    let json = serde_json::to_string_pretty(outcomes)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "Failed to create output dir");
            return Err(e.into());
        }
    }
    fs::write(path, json).await?;
    let failed = outcomes.iter().filter(|o| !o.is_done()).count();
    info!(failed, "Wrote work-item outcomes");
    Ok(())
}
