//! Enrichment stage: phrase counts, money detection and picture downloads.
//!
//! Reads the `search_result` records written by the capture stage and
//! replaces them with [`EnrichedArticle`]s.

use crate::errors::CaptureError;
use crate::images::ImagePool;
use crate::models::{ArticleRecord, EnrichedArticle};
use crate::workitems::{WorkItemOutcome, as_object, require_keys};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{error, info, instrument};

/// `$11.1`, `$111,111.11`, `11 dollars`, `11 USD`.
static AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\d[\d,]*(?:\.\d+)?|\b\d[\d,]*(?:\.\d+)?\s+(?:dollars|USD)\b")
        .expect("valid amount regex")
});

/// Case-insensitive, non-overlapping count of `phrase` in the title followed
/// directly by the description.
pub fn count_occurrences(phrase: &str, title: &str, description: &str) -> usize {
    let needle = phrase.trim().to_lowercase();
    if needle.is_empty() {
        return 0;
    }
    format!("{title}{description}")
        .to_lowercase()
        .matches(needle.as_str())
        .count()
}

pub fn has_amount(text: &str) -> bool {
    AMOUNT.is_match(text)
}

pub fn enrich_record(record: ArticleRecord, phrase: &str) -> EnrichedArticle {
    let search_phrase_occurrences = count_occurrences(phrase, &record.title, &record.description);
    let has_amount = has_amount(&record.title) || has_amount(&record.description);
    EnrichedArticle {
        record,
        search_phrase_occurrences,
        has_amount,
        image_path: None,
    }
}

async fn enrich_payload(payload: &mut Value, pool: &ImagePool) -> Result<usize, CaptureError> {
    let map = as_object(payload)?;
    require_keys(map, &["search_phrase", "search_result"])?;
    let phrase = map["search_phrase"]
        .as_str()
        .ok_or_else(|| CaptureError::InvalidInput("search_phrase must be a string".to_string()))?
        .to_string();
    let records: Vec<ArticleRecord> = serde_json::from_value(map["search_result"].clone())?;

    let sources: Vec<String> = records.iter().map(|r| r.picture_url.clone()).collect();
    let mut enriched: Vec<EnrichedArticle> = records
        .into_iter()
        .map(|r| enrich_record(r, &phrase))
        .collect();
    for (article, path) in enriched.iter_mut().zip(pool.download_all(&sources).await) {
        article.image_path = path.map(|p| p.display().to_string());
    }

    let count = enriched.len();
    let value = serde_json::to_value(enriched)?;
    if let Some(map) = payload.as_object_mut() {
        map.insert("search_result".to_string(), value);
    }
    Ok(count)
}

/// Enrich one work item. Items that already failed pass through.
pub async fn enrich_item(index: usize, item: WorkItemOutcome, pool: &ImagePool) -> WorkItemOutcome {
    if !item.is_done() {
        return item;
    }
    let mut payload = item.payload;
    match enrich_payload(&mut payload, pool).await {
        Ok(count) => {
            info!(index, count, "Articles enriched");
            WorkItemOutcome::done(payload)
        }
        Err(e) => {
            error!(index, code = %e.code(), error = %e, "Failed to enrich work item");
            WorkItemOutcome::failed(payload, &e)
        }
    }
}

#[instrument(level = "info", skip_all, fields(items = items.len()))]
pub async fn enrich_all(items: Vec<WorkItemOutcome>, pool: &ImagePool) -> Vec<WorkItemOutcome> {
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        out.push(enrich_item(index, item, pool).await);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_count_is_case_insensitive_over_title_and_description() {
        assert_eq!(
            count_occurrences("Silvio Santos", "Silvio Santos dies", "silvio santos was 93. SILVIO SANTOS"),
            3
        );
        assert_eq!(count_occurrences("lula", "Nothing here", ""), 0);
        assert_eq!(count_occurrences("", "anything", "at all"), 0);
    }

    #[test]
    fn test_count_spans_the_title_description_seam() {
        assert_eq!(count_occurrences("ab", "xa", "by"), 1);
    }

    #[test]
    fn test_amount_formats() {
        for text in ["costs $11.1", "worth $111,111.11 now", "paid 11 dollars", "a 11 USD fee", "$5"] {
            assert!(has_amount(text), "{text}");
        }
        for text in ["no money", "11 euros", "USD rates", "$ sign alone"] {
            assert!(!has_amount(text), "{text}");
        }
    }

    #[test]
    fn test_enrich_record() {
        let record = ArticleRecord {
            title: "Lula pledges $1,000,000".to_string(),
            description: "lula speaks".to_string(),
            date: Some(1_724_025_600),
            picture_url: String::new(),
        };
        let enriched = enrich_record(record.clone(), "lula");
        assert_eq!(enriched.record, record);
        assert_eq!(enriched.search_phrase_occurrences, 2);
        assert!(enriched.has_amount);
        assert_eq!(enriched.image_path, None);
    }

    #[tokio::test]
    async fn test_enrich_item_rewrites_search_result() {
        let out = tempfile::tempdir().unwrap();
        let pool = ImagePool::new(out.path(), 2).await.unwrap();
        let item = WorkItemOutcome::done(json!({
            "search_phrase": "brazil",
            "search_result": [
                {"title": "Brazil votes", "description": "10 USD", "date": null, "picture_url": ""}
            ]
        }));

        let out = enrich_item(0, item, &pool).await;
        assert!(out.is_done());
        assert_eq!(
            out.payload["search_result"][0],
            json!({
                "title": "Brazil votes",
                "description": "10 USD",
                "date": null,
                "picture_url": "",
                "search_phrase_occurrences": 1,
                "has_amount": true
            })
        );
    }

    #[tokio::test]
    async fn test_enrich_item_requires_search_result() {
        let out = tempfile::tempdir().unwrap();
        let pool = ImagePool::new(out.path(), 1).await.unwrap();
        let item = WorkItemOutcome::done(json!({"search_phrase": "brazil"}));

        let out = enrich_item(0, item, &pool).await;
        assert!(!out.is_done());
        let report = out.exception.unwrap();
        assert_eq!(report.code, ErrorCode::InvalidInput);
        assert!(report.message.contains("search_result"));
    }
}
