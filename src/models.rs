//! Data models for extracted articles and their exported representations.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Article`]: one article as extracted from a search results page
//! - [`ArticleSet`]: insertion-ordered collection deduplicated by source URL
//! - [`ArticleRecord`]: the field map handed to downstream stages
//! - [`EnrichedArticle`]: a record plus derived signals (counts, money flag, image)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tracing::debug;

/// A single article extracted from one content node.
///
/// Immutable once built. Two articles are equal when both `source_url` and
/// `published_at` match; the hash only covers `source_url`, so re-fetched
/// copies of the same story land in the same bucket.
#[derive(Debug, Clone)]
pub struct Article {
    title: String,
    description: String,
    published_at: Option<DateTime<Utc>>,
    picture_url: String,
    source_url: String,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        published_at: Option<DateTime<Utc>>,
        picture_url: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            published_at,
            picture_url: picture_url.into(),
            source_url: source_url.into(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Publication date, `None` when the date text could not be parsed.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    pub fn picture_url(&self) -> &str {
        &self.picture_url
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn to_record(&self) -> ArticleRecord {
        ArticleRecord {
            title: self.title.clone(),
            description: self.description.clone(),
            date: self.published_at.map(|d| d.timestamp()),
            picture_url: self.picture_url.clone(),
        }
    }
}

impl PartialEq for Article {
    fn eq(&self, other: &Self) -> bool {
        self.source_url == other.source_url && self.published_at == other.published_at
    }
}

impl Eq for Article {}

impl Hash for Article {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source_url.hash(state);
    }
}

/// Articles deduplicated by source URL, in first-seen order.
///
/// A plain `HashSet<Article>` would keep two copies of a story whose date text
/// resolved differently between reads, because equality also compares dates.
/// Keying by URL collapses them; the first copy seen wins.
#[derive(Debug, Default, Clone)]
pub struct ArticleSet {
    index: HashMap<String, usize>,
    articles: Vec<Article>,
}

impl ArticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an article. Returns `false` if its URL was already present.
    ///
    /// Articles without a link all share the empty URL, so only the first of
    /// them is kept.
    pub fn insert(&mut self, article: Article) -> bool {
        if let Some(&kept) = self.index.get(article.source_url()) {
            debug!(
                url = article.source_url(),
                dropped = article.title(),
                kept = self.articles[kept].title(),
                "Collapsed duplicate article"
            );
            return false;
        }
        self.index
            .insert(article.source_url().to_string(), self.articles.len());
        self.articles.push(article);
        true
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Article> {
        self.articles.iter()
    }

    pub fn into_vec(self) -> Vec<Article> {
        self.articles
    }

    pub fn to_records(&self) -> Vec<ArticleRecord> {
        self.articles.iter().map(Article::to_record).collect()
    }
}

impl Extend<Article> for ArticleSet {
    fn extend<T: IntoIterator<Item = Article>>(&mut self, iter: T) {
        for article in iter {
            self.insert(article);
        }
    }
}

/// Wire form of an [`Article`] as stored in a work item's `search_result`.
///
/// `date` is unix seconds; `null` when the page showed no parseable date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub description: String,
    pub date: Option<i64>,
    pub picture_url: String,
}

/// An [`ArticleRecord`] with the signals added by the enrichment stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedArticle {
    #[serde(flatten)]
    pub record: ArticleRecord,
    /// How many times the search phrase occurs in title + description.
    pub search_phrase_occurrences: usize,
    /// Whether title or description mentions an amount of money.
    pub has_amount: bool,
    /// Local path of the downloaded picture, if the download succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}
