//! Element locator contract and per-node article extraction.
//!
//! A site describes where each article field lives inside one content node
//! by implementing [`ArticleLocator`]. All locators are relative XPath
//! queries (`.//...`) evaluated against the node, never the whole page, so
//! surrounding layout changes do not affect extraction.
//!
//! Missing optional fields produce empty strings. The only extraction failure
//! is a node going stale while it is being read.

use crate::browser::{BrowserBackend, PageView};
use crate::errors::{BrowserError, CaptureError};
use crate::models::Article;
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static DAY_MONTH_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2} \w{3} \d{4})").expect("valid date regex"));

/// Where to find each field within one content node.
pub trait ArticleLocator {
    const DATE: &'static str;
    const TITLE: &'static str;
    /// Link element, relative to the title element.
    const LINK: &'static str;
    const DESCRIPTION: &'static str;
    const PICTURE: &'static str;

    /// Parse the date element's text; `None` if it holds no recognizable date.
    fn parse_date(text: &str) -> Option<DateTime<Utc>> {
        parse_day_month_year(text)
    }

    /// Strip site boilerplate from the description text.
    fn clean_description(text: &str) -> String {
        text.trim().to_string()
    }
}

/// Find a `19 Aug 2024` style date anywhere in `text`, as UTC midnight.
pub fn parse_day_month_year(text: &str) -> Option<DateTime<Utc>> {
    let found = DAY_MONTH_YEAR.find(text)?;
    let date = NaiveDate::parse_from_str(found.as_str(), "%d %b %Y").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn stale_as_extraction(e: CaptureError) -> CaptureError {
    match e {
        CaptureError::Browser(BrowserError::StaleNode(message)) => CaptureError::Extraction(message),
        other => other,
    }
}

async fn first_text<B: BrowserBackend>(
    page: &mut PageView<'_, B>,
    node: &B::Node,
    xpath: &str,
) -> Result<Option<String>, CaptureError> {
    match page.find_first_within(node, xpath).await? {
        Some(el) => Ok(Some(page.text(&el).await?)),
        None => Ok(None),
    }
}

/// Read and parse the date field of `node`.
pub async fn read_date<B: BrowserBackend, L: ArticleLocator>(
    page: &mut PageView<'_, B>,
    node: &B::Node,
) -> Result<Option<DateTime<Utc>>, CaptureError> {
    let text = first_text(page, node, L::DATE)
        .await
        .map_err(stale_as_extraction)?;
    Ok(text.as_deref().and_then(L::parse_date))
}

/// Build an [`Article`] from `node`, reusing an already parsed date.
pub async fn extract_article<B: BrowserBackend, L: ArticleLocator>(
    page: &mut PageView<'_, B>,
    node: &B::Node,
    published_at: Option<DateTime<Utc>>,
) -> Result<Article, CaptureError> {
    read_fields::<B, L>(page, node, published_at)
        .await
        .map_err(stale_as_extraction)
}

async fn read_fields<B: BrowserBackend, L: ArticleLocator>(
    page: &mut PageView<'_, B>,
    node: &B::Node,
    published_at: Option<DateTime<Utc>>,
) -> Result<Article, CaptureError> {
    let title_el = page.find_first_within(node, L::TITLE).await?;
    let (title, source_url) = match title_el {
        Some(el) => {
            let title = page.text(&el).await?.trim().to_string();
            let href = match page.find_first_within(&el, L::LINK).await? {
                Some(link) => page.attr(&link, "href").await?,
                None => None,
            };
            (title, href.unwrap_or_default())
        }
        None => (String::new(), String::new()),
    };

    let description = first_text(page, node, L::DESCRIPTION)
        .await?
        .map(|text| L::clean_description(&text))
        .unwrap_or_default();

    let picture_url = match page.find_first_within(node, L::PICTURE).await? {
        Some(img) => page.attr(&img, "src").await?.unwrap_or_default(),
        None => String::new(),
    };

    Ok(Article::new(title, description, published_at, picture_url, source_url))
}
