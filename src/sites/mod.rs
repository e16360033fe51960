//! News site drivers.
//!
//! A site is described by a [`NewsSite`] implementation: its search URL, the
//! layout of its results page, and (via [`ArticleLocator`]) where each article
//! field lives. [`SiteDriver`] runs the same navigation protocol for any of
//! them:
//!
//! 1. Open the search URL in a new page and wait for the result list
//! 2. Select a news section, if one was requested and the page offers it
//! 3. Drive a [`ResultCursor`] until exhausted, deduplicating by URL
//! 4. Close the page
//!
//! # Supported Sources
//!
//! | Source | Module | Pagination |
//! |--------|--------|------------|
//! | Al Jazeera | [`aljazeera`] | "Show more" button, newest first |

pub mod aljazeera;

use crate::browser::{BrowserBackend, PageHandle, Session};
use crate::cursor::ResultCursor;
use crate::errors::CaptureError;
use crate::locator::ArticleLocator;
use crate::models::ArticleSet;
use crate::workitems::SearchRequest;
use std::marker::PhantomData;
use tracing::{debug, info, instrument};

/// Layout of a site's search results page.
pub trait NewsSite: ArticleLocator {
    const NAME: &'static str;
    const BASE_URL: &'static str;
    /// Container of all results (absolute).
    const RESULT_LIST: &'static str;
    /// One article, relative to the result list.
    const CONTENT_NODE: &'static str;
    /// Control that loads the next batch of results (absolute).
    const NEXT_PAGE: &'static str;
    /// Indicator shown while a batch is loading (absolute).
    const LOADING: &'static str;
    /// Section filter control, if the site has one (absolute).
    const SECTION_CONTROL: Option<&'static str>;
    /// One selectable section, relative to the section control.
    const SECTION_OPTION: &'static str;

    fn search_url(phrase: &str) -> String;
}

/// Runs the search protocol for site `S`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SiteDriver<S> {
    _site: PhantomData<S>,
}

impl<S: NewsSite> SiteDriver<S> {
    pub fn new() -> Self {
        Self { _site: PhantomData }
    }

    /// Search for `request` and collect every in-window article.
    ///
    /// The results page is opened in its own tab and closed again on every
    /// exit path.
    ///
    /// # Arguments
    ///
    /// * `session` - Open browser session; its other pages are left alone
    /// * `request` - Phrase, optional section and month window
    ///
    /// # Returns
    ///
    /// Articles in the order the site served them, one per URL.
    #[instrument(level = "info", skip_all, fields(site = S::NAME, phrase = %request.search_phrase))]
    pub async fn search<B: BrowserBackend>(
        &self,
        session: &mut Session<B>,
        request: &SearchRequest,
    ) -> Result<ArticleSet, CaptureError> {
        let url = S::search_url(&request.search_phrase);
        session
            .with_page(&url, async |session: &mut Session<B>, page: &PageHandle| {
                self.wait_for_results(session, page).await?;
                if let Some(section) = request.section() {
                    self.select_section(session, page, section).await?;
                }
                self.collect(session, page, request.number_months).await
            })
            .await
    }

    async fn wait_for_results<B: BrowserBackend>(
        &self,
        session: &mut Session<B>,
        page: &PageHandle,
    ) -> Result<(), CaptureError> {
        session
            .page(page)?
            .wait_for_present(S::RESULT_LIST, "search result list")
            .await
    }

    /// Narrow results to `section`.
    ///
    /// A page without a section control is left as is. A control that does
    /// not offer `section` is a caller error.
    #[instrument(level = "info", skip(self, session, page))]
    pub async fn select_section<B: BrowserBackend>(
        &self,
        session: &mut Session<B>,
        page: &PageHandle,
        section: &str,
    ) -> Result<(), CaptureError> {
        let Some(control_xpath) = S::SECTION_CONTROL else {
            debug!("Site has no section filter; ignoring");
            return Ok(());
        };
        let mut view = session.page(page)?;
        let Some(control) = view.find_first(control_xpath).await? else {
            debug!("No section control on page; ignoring");
            return Ok(());
        };

        let mut offered = Vec::new();
        for option in view.find_within(&control, S::SECTION_OPTION).await? {
            let label = view.text(&option).await?.trim().to_string();
            if label.eq_ignore_ascii_case(section.trim()) {
                view.click(&option).await?;
                view.wait_for_absent(S::LOADING, "section results to load")
                    .await?;
                info!(section, "Selected section");
                return Ok(());
            }
            offered.push(label);
        }
        Err(CaptureError::UnsupportedSection(format!(
            "'{section}' is not one of [{}]",
            offered.join(", ")
        )))
    }

    async fn collect<B: BrowserBackend>(
        &self,
        session: &mut Session<B>,
        page: &PageHandle,
        months: i64,
    ) -> Result<ArticleSet, CaptureError> {
        let mut cursor = ResultCursor::<S>::new(page.clone(), months);
        let mut articles = ArticleSet::new();

        info!(months = cursor.cutoff_months(), "Collecting articles");
        articles.extend(cursor.extract_current_page(session).await?);
        while cursor.advance(session).await? {
            debug!(pages_loaded = cursor.pages_loaded(), "Navigated to next page");
            articles.extend(cursor.extract_current_page(session).await?);
        }
        info!(
            count = articles.len(),
            pages = cursor.pages_loaded(),
            "Found articles"
        );
        Ok(articles)
    }
}
