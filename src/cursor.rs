//! Pagination over one search's results, bounded by a recency cutoff.
//!
//! ```text
//!   Active ──extract (node older than cutoff)──▶ Exhausted
//!     │  ▲                                           ▲
//!     └──┘ advance (load-more found)                 │
//!     └────────── advance (no load-more) ────────────┘
//! ```
//!
//! Results are assumed newest-first; the cursor never re-sorts. The first
//! node past the cutoff ends the search: it and everything after it are
//! dropped. Load-more appends to the same list, so each pass starts after
//! the nodes earlier passes already read.

use crate::browser::{BrowserBackend, PageHandle, Session};
use crate::errors::CaptureError;
use crate::locator::{extract_article, read_date};
use crate::models::Article;
use crate::sites::NewsSite;
use chrono::{DateTime, Utc};
use std::marker::PhantomData;
use tracing::{debug, info, instrument};

/// Days counted per month of cutoff window.
pub const DAYS_PER_MONTH: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Active,
    /// Terminal. No further pages are fetched.
    Exhausted,
}

/// Months of history to keep. Zero or negative means the current month only.
pub fn effective_months(months: i64) -> i64 {
    months.max(1)
}

#[derive(Debug)]
pub struct ResultCursor<S> {
    page: PageHandle,
    cutoff_months: i64,
    now: DateTime<Utc>,
    state: CursorState,
    pages_loaded: usize,
    read: usize,
    _site: PhantomData<S>,
}

impl<S: NewsSite> ResultCursor<S> {
    pub fn new(page: PageHandle, cutoff_months: i64) -> Self {
        Self::starting_at(page, cutoff_months, Utc::now())
    }

    /// Cursor whose cutoff is measured from `now` instead of the wall clock.
    pub fn starting_at(page: PageHandle, cutoff_months: i64, now: DateTime<Utc>) -> Self {
        Self {
            page,
            cutoff_months: effective_months(cutoff_months),
            now,
            state: CursorState::Active,
            pages_loaded: 1,
            read: 0,
            _site: PhantomData,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    pub fn cutoff_months(&self) -> i64 {
        self.cutoff_months
    }

    /// Result pages loaded so far, including the first.
    pub fn pages_loaded(&self) -> usize {
        self.pages_loaded
    }

    pub fn is_in_window(&self, date: DateTime<Utc>) -> bool {
        (self.now - date).num_days() <= DAYS_PER_MONTH * self.cutoff_months
    }

    fn exhaust(&mut self) {
        self.state = CursorState::Exhausted;
    }

    /// Extract the in-window articles rendered since the previous pass, in
    /// document order.
    ///
    /// Nodes without a parseable date are kept. The first node dated outside
    /// the window exhausts the cursor and stops the scan.
    #[instrument(level = "debug", skip_all, fields(page = %self.page, months = self.cutoff_months))]
    pub async fn extract_current_page<B: BrowserBackend>(
        &mut self,
        session: &mut Session<B>,
    ) -> Result<Vec<Article>, CaptureError> {
        let mut page = session.page(&self.page)?;
        let Some(list) = page.find_first(S::RESULT_LIST).await? else {
            debug!("No result list on page");
            return Ok(Vec::new());
        };
        let nodes = page.find_within(&list, S::CONTENT_NODE).await?;
        let fresh = nodes.get(self.read..).unwrap_or_default();

        let mut articles = Vec::with_capacity(fresh.len());
        for node in fresh {
            let date = read_date::<B, S>(&mut page, node).await?;
            if let Some(date) = date {
                if !self.is_in_window(date) {
                    info!(
                        %date,
                        kept = articles.len(),
                        dropped = fresh.len() - articles.len(),
                        "Reached recency cutoff"
                    );
                    self.exhaust();
                    break;
                }
            }
            articles.push(extract_article::<B, S>(&mut page, node, date).await?);
        }
        self.read = nodes.len();
        debug!(
            count = articles.len(),
            skipped = nodes.len() - fresh.len(),
            "Extracted articles from page"
        );
        Ok(articles)
    }

    /// Load the next batch of results.
    ///
    /// Returns `false` without touching the browser once exhausted, and
    /// exhausts the cursor when the page offers no load-more control.
    #[instrument(level = "debug", skip_all, fields(page = %self.page))]
    pub async fn advance<B: BrowserBackend>(
        &mut self,
        session: &mut Session<B>,
    ) -> Result<bool, CaptureError> {
        if self.is_exhausted() {
            return Ok(false);
        }
        let mut page = session.page(&self.page)?;
        let Some(button) = page.find_first(S::NEXT_PAGE).await? else {
            debug!("No load-more control; results exhausted");
            self.exhaust();
            return Ok(false);
        };
        page.click(&button).await?;
        page.wait_for_absent(S::LOADING, "more results to load").await?;
        self.pages_loaded += 1;
        debug!(pages_loaded = self.pages_loaded, "Loaded more results");
        Ok(true)
    }
}
