//! Extraction orchestration: one retried unit per work item.
//!
//! A unit is `open session → site search → close session`. The payload is
//! validated before any browser is started, so a malformed item never costs
//! a session. Retries re-run the whole unit with a fresh session.

use crate::browser::webdriver::WebDriverBackend;
use crate::browser::{BrowserBackend, Session};
use crate::config::BrowserConfig;
use crate::errors::CaptureError;
use crate::models::ArticleSet;
use crate::retry::RetryPolicy;
use crate::sites::aljazeera::Aljazeera;
use crate::sites::{NewsSite, SiteDriver};
use crate::workitems::{SearchRequest, WorkItemOutcome};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{error, info, instrument};

/// Opens a fresh browser session for each extraction attempt.
pub trait SessionFactory {
    type Backend: BrowserBackend;

    async fn open_session(&self) -> Result<Session<Self::Backend>, CaptureError>;
}

/// Sessions backed by a real WebDriver server.
#[derive(Debug, Clone)]
pub struct WebDriverSessions {
    config: BrowserConfig,
    startup_url: String,
}

impl WebDriverSessions {
    pub fn new(config: BrowserConfig, default_startup_url: &str) -> Self {
        let startup_url = config
            .startup_url
            .clone()
            .unwrap_or_else(|| default_startup_url.to_string());
        Self {
            config,
            startup_url,
        }
    }
}

impl SessionFactory for WebDriverSessions {
    type Backend = WebDriverBackend;

    async fn open_session(&self) -> Result<Session<WebDriverBackend>, CaptureError> {
        Session::open(&self.config, &self.startup_url).await
    }
}

pub struct Orchestrator<F, S = Aljazeera> {
    factory: F,
    policy: RetryPolicy,
    driver: SiteDriver<S>,
}

impl<F: SessionFactory, S: NewsSite> Orchestrator<F, S> {
    pub fn new(factory: F, policy: RetryPolicy) -> Self {
        Self {
            factory,
            policy,
            driver: SiteDriver::new(),
        }
    }

    /// Validate `payload` and collect the matching articles.
    ///
    /// Validation happens once, before any session is opened. The
    /// `open → search → close` unit then runs under the retry policy.
    ///
    /// # Arguments
    ///
    /// * `payload` - Work item with `search_phrase`, `news_section` and
    ///   `number_months`
    ///
    /// # Returns
    ///
    /// The deduplicated articles, or a [`CaptureError`]: `InvalidInput` for a
    /// malformed payload, otherwise the error of the last failed attempt.
    #[instrument(level = "info", skip_all, fields(site = S::NAME))]
    pub async fn capture_news(&self, payload: &Value) -> Result<ArticleSet, CaptureError> {
        let request = SearchRequest::from_payload(payload)?;
        let request = &request;
        self.policy
            .run("capture_news", move || self.capture_once(request))
            .await
    }

    async fn capture_once(&self, request: &SearchRequest) -> Result<ArticleSet, CaptureError> {
        let mut session = self.factory.open_session().await?;
        let result = self.driver.search(&mut session, request).await;
        session.close().await;
        result
    }

    /// Run one work item. Items that already failed upstream pass through.
    ///
    /// A panic inside the unit of work fails this item with
    /// `UNEXPECTED_ERROR`; the remaining items are unaffected.
    pub async fn capture_item(&self, index: usize, item: WorkItemOutcome) -> WorkItemOutcome {
        if !item.is_done() {
            info!(index, "Skipping previously failed item");
            return item;
        }
        let t0 = Instant::now();
        let mut payload = item.payload;
        let captured = AssertUnwindSafe(self.capture_news(&payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(CaptureError::Unexpected(panic_message(panic))));
        let result = match captured {
            Ok(articles) => attach_results(&mut payload, &articles).map(|()| articles.len()),
            Err(e) => Err(e),
        };
        let elapsed_ms = t0.elapsed().as_millis() as u64;
        match result {
            Ok(count) => {
                info!(index, count, elapsed_ms, "Work item done");
                WorkItemOutcome::done(payload)
            }
            Err(e) => {
                error!(index, code = %e.code(), kind = %e.kind(), error = %e, elapsed_ms, "Work item failed");
                WorkItemOutcome::failed(payload, &e)
            }
        }
    }

    /// Capture every item, at most `parallel` at a time, keeping input order.
    #[instrument(level = "info", skip_all, fields(items = items.len(), parallel))]
    pub async fn capture_all(
        &self,
        items: Vec<WorkItemOutcome>,
        parallel: usize,
    ) -> Vec<WorkItemOutcome> {
        stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| self.capture_item(index, item))
            .buffered(parallel.max(1))
            .collect()
            .await
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "worker panicked".to_string(),
        },
    }
}

/// Store the extracted records under `search_result`.
fn attach_results(payload: &mut Value, articles: &ArticleSet) -> Result<(), CaptureError> {
    let records = serde_json::to_value(articles.to_records())?;
    let map = payload
        .as_object_mut()
        .ok_or_else(|| CaptureError::InvalidWorkItem("payload is not an object".to_string()))?;
    map.insert("search_result".to_string(), records);
    Ok(())
}
