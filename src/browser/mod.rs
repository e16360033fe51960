//! Browser session management.
//!
//! A [`Session`] owns one browser connection (a [`BrowserBackend`]) and the
//! logical pages (tabs) opened through it. WebDriver only executes commands
//! against the focused window, so every page-scoped operation goes through a
//! [`PageView`], which switches focus to its own window first.
//!
//! # Lifecycle
//!
//! ```ignore
//! let mut session = Session::open(&config, "https://www.aljazeera.com").await?;
//! let found = session
//!     .with_page(&url, async |session: &mut Session<_>, page: &PageHandle| {
//!         let mut view = session.page(page)?;
//!         view.find_all("//article").await
//!     })
//!     .await;
//! session.close().await;
//! ```
//!
//! `close()` is idempotent. A session dropped without it (for example when
//! the owning future is cancelled) schedules `quit` on the current runtime.

pub mod webdriver;

#[cfg(test)]
pub mod fake;

use crate::config::BrowserConfig;
use crate::errors::{BrowserError, CaptureError};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

/// Opaque identifier of one browser window/tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageHandle(String);

impl PageHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Primitive commands a browser connection must support.
///
/// Every command except window management acts on the currently focused
/// window; [`Session`] and [`PageView`] take care of focusing.
pub trait BrowserBackend: Send + Sized + 'static {
    /// Handle to a DOM element.
    type Node: Clone + Send + Sync + fmt::Debug;

    async fn current_handle(&self) -> Result<PageHandle, BrowserError>;

    /// All open windows, in the order the browser reports them.
    async fn handles(&self) -> Result<Vec<PageHandle>, BrowserError>;

    /// Open a new tab without focusing it.
    async fn open_tab(&self) -> Result<PageHandle, BrowserError>;

    async fn switch_to(&self, handle: &PageHandle) -> Result<(), BrowserError>;

    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    async fn refresh(&self) -> Result<(), BrowserError>;

    async fn add_cookie(&self, name: &str, value: &str) -> Result<(), BrowserError>;

    /// Close the focused window. Focus is left undefined afterwards.
    async fn close_current(&self) -> Result<(), BrowserError>;

    /// XPath lookup, relative to `scope` when given, else the whole document.
    async fn find_all(
        &self,
        scope: Option<&Self::Node>,
        xpath: &str,
    ) -> Result<Vec<Self::Node>, BrowserError>;

    async fn text(&self, node: &Self::Node) -> Result<String, BrowserError>;

    async fn attr(&self, node: &Self::Node, name: &str) -> Result<Option<String>, BrowserError>;

    /// Scroll the element into view and click it from script.
    async fn click(&self, node: &Self::Node) -> Result<(), BrowserError>;

    /// Terminate the connection and every window.
    fn quit(self) -> impl Future<Output = Result<(), BrowserError>> + Send;
}

/// A browser connection plus the pages opened through it.
pub struct Session<B: BrowserBackend> {
    backend: Option<B>,
    pages: Vec<PageHandle>,
    active: Option<PageHandle>,
    last_active: Option<PageHandle>,
    wait_timeout: Duration,
    poll_interval: Duration,
}

impl<B: BrowserBackend> fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.is_open())
            .field("pages", &self.pages)
            .field("active", &self.active)
            .field("last_active", &self.last_active)
            .finish()
    }
}

impl<B: BrowserBackend> Session<B> {
    /// Wrap an already connected backend. No navigation happens here.
    pub async fn attach(backend: B, config: &BrowserConfig) -> Result<Self, CaptureError> {
        let active = backend.current_handle().await?;
        Ok(Self {
            backend: Some(backend),
            pages: Vec::new(),
            active: Some(active),
            last_active: None,
            wait_timeout: config.wait_timeout(),
            poll_interval: config.poll_interval(),
        })
    }

    /// Attach to `backend`, load `startup_url` and inject the consent cookie.
    ///
    /// With a consent cookie configured the startup page is reloaded so the
    /// site sees it.
    ///
    /// # Arguments
    ///
    /// * `backend` - Connected browser, focused on its initial window
    /// * `config` - Wait limits and the optional consent cookie
    /// * `startup_url` - Page loaded before the cookie is set
    ///
    /// # Returns
    ///
    /// A ready session. On any startup failure the backend is quit before
    /// the error is returned.
    #[instrument(level = "info", skip_all, fields(%startup_url))]
    pub async fn start(
        backend: B,
        config: &BrowserConfig,
        startup_url: &str,
    ) -> Result<Self, CaptureError> {
        let mut session = Self::attach(backend, config).await?;
        if let Err(e) = session.prime(config, startup_url).await {
            warn!(error = %e, "Browser startup failed; closing session");
            session.close().await;
            return Err(e);
        }
        info!("Browser session ready");
        Ok(session)
    }

    async fn prime(&mut self, config: &BrowserConfig, startup_url: &str) -> Result<(), CaptureError> {
        let limit = self.wait_timeout;
        let backend = self.backend()?;
        bounded(limit, "startup page", backend.navigate(startup_url)).await?;
        if let Some(cookie) = &config.consent_cookie {
            backend.add_cookie(&cookie.name, &cookie.value).await?;
            bounded(limit, "startup page reload", backend.refresh()).await?;
            debug!(cookie = %cookie.name, "Injected consent cookie");
        }
        Ok(())
    }

    fn backend(&self) -> Result<&B, CaptureError> {
        self.backend.as_ref().ok_or(CaptureError::SessionClosed)
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// Pages opened through this session that are still open, oldest first.
    pub fn pages(&self) -> &[PageHandle] {
        &self.pages
    }

    pub fn is_page_open(&self, handle: &PageHandle) -> bool {
        self.is_open() && self.pages.contains(handle)
    }

    pub fn active_handle(&self) -> Option<&PageHandle> {
        self.active.as_ref()
    }

    /// Window that was focused before the most recent focus switch.
    pub fn last_active_handle(&self) -> Option<&PageHandle> {
        self.last_active.as_ref()
    }

    /// Open `url` in a new tab. The new tab becomes the active page.
    ///
    /// If the tab cannot be focused or loaded it is closed again before the
    /// error is returned.
    #[instrument(level = "info", skip(self))]
    pub async fn new_page(&mut self, url: &str) -> Result<PageHandle, CaptureError> {
        let t0 = Instant::now();
        let handle = self.backend()?.open_tab().await?;
        self.pages.push(handle.clone());
        if let Err(e) = self.load(&handle, url).await {
            if let Err(close_err) = self.close_page(&handle).await {
                warn!(%handle, error = %close_err, "Failed to close page after load error");
            }
            return Err(e);
        }
        debug!(%handle, elapsed_ms = t0.elapsed().as_millis() as u64, "Opened page");
        Ok(handle)
    }

    async fn load(&mut self, handle: &PageHandle, url: &str) -> Result<(), CaptureError> {
        let limit = self.wait_timeout;
        self.ensure_focused(handle).await?;
        bounded(limit, url, self.backend()?.navigate(url)).await
    }

    /// Switch browser focus to `handle` unless it already has it.
    pub async fn ensure_focused(&mut self, handle: &PageHandle) -> Result<(), CaptureError> {
        if self.active.as_ref() == Some(handle) {
            return Ok(());
        }
        self.backend()?.switch_to(handle).await?;
        self.last_active = self.active.replace(handle.clone());
        Ok(())
    }

    /// Focus-aware view of one open page.
    pub fn page(&mut self, handle: &PageHandle) -> Result<PageView<'_, B>, CaptureError> {
        if !self.is_open() {
            return Err(CaptureError::SessionClosed);
        }
        if !self.pages.contains(handle) {
            return Err(BrowserError::NoSuchWindow(handle.to_string()).into());
        }
        Ok(PageView {
            session: self,
            handle: handle.clone(),
        })
    }

    /// Close one page and refocus.
    ///
    /// Focus moves to the last window the browser still reports, which is not
    /// necessarily the window that was active before this page was opened.
    /// With more than two pages open this may pick a different predecessor.
    #[instrument(level = "debug", skip(self))]
    pub async fn close_page(&mut self, handle: &PageHandle) -> Result<(), CaptureError> {
        if !self.is_page_open(handle) {
            return Ok(());
        }
        self.ensure_focused(handle).await?;
        let backend = self.backend()?;
        backend.close_current().await?;
        self.pages.retain(|h| h != handle);
        self.active = None;

        let remaining = self.backend()?.handles().await?;
        if let Some(last) = remaining.last() {
            self.backend()?.switch_to(last).await?;
            self.active = Some(last.clone());
        }
        debug!(%handle, active = ?self.active, "Closed page");
        Ok(())
    }

    /// Open `url` as a page, run `scope` against it, then close the page.
    ///
    /// The page is closed whether or not `scope` succeeds. An error from
    /// `scope` takes precedence over an error while closing.
    pub async fn with_page<T, F>(&mut self, url: &str, scope: F) -> Result<T, CaptureError>
    where
        F: AsyncFnOnce(&mut Session<B>, &PageHandle) -> Result<T, CaptureError>,
    {
        let handle = self.new_page(url).await?;
        let result = scope(&mut *self, &handle).await;
        let closed = self.close_page(&handle).await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "Failed to close page after error");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(close_err)) => Err(close_err),
        }
    }

    /// Quit the browser. Safe to call more than once.
    #[instrument(level = "info", skip(self))]
    pub async fn close(&mut self) {
        let Some(backend) = self.backend.take() else {
            return;
        };
        let open_pages = self.pages.len();
        self.pages.clear();
        self.active = None;
        self.last_active = None;
        match backend.quit().await {
            Ok(()) => info!(open_pages, "Quit browser"),
            Err(e) => warn!(open_pages, error = %e, "Browser quit reported an error"),
        }
    }
}

impl<B: BrowserBackend> Drop for Session<B> {
    fn drop(&mut self) {
        let Some(backend) = self.backend.take() else {
            return;
        };
        warn!(
            open_pages = self.pages.len(),
            "Session dropped without close(); quitting browser in background"
        );
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = backend.quit().await {
                        warn!(error = %e, "Background browser quit failed");
                    }
                });
            }
            Err(_) => warn!("No async runtime available; browser process may leak"),
        }
    }
}

/// Page-scoped operations, each preceded by a focus check.
pub struct PageView<'s, B: BrowserBackend> {
    session: &'s mut Session<B>,
    handle: PageHandle,
}

impl<'s, B: BrowserBackend> PageView<'s, B> {
    async fn focused(&mut self) -> Result<&B, CaptureError> {
        self.session.ensure_focused(&self.handle).await?;
        self.session.backend()
    }

    pub async fn find_all(&mut self, xpath: &str) -> Result<Vec<B::Node>, CaptureError> {
        Ok(self.focused().await?.find_all(None, xpath).await?)
    }

    pub async fn find_first(&mut self, xpath: &str) -> Result<Option<B::Node>, CaptureError> {
        Ok(self.find_all(xpath).await?.into_iter().next())
    }

    pub async fn find_within(
        &mut self,
        node: &B::Node,
        xpath: &str,
    ) -> Result<Vec<B::Node>, CaptureError> {
        Ok(self.focused().await?.find_all(Some(node), xpath).await?)
    }

    pub async fn find_first_within(
        &mut self,
        node: &B::Node,
        xpath: &str,
    ) -> Result<Option<B::Node>, CaptureError> {
        Ok(self.find_within(node, xpath).await?.into_iter().next())
    }

    pub async fn text(&mut self, node: &B::Node) -> Result<String, CaptureError> {
        Ok(self.focused().await?.text(node).await?)
    }

    pub async fn attr(&mut self, node: &B::Node, name: &str) -> Result<Option<String>, CaptureError> {
        Ok(self.focused().await?.attr(node, name).await?)
    }

    pub async fn click(&mut self, node: &B::Node) -> Result<(), CaptureError> {
        Ok(self.focused().await?.click(node).await?)
    }

    /// Wait until at least one element matches `xpath`.
    pub async fn wait_for_present(&mut self, xpath: &str, what: &str) -> Result<(), CaptureError> {
        self.wait_for(xpath, true, what).await
    }

    /// Wait until no element matches `xpath`.
    pub async fn wait_for_absent(&mut self, xpath: &str, what: &str) -> Result<(), CaptureError> {
        self.wait_for(xpath, false, what).await
    }

    async fn wait_for(&mut self, xpath: &str, present: bool, what: &str) -> Result<(), CaptureError> {
        let limit = self.session.wait_timeout;
        let poll = self.session.poll_interval;
        let outcome = timeout(limit, async {
            loop {
                if self.find_all(xpath).await?.is_empty() != present {
                    return Ok::<(), CaptureError>(());
                }
                sleep(poll).await;
            }
        })
        .await;
        match outcome {
            Ok(result) => result,
            Err(_) => Err(CaptureError::NavigationTimeout {
                waiting_for: what.to_string(),
                timeout: limit,
            }),
        }
    }
}

/// Run a backend command under a timeout, mapping expiry to `NavigationTimeout`.
async fn bounded<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T, BrowserError>>,
) -> Result<T, CaptureError> {
    match timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CaptureError::NavigationTimeout {
            waiting_for: what.to_string(),
            timeout: limit,
        }),
    }
}
