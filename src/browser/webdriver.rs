//! WebDriver-backed browser using `thirtyfour`.
//!
//! Talks to any W3C WebDriver endpoint (chromedriver, Selenium grid) and
//! launches Chrome with the capabilities from [`BrowserConfig`].

use super::{BrowserBackend, PageHandle, Session};
use crate::config::{BrowserConfig, PageLoad};
use crate::errors::{BrowserError, CaptureError};
use std::future::Future;
use thirtyfour::prelude::*;
use thirtyfour::{
    CapabilitiesHelper, ChromeCapabilities, ChromiumLikeCapabilities, PageLoadStrategy,
    WindowHandle,
};
use tokio::time::timeout;
use tracing::{info, instrument};

const CLICK_SCRIPT: &str = "arguments[0].scrollIntoView();arguments[0].click()";

impl From<WebDriverError> for BrowserError {
    fn from(e: WebDriverError) -> Self {
        let message = e.to_string();
        match e {
            WebDriverError::StaleElementReference(_) => BrowserError::StaleNode(message),
            WebDriverError::NoSuchWindow(_) => BrowserError::NoSuchWindow(message),
            WebDriverError::InvalidSessionId(_)
            | WebDriverError::SessionNotCreated(_)
            | WebDriverError::FatalError(_) => BrowserError::Closed,
            _ => classify_message(message),
        }
    }
}

/// Fallback for responses thirtyfour could not type, e.g. `UnknownError`
/// carrying the W3C error string in its payload.
fn classify_message(message: String) -> BrowserError {
    let lower = message.to_lowercase();
    if lower.contains("stale element") {
        BrowserError::StaleNode(message)
    } else if lower.contains("no such window") {
        BrowserError::NoSuchWindow(message)
    } else if lower.contains("invalid session id") || lower.contains("session deleted") {
        BrowserError::Closed
    } else {
        BrowserError::Driver(message)
    }
}

pub struct WebDriverBackend {
    driver: WebDriver,
}

impl WebDriverBackend {
    /// Start a Chrome session on the configured WebDriver server.
    #[instrument(level = "info", skip_all, fields(webdriver_url = %config.webdriver_url, headless = config.headless))]
    pub async fn connect(config: &BrowserConfig) -> Result<Self, CaptureError> {
        let caps = chrome_capabilities(config)
            .map_err(|e| CaptureError::SessionStart(e.to_string()))?;

        let driver = match timeout(
            config.startup_timeout(),
            WebDriver::new(config.webdriver_url.as_str(), caps),
        )
        .await
        {
            Ok(Ok(driver)) => driver,
            Ok(Err(e)) => return Err(CaptureError::SessionStart(e.to_string())),
            Err(_) => {
                return Err(CaptureError::SessionStart(format!(
                    "no session from {} within {:?}",
                    config.webdriver_url,
                    config.startup_timeout()
                )));
            }
        };
        info!("Connected to WebDriver");
        Ok(Self { driver })
    }
}

fn chrome_capabilities(config: &BrowserConfig) -> WebDriverResult<ChromeCapabilities> {
    let mut caps = DesiredCapabilities::chrome();
    if config.headless {
        caps.set_headless()?;
    }
    for arg in &config.extra_args {
        caps.add_arg(arg)?;
    }
    caps.set_page_load_strategy(match config.page_load_strategy {
        PageLoad::Normal => PageLoadStrategy::Normal,
        PageLoad::Eager => PageLoadStrategy::Eager,
        PageLoad::None => PageLoadStrategy::None,
    })?;
    Ok(caps)
}

fn to_window(handle: &PageHandle) -> WindowHandle {
    WindowHandle::from(handle.as_str().to_string())
}

fn from_window(handle: WindowHandle) -> PageHandle {
    PageHandle::new(handle.to_string())
}

impl BrowserBackend for WebDriverBackend {
    type Node = WebElement;

    async fn current_handle(&self) -> Result<PageHandle, BrowserError> {
        Ok(from_window(self.driver.window().await?))
    }

    async fn handles(&self) -> Result<Vec<PageHandle>, BrowserError> {
        Ok(self
            .driver
            .windows()
            .await?
            .into_iter()
            .map(from_window)
            .collect())
    }

    async fn open_tab(&self) -> Result<PageHandle, BrowserError> {
        Ok(from_window(self.driver.new_tab().await?))
    }

    async fn switch_to(&self, handle: &PageHandle) -> Result<(), BrowserError> {
        Ok(self.driver.switch_to_window(to_window(handle)).await?)
    }

    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        Ok(self.driver.goto(url).await?)
    }

    async fn refresh(&self) -> Result<(), BrowserError> {
        Ok(self.driver.refresh().await?)
    }

    async fn add_cookie(&self, name: &str, value: &str) -> Result<(), BrowserError> {
        let cookie = Cookie::new(name.to_string(), value.to_string());
        Ok(self.driver.add_cookie(cookie).await?)
    }

    async fn close_current(&self) -> Result<(), BrowserError> {
        Ok(self.driver.close_window().await?)
    }

    async fn find_all(
        &self,
        scope: Option<&WebElement>,
        xpath: &str,
    ) -> Result<Vec<WebElement>, BrowserError> {
        let found = match scope {
            Some(element) => element.find_all(By::XPath(xpath)).await?,
            None => self.driver.find_all(By::XPath(xpath)).await?,
        };
        Ok(found)
    }

    async fn text(&self, node: &WebElement) -> Result<String, BrowserError> {
        Ok(node.text().await?)
    }

    async fn attr(&self, node: &WebElement, name: &str) -> Result<Option<String>, BrowserError> {
        Ok(node.attr(name).await?)
    }

    async fn click(&self, node: &WebElement) -> Result<(), BrowserError> {
        self.driver
            .execute(CLICK_SCRIPT, vec![node.to_json()?])
            .await?;
        Ok(())
    }

    fn quit(self) -> impl Future<Output = Result<(), BrowserError>> + Send {
        async move { Ok(self.driver.quit().await?) }
    }
}

impl Session<WebDriverBackend> {
    /// Launch a browser per `config` and load `startup_url`.
    pub async fn open(config: &BrowserConfig, startup_url: &str) -> Result<Self, CaptureError> {
        let backend = WebDriverBackend::connect(config).await?;
        Session::start(backend, config, startup_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thirtyfour::error::WebDriverErrorInfo;

    fn info(message: &str) -> WebDriverErrorInfo {
        WebDriverErrorInfo::new(message.to_string())
    }

    #[test]
    fn test_typed_errors_are_classified() {
        let stale = BrowserError::from(WebDriverError::StaleElementReference(info("node gone")));
        assert!(matches!(stale, BrowserError::StaleNode(_)), "{stale:?}");

        let window = BrowserError::from(WebDriverError::NoSuchWindow(info("tab closed")));
        assert!(matches!(window, BrowserError::NoSuchWindow(_)), "{window:?}");

        let session = BrowserError::from(WebDriverError::InvalidSessionId(info("gone")));
        assert!(matches!(session, BrowserError::Closed), "{session:?}");

        let timeout = BrowserError::from(WebDriverError::WebDriverTimeout(info("slow")));
        assert!(matches!(timeout, BrowserError::Driver(_)), "{timeout:?}");
    }

    #[test]
    fn test_untyped_errors_fall_back_to_message() {
        let err = BrowserError::from(WebDriverError::UnknownError(info(
            "stale element reference: element is not attached",
        )));
        assert!(matches!(err, BrowserError::StaleNode(_)), "{err:?}");

        let err = BrowserError::from(WebDriverError::RequestFailed("connection reset".into()));
        assert!(matches!(err, BrowserError::Driver(_)), "{err:?}");
    }

    #[test]
    fn test_handle_round_trip() {
        let handle = PageHandle::new("CDwindow-1234");
        assert_eq!(from_window(to_window(&handle)), handle);
    }
}
