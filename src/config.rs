//! Runtime configuration.
//!
//! Settings come from an optional YAML file; every field has a default so a
//! missing file (or a partial one) is fine. Command-line flags are applied on
//! top by [`CaptureConfig::apply_cli`].
//!
//! ```yaml
//! max_retries: 3
//! parallel_items: 2
//! browser:
//!   webdriver_url: http://localhost:4444
//!   headless: true
//!   wait_timeout_secs: 10
//! ```

use crate::cli::Cli;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// Page-load strategy hint passed to the WebDriver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageLoad {
    /// Wait for every resource.
    Normal,
    /// Return once the DOM is interactive.
    Eager,
    /// Return immediately.
    None,
}

/// Name/value pair injected into the browser right after startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentCookie {
    pub name: String,
    pub value: String,
}

impl Default for ConsentCookie {
    fn default() -> Self {
        Self {
            name: "cookieyes-consent".to_string(),
            value: "consent:yes,action:yes".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Address of the WebDriver server (chromedriver, selenium grid).
    pub webdriver_url: String,
    pub headless: bool,
    /// Page opened by the first window. `None` uses the site's home page.
    pub startup_url: Option<String>,
    pub consent_cookie: Option<ConsentCookie>,
    pub page_load_strategy: PageLoad,
    pub extra_args: Vec<String>,
    pub startup_timeout_secs: u64,
    /// Bound for navigation and "wait until" conditions.
    pub wait_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            headless: true,
            startup_url: None,
            consent_cookie: Some(ConsentCookie::default()),
            page_load_strategy: PageLoad::Eager,
            extra_args: vec!["--disable-proxy-certificate-handler".to_string()],
            startup_timeout_secs: 30,
            wait_timeout_secs: 10,
            poll_interval_ms: 250,
        }
    }
}

impl BrowserConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub browser: BrowserConfig,
    /// Retries of a whole extraction unit after its first failure.
    pub max_retries: usize,
    /// First backoff step between retries; doubles per attempt.
    pub retry_backoff_ms: u64,
    /// Work items captured concurrently, each with its own browser session.
    pub parallel_items: usize,
    /// Concurrent picture downloads during enrichment.
    pub image_workers: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            max_retries: 3,
            retry_backoff_ms: 1000,
            parallel_items: 1,
            image_workers: 5,
        }
    }
}

impl CaptureConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Load from a YAML file, or defaults when `path` is `None`.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&text)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Overlay command-line flags onto file settings.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(url) = &cli.webdriver_url {
            self.browser.webdriver_url = url.clone();
        }
        if cli.headful {
            self.browser.headless = false;
        }
        if let Some(n) = cli.max_retries {
            self.max_retries = n;
        }
        if let Some(n) = cli.parallel {
            self.parallel_items = n.max(1);
        }
    }
}
