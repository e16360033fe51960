//! Error taxonomy for the capture pipeline.
//!
//! Two layers are modelled here:
//! - [`BrowserError`]: failures reported by a [`BrowserBackend`](crate::browser::BrowserBackend)
//!   (the WebDriver or the in-memory test double).
//! - [`CaptureError`]: the crate-wide error, classified into an [`ErrorKind`]
//!   (business vs. application) and a stable [`ErrorCode`].
//!
//! Failed work items never carry a raw error value; they carry a
//! [`FailureReport`], a plain `{kind, code, message}` structure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a browser backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrowserError {
    /// The WebDriver rejected or failed a command.
    #[error("webdriver command failed: {0}")]
    Driver(String),

    /// An element was detached from the DOM between lookup and read.
    #[error("stale element reference: {0}")]
    StaleNode(String),

    /// The requested window handle does not exist (anymore).
    #[error("no such window: {0}")]
    NoSuchWindow(String),

    /// The backend connection was already terminated.
    #[error("browser connection is closed")]
    Closed,
}

/// Whether retrying an operation can possibly help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Caller input or business-logic fault. Never retried.
    Business,
    /// Transient or environmental fault. Retried up to the policy limit.
    Application,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Business => f.write_str("BUSINESS"),
            ErrorKind::Application => f.write_str("APPLICATION"),
        }
    }
}

/// Stable machine-readable error codes, as reported on failed work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidWorkItem,
    InvalidInput,
    UnsupportedSection,
    SessionStart,
    NavigationTimeout,
    Extraction,
    Browser,
    SessionClosed,
    Io,
    Serialization,
    UnexpectedError,
}

impl ErrorCode {
    /// Every code classified as [`ErrorKind::Business`].
    pub const BUSINESS: [ErrorCode; 3] = [
        ErrorCode::InvalidWorkItem,
        ErrorCode::InvalidInput,
        ErrorCode::UnsupportedSection,
    ];

    pub fn kind(self) -> ErrorKind {
        if Self::BUSINESS.contains(&self) {
            ErrorKind::Business
        } else {
            ErrorKind::Application
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidWorkItem => "INVALID_WORK_ITEM",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::UnsupportedSection => "UNSUPPORTED_SECTION",
            ErrorCode::SessionStart => "SESSION_START",
            ErrorCode::NavigationTimeout => "NAVIGATION_TIMEOUT",
            ErrorCode::Extraction => "EXTRACTION",
            ErrorCode::Browser => "BROWSER",
            ErrorCode::SessionClosed => "SESSION_CLOSED",
            ErrorCode::Io => "IO",
            ErrorCode::Serialization => "SERIALIZATION",
            ErrorCode::UnexpectedError => "UNEXPECTED_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The work item itself is malformed (not an object, missing stage output).
    #[error("Invalid work item: {0}")]
    InvalidWorkItem(String),

    /// The search parameters are missing or unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A news section was requested that the results page does not offer.
    #[error("Unsupported news section: {0}")]
    UnsupportedSection(String),

    /// The browser could not be started or connected to.
    #[error("Browser session failed to start: {0}")]
    SessionStart(String),

    /// A bounded wait elapsed without its condition becoming true.
    #[error("Timed out after {timeout:?} waiting for {waiting_for}")]
    NavigationTimeout {
        waiting_for: String,
        timeout: Duration,
    },

    /// A content node went stale while its fields were being read.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Any other backend failure.
    #[error("{0}")]
    Browser(#[from] BrowserError),

    /// An operation was attempted after the session was closed.
    #[error("Browser session is closed")]
    SessionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all used at the outermost boundary.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl CaptureError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CaptureError::InvalidWorkItem(_) => ErrorCode::InvalidWorkItem,
            CaptureError::InvalidInput(_) => ErrorCode::InvalidInput,
            CaptureError::UnsupportedSection(_) => ErrorCode::UnsupportedSection,
            CaptureError::SessionStart(_) => ErrorCode::SessionStart,
            CaptureError::NavigationTimeout { .. } => ErrorCode::NavigationTimeout,
            CaptureError::Extraction(_) => ErrorCode::Extraction,
            CaptureError::Browser(_) => ErrorCode::Browser,
            CaptureError::SessionClosed => ErrorCode::SessionClosed,
            CaptureError::Io(_) => ErrorCode::Io,
            CaptureError::Serialization(_) => ErrorCode::Serialization,
            CaptureError::Unexpected(_) => ErrorCode::UnexpectedError,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code().kind()
    }

    pub fn is_business(&self) -> bool {
        self.kind() == ErrorKind::Business
    }

    /// Build the report attached to a failed work item.
    ///
    /// Business errors keep their own code. Application errors that made it
    /// this far have exhausted their retries and are reported as
    /// `UNEXPECTED_ERROR`, with the original message preserved.
    pub fn to_report(&self) -> FailureReport {
        let code = if self.is_business() {
            self.code()
        } else {
            ErrorCode::UnexpectedError
        };
        FailureReport {
            kind: self.kind(),
            code,
            message: self.to_string(),
        }
    }
}

/// Structured failure attached to a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
}
