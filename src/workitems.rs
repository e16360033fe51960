//! Work items exchanged between pipeline stages.
//!
//! Each stage reads a JSON array and writes a JSON array of
//! [`WorkItemOutcome`]s. A bare payload object in the input counts as an
//! item that has not failed yet, so the first stage can read hand-written
//! payload lists:
//!
//! ```json
//! [{"search_phrase": "silvio santos", "news_section": "", "number_months": 1}]
//! ```

use crate::errors::{CaptureError, FailureReport};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, instrument};

/// Parameters of one news search, validated from a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub search_phrase: String,
    pub news_section: Option<String>,
    /// Recency window; values below 1 mean the current month only.
    pub number_months: i64,
}

impl SearchRequest {
    pub const REQUIRED_KEYS: [&'static str; 3] = ["search_phrase", "news_section", "number_months"];

    pub fn from_payload(payload: &Value) -> Result<Self, CaptureError> {
        let map = as_object(payload)?;
        require_keys(map, &Self::REQUIRED_KEYS)?;

        let search_phrase = match &map["search_phrase"] {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            other => {
                return Err(CaptureError::InvalidInput(format!(
                    "search_phrase must be a non-empty string, got {other}"
                )));
            }
        };

        let news_section = match &map["news_section"] {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().to_string()),
            other => {
                return Err(CaptureError::InvalidInput(format!(
                    "news_section must be a string, got {other}"
                )));
            }
        };

        let number_months = match &map["number_months"] {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            CaptureError::InvalidInput(format!(
                "number_months must be an integer, got {}",
                map["number_months"]
            ))
        })?;

        Ok(Self {
            search_phrase,
            news_section,
            number_months,
        })
    }

    /// Requested section, if any.
    pub fn section(&self) -> Option<&str> {
        self.news_section.as_deref()
    }
}

pub fn as_object(payload: &Value) -> Result<&Map<String, Value>, CaptureError> {
    payload
        .as_object()
        .ok_or_else(|| CaptureError::InvalidWorkItem(format!("payload is not an object: {payload}")))
}

/// Fail with `InvalidInput` listing every missing key, sorted.
pub fn require_keys(map: &Map<String, Value>, keys: &[&str]) -> Result<(), CaptureError> {
    let missing: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|k| !map.contains_key(*k))
        .sorted()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CaptureError::InvalidInput(format!(
            "Missing keys in payload: {}",
            missing.join(", ")
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    Done,
    Failed,
}

/// A payload plus the result of the stage that last handled it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemOutcome {
    pub payload: Value,
    pub state: ItemState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<FailureReport>,
}

impl WorkItemOutcome {
    pub fn done(payload: Value) -> Self {
        Self {
            payload,
            state: ItemState::Done,
            exception: None,
        }
    }

    pub fn failed(payload: Value, error: &CaptureError) -> Self {
        Self {
            payload,
            state: ItemState::Failed,
            exception: Some(error.to_report()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == ItemState::Done
    }

    /// Interpret one input element: a previous outcome or a bare payload.
    pub fn from_value(value: Value) -> Self {
        let is_outcome = value
            .as_object()
            .is_some_and(|m| m.contains_key("payload") && m.contains_key("state"));
        if is_outcome {
            if let Ok(outcome) = serde_json::from_value::<WorkItemOutcome>(value.clone()) {
                return outcome;
            }
        }
        Self::done(value)
    }
}

/// Read a stage input file.
#[instrument(level = "info", fields(path = %path.display()))]
pub async fn read_items(path: &Path) -> Result<Vec<WorkItemOutcome>, CaptureError> {
    let text = tokio::fs::read_to_string(path).await?;
    let values: Vec<Value> = match serde_json::from_str::<Value>(&text)? {
        Value::Array(items) => items,
        other => {
            return Err(CaptureError::InvalidWorkItem(format!(
                "expected a JSON array of work items, got {}",
                crate::utils::truncate_for_log(&other.to_string(), 80)
            )));
        }
    };
    let items: Vec<WorkItemOutcome> = values.into_iter().map(WorkItemOutcome::from_value).collect();
    info!(count = items.len(), "Read work items");
    Ok(items)
}
