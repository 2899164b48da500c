//! Progress extraction from free-form status messages
//!
//! Operations that only report human-readable text ("Thumbnail download: 3/10")
//! are mapped onto the overall bar through a declared table of labels, each
//! owning a sub-range of the 0-100 scale.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::core::models::{clamp_percent, AppError, AppResult};

fn integer_pattern() -> &'static Regex {
    static INTEGER: OnceLock<Regex> = OnceLock::new();
    INTEGER.get_or_init(|| Regex::new(r"\d+").expect("integer pattern is valid"))
}

/// A label and the slice of the overall scale it reports into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPattern {
    pub label: String,
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MessageProgressParser {
    patterns: Vec<ProgressPattern>,
}

impl MessageProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages containing `label` report progress within `[low, high]`
    pub fn register_pattern(
        &mut self,
        label: impl Into<String>,
        range: (f64, f64),
    ) -> AppResult<()> {
        let label = label.into();
        let (low, high) = range;

        if label.is_empty() {
            return Err(AppError::InvalidPattern("label must not be empty".into()));
        }
        if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low > high {
            return Err(AppError::InvalidPattern(format!(
                "range ({low}, {high}) for '{label}' must satisfy 0 <= low <= high <= 100"
            )));
        }

        debug!("Registered progress pattern '{}' -> [{}, {}]", label, low, high);
        self.patterns.push(ProgressPattern { label, low, high });
        Ok(())
    }

    pub fn patterns(&self) -> &[ProgressPattern] {
        &self.patterns
    }

    /// Overall percentage encoded in `message`, if any.
    ///
    /// The first registered label found in the message wins. The first two
    /// integers after it are read as `current/total`.
    pub fn parse(&self, message: &str) -> Option<f64> {
        let pattern = self
            .patterns
            .iter()
            .find(|p| message.contains(p.label.as_str()))?;

        let start = message.find(pattern.label.as_str())? + pattern.label.len();
        let tail = &message[start..];

        let mut numbers = integer_pattern().find_iter(tail).take(2);
        let current = numbers.next()?.as_str().parse::<u64>().ok()?;
        let total = numbers.next()?.as_str().parse::<u64>().ok()?;

        if total == 0 {
            warn!("Ignoring progress message with zero total: {}", message);
            return None;
        }

        let fraction = current as f64 / total as f64;
        let percent = pattern.low + fraction * (pattern.high - pattern.low);
        Some(clamp_percent(percent))
    }
}
