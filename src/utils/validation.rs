//! Channel identifier validation

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use url::Url;

use crate::core::models::OperationError;

const YOUTUBE_HOSTS: [&str; 3] = ["youtube.com", "www.youtube.com", "m.youtube.com"];

fn channel_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^UC[a-zA-Z0-9_-]{22}$").expect("channel id pattern is valid")
    })
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9._-]+$").expect("name pattern is valid"))
}

/// A channel reference accepted from user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    Id(String),
    CustomName(String),
    User(String),
    Handle(String),
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "channel/{}", id),
            Self::CustomName(name) => write!(f, "c/{}", name),
            Self::User(name) => write!(f, "user/{}", name),
            Self::Handle(handle) => write!(f, "@{}", handle),
        }
    }
}

/// Parse a raw channel id, `@handle`, or channel URL
pub fn parse_channel_ref(input: &str) -> Result<ChannelRef, OperationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(OperationError::validation("Channel identifier is empty"));
    }

    if channel_id_pattern().is_match(input) {
        return Ok(ChannelRef::Id(input.to_string()));
    }

    if let Some(handle) = input.strip_prefix('@') {
        return parse_handle(handle, input);
    }

    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };

    let url = Url::parse(&with_scheme).map_err(|e| {
        OperationError::validation(format!("Invalid channel URL '{}': {}", input, e))
    })?;

    let host = url.host_str().unwrap_or_default();
    if !YOUTUBE_HOSTS.contains(&host) {
        return Err(OperationError::validation(format!(
            "Not a YouTube channel URL: {}",
            input
        )));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        ["channel", id, ..] if channel_id_pattern().is_match(id) => {
            Ok(ChannelRef::Id(id.to_string()))
        }
        ["c", name, ..] if name_pattern().is_match(name) => {
            Ok(ChannelRef::CustomName(name.to_string()))
        }
        ["user", name, ..] if name_pattern().is_match(name) => {
            Ok(ChannelRef::User(name.to_string()))
        }
        [first, ..] if first.starts_with('@') => parse_handle(&first[1..], input),
        _ => Err(OperationError::validation(format!(
            "Unrecognised channel URL: {}",
            input
        ))),
    }
}

fn parse_handle(handle: &str, input: &str) -> Result<ChannelRef, OperationError> {
    if (3..=30).contains(&handle.len()) && name_pattern().is_match(handle) {
        Ok(ChannelRef::Handle(handle.to_string()))
    } else {
        Err(OperationError::validation(format!(
            "Invalid channel handle: {}",
            input
        )))
    }
}
