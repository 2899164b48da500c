//! Display formatting helpers

use regex::Regex;
use std::sync::OnceLock;

use crate::core::models::ChannelDownloadSummary;

fn iso_duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("duration pattern is valid")
    })
}

/// Compact count: `950`, `1.2K`, `3.4M`
pub fn format_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

/// Seconds in an ISO-8601 video duration such as `PT1H2M3S`
pub fn parse_iso_duration(duration: &str) -> Option<u64> {
    let captures = iso_duration_pattern().captures(duration.trim())?;
    let part = |index: usize| -> Option<u64> {
        match captures.get(index) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };

    let hours = part(1)?;
    let minutes = part(2)?;
    let seconds = part(3)?;
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// `1:02:03` with hours, `02:05` without
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Multi-line summary shown when a channel download finishes
pub fn format_summary(summary: &ChannelDownloadSummary) -> String {
    let mut text = format!(
        "Channel: {}\nVideos: {}\nTranscripts downloaded: {}\n\
         Thumbnails downloaded: {}\nFailed: {}\nSuccess rate: {:.1}%",
        summary.channel_name,
        format_count(summary.total_videos as u64),
        summary.transcripts_downloaded,
        summary.thumbnails_downloaded,
        summary.failed_downloads,
        summary.success_rate()
    );
    if let Some(path) = &summary.archive_path {
        text.push_str(&format!("\nArchive: {}", path));
    }
    text
}
