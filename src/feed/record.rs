// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};
use url::Url;

/// One feed item with playable audio
///
/// `index` is the record's position in the fetched list and is its stable
/// identity: download paths and "now playing" comparisons both key on it.
/// Records are immutable once fetched; a refresh replaces the whole list.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRecord {
    pub index: usize,
    pub title: String,
    pub description: String,
    pub source_url: Url,
    pub mime_type: Option<String>,
    pub published: Option<DateTime<FixedOffset>>,
    pub duration_secs: Option<u64>,
    pub file_size: Option<u64>,
}

impl EpisodeRecord {
    /// Publication date as "Jan 05, 2024", or "Unknown date"
    pub fn formatted_date(&self) -> String {
        self.published
            .map(|dt| dt.format("%b %d, %Y").to_string())
            .unwrap_or_else(|| "Unknown date".to_string())
    }

    /// Duration as "H:MM:SS" or "M:SS"; empty when unknown
    pub fn formatted_duration(&self) -> String {
        match self.duration_secs {
            Some(secs) if secs > 0 => format_clock(secs),
            _ => String::new(),
        }
    }

    /// Enclosure size in megabytes, 0 when unknown
    pub fn size_mb(&self) -> f64 {
        self.file_size
            .map(|bytes| bytes as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0)
    }

    /// One-line summary of date, duration and size for list views
    pub fn summary_line(&self) -> String {
        let mut parts = Vec::new();
        if self.published.is_some() {
            parts.push(self.formatted_date());
        }
        let duration = self.formatted_duration();
        if !duration.is_empty() {
            parts.push(format!("Duration: {duration}"));
        }
        if self.file_size.is_some() {
            parts.push(format!("Size: {:.1} MB", self.size_mb()));
        }
        parts.join(" | ")
    }
}

/// Format whole seconds as "H:MM:SS" or "M:SS"
pub fn format_clock(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
