// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};
use url::Url;

use crate::error::FeedError;

use super::record::EpisodeRecord;

/// Title used when a feed or item carries none
const UNKNOWN_TITLE: &str = "Unknown";

/// A parsed feed: channel title plus the playable episodes
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: String,
    pub episodes: Vec<EpisodeRecord>,
}

/// Parse RSS feed XML into episode records
///
/// Items without a resolvable audio URL are dropped. At most `limit`
/// records are kept, and each survivor's index is its position in the
/// filtered result.
pub fn parse_feed(xml_bytes: &[u8], limit: usize) -> Result<ParsedFeed, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let episodes = channel
        .items()
        .iter()
        .filter_map(|item| parse_item(item).ok())
        .take(limit)
        .enumerate()
        .map(|(index, pending)| pending.into_record(index))
        .collect();

    let title = Some(channel.title().trim())
        .filter(|t| !t.is_empty())
        .unwrap_or("Podcast")
        .to_string();

    Ok(ParsedFeed { title, episodes })
}

/// An item that passed validation but has no index yet
struct PendingRecord {
    title: String,
    description: String,
    source_url: Url,
    mime_type: Option<String>,
    published: Option<DateTime<FixedOffset>>,
    duration_secs: Option<u64>,
    file_size: Option<u64>,
}

impl PendingRecord {
    fn into_record(self, index: usize) -> EpisodeRecord {
        EpisodeRecord {
            index,
            title: self.title,
            description: self.description,
            source_url: self.source_url,
            mime_type: self.mime_type,
            published: self.published,
            duration_secs: self.duration_secs,
            file_size: self.file_size,
        }
    }
}

fn parse_item(item: &rss::Item) -> Result<PendingRecord, FeedError> {
    let title = item
        .title()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNKNOWN_TITLE)
        .to_string();

    let enclosure = item
        .enclosure()
        .ok_or_else(|| FeedError::MissingEnclosure {
            title: title.clone(),
        })?;

    let source_url = Url::parse(enclosure.url().trim())?;

    let published = item.pub_date().and_then(|date_str| {
        DateTime::parse_from_rfc2822(date_str.trim())
            .ok()
            .or_else(|| parse_relaxed_date(date_str.trim()))
    });

    let description = item
        .description()
        .or_else(|| item.itunes_ext().and_then(|ext| ext.summary()))
        .map(|d| html_escape::decode_html_entities(d.trim()).into_owned())
        .unwrap_or_default();

    Ok(PendingRecord {
        title,
        description,
        source_url,
        mime_type: Some(enclosure.mime_type().trim().to_string()).filter(|s| !s.is_empty()),
        published,
        duration_secs: item
            .itunes_ext()
            .and_then(|ext| ext.duration())
            .and_then(parse_duration),
        file_size: enclosure.length().trim().parse::<u64>().ok().filter(|&n| n > 0),
    })
}

/// Try to parse dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let formats = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    formats
        .iter()
        .find_map(|format| DateTime::parse_from_str(date_str, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(date_str).ok())
}

/// Parse an `itunes:duration` value into seconds
///
/// Accepts "SS", "MM:SS" and "HH:MM:SS"; fractional seconds are truncated.
pub fn parse_duration(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    let mut total: u64 = 0;
    for part in parts {
        let whole = part.split('.').next().unwrap_or(part);
        let value: u64 = whole.parse().ok()?;
        total = total.checked_mul(60)?.checked_add(value)?;
    }

    Some(total)
}
