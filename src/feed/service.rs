// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::parse::parse_feed;
use super::record::EpisodeRecord;

const DEFAULT_TITLE: &str = "Podcast";

/// Fetch raw feed bytes from a URL (without parsing)
pub async fn fetch_feed_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes, FeedError> {
    client
        .get_bytes(url)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })
}

/// Retrieves one feed and normalizes it into episode records
///
/// Holds no state between calls apart from the last successfully fetched
/// channel title.
pub struct FeedService<C> {
    client: C,
    feed_url: Url,
    title: Mutex<String>,
}

impl<C: HttpClient> FeedService<C> {
    pub fn new(client: C, feed_url: &str) -> Result<Self, FeedError> {
        Ok(Self {
            client,
            feed_url: Url::parse(feed_url)?,
            title: Mutex::new(DEFAULT_TITLE.to_string()),
        })
    }

    pub fn feed_url(&self) -> &Url {
        &self.feed_url
    }

    /// Title of the most recent successful fetch, "Podcast" before that
    pub fn podcast_title(&self) -> String {
        self.title.lock().clone()
    }

    /// Fetch up to `limit` playable episodes, in feed order
    pub async fn fetch(&self, limit: usize) -> Result<Vec<EpisodeRecord>, FeedError> {
        debug!(url = %self.feed_url, limit, "fetching feed");

        let bytes = fetch_feed_bytes(&self.client, self.feed_url.as_str()).await?;
        let parsed = parse_feed(&bytes, limit)?;

        info!(
            title = %parsed.title,
            episodes = parsed.episodes.len(),
            "feed parsed"
        );

        *self.title.lock() = parsed.title;
        Ok(parsed.episodes)
    }
}
