// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::time::Duration;

/// Feed the player opens when none is given
pub const DEFAULT_FEED_URL: &str = "https://realpython.com/podcasts/rpp/feed";

/// Settings for one player session
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// RSS feed to list episodes from
    pub feed_url: String,
    /// Maximum number of episodes kept from the feed
    pub limit: usize,
    /// Directory downloaded episodes are written to
    pub downloads_dir: PathBuf,
    /// Pacing of the presentation loop
    pub frame_interval: Duration,
    /// Two selections of the same episode closer than this count as a double click
    pub double_click_threshold: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            limit: 20,
            downloads_dir: PathBuf::from("downloads"),
            frame_interval: Duration::from_millis(1000 / 30),
            double_click_threshold: Duration::from_millis(500),
        }
    }
}
