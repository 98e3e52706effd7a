// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod parse;
mod record;
mod service;

pub use parse::{ParsedFeed, parse_duration, parse_feed};
pub use record::{EpisodeRecord, format_clock};
pub use service::{FeedService, fetch_feed_bytes};
