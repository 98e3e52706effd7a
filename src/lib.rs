// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod app;
pub mod config;
pub mod download;
pub mod error;
pub mod feed;
pub mod http;
pub mod input;
pub mod playback;
pub mod progress;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use app::{AppController, PlayOutcome, Snapshot};
pub use config::PlayerConfig;
pub use download::{DownloadCoordinator, DownloadHandle, DownloadStatus};
pub use error::{DownloadError, FeedError, MetadataError, PlaybackError, SetupError};
pub use feed::{EpisodeRecord, FeedService, format_clock, parse_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use input::{ClickDebouncer, ClickKind};
pub use playback::{
    AudioOutput, NowPlaying, PlaybackController, PlaybackState, PlayerSnapshot, TrackOpener,
};
pub use progress::{
    NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter, TracingReporter,
};
