// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use tracing::{debug, info, warn};

/// Events emitted by episode transfers
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The response arrived and the body is about to be streamed
    TransferStarting {
        /// Identifies the download job
        job: u64,
        episode_index: usize,
        episode_title: String,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// A chunk was written to disk
    TransferProgress {
        job: u64,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// The body was fully written and moved into place
    TransferCompleted {
        job: u64,
        episode_title: String,
        bytes_downloaded: u64,
    },

    /// The transfer failed and its partial file was removed
    TransferFailed {
        job: u64,
        episode_title: String,
        error: String,
    },

    /// The body arrived after a newer transfer of the same index took over
    /// and was thrown away
    TransferDiscarded { job: u64, episode_title: String },

    /// Leftover partial files were removed from the downloads directory
    PartialFilesCleanedUp { count: usize },
}

/// Trait for observing transfer events.
///
/// The download coordinator feeds its pollable progress state through this
/// seam; other implementations log or collect events.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Writes transfer events to the `tracing` log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl TracingReporter {
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

impl ProgressReporter for TracingReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::TransferStarting {
                job,
                episode_index,
                episode_title,
                content_length,
            } => {
                info!(job, episode_index, title = %episode_title, ?content_length, "transfer starting");
            }
            ProgressEvent::TransferProgress {
                job,
                bytes_downloaded,
                total_bytes,
            } => {
                debug!(job, bytes_downloaded, ?total_bytes, "transfer progress");
            }
            ProgressEvent::TransferCompleted {
                job,
                episode_title,
                bytes_downloaded,
            } => {
                info!(job, title = %episode_title, bytes_downloaded, "transfer completed");
            }
            ProgressEvent::TransferFailed {
                job,
                episode_title,
                error,
            } => {
                warn!(job, title = %episode_title, %error, "transfer failed");
            }
            ProgressEvent::TransferDiscarded { job, episode_title } => {
                info!(job, title = %episode_title, "transfer replaced by a newer one; body discarded");
            }
            ProgressEvent::PartialFilesCleanedUp { count } => {
                info!(count, "removed leftover partial downloads");
            }
        }
    }
}
