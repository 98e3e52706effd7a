// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod coordinator;
mod metadata;
mod path;
mod storage;
mod transfer;

pub use coordinator::{DownloadCoordinator, DownloadHandle, DownloadStatus, JobId};
pub use metadata::{EpisodeMetadata, read_episode_metadata, write_episode_metadata};
pub use path::{audio_extension, destination_path, metadata_path, partial_path};
pub use storage::prepare_downloads_dir;
pub use transfer::{StagedDownload, stage_episode};
