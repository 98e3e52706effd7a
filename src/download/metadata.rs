// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;
use crate::feed::EpisodeRecord;

/// Sidecar describing which episode a downloaded file holds
///
/// File names only carry the list index, which can point at a different
/// episode after a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    pub index: usize,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    pub source_url: String,
    pub audio_filename: String,
    pub bytes: u64,
    pub downloaded_at: String,
}

impl EpisodeMetadata {
    pub fn from_record(episode: &EpisodeRecord, audio_filename: &str, bytes: u64) -> Self {
        Self {
            index: episode.index,
            title: episode.title.clone(),
            published: episode.published.map(|dt| dt.to_rfc3339()),
            source_url: episode.source_url.to_string(),
            audio_filename: audio_filename.to_string(),
            bytes,
            downloaded_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Write episode metadata to a JSON file
pub fn write_episode_metadata(metadata: &EpisodeMetadata, path: &Path) -> Result<(), MetadataError> {
    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(path, json).map_err(|e| MetadataError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read episode metadata from a JSON file
pub fn read_episode_metadata(path: &Path) -> Result<EpisodeMetadata, MetadataError> {
    let content = std::fs::read_to_string(path).map_err(|e| MetadataError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&content).map_err(|e| MetadataError::JsonParseFailed {
        path: path.to_path_buf(),
        source: e,
    })
}
