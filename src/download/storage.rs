// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use tracing::debug;

use crate::error::DownloadError;

use super::path::{PARTIAL_SUFFIX, episode_stem};

/// Make sure the downloads directory exists and drop stale partial files
///
/// Returns the number of partial files removed. Partial files can only be
/// left behind by a process that died mid-transfer, so none of them belong
/// to a live job at startup.
pub fn prepare_downloads_dir(downloads_dir: &Path) -> Result<usize, DownloadError> {
    if !downloads_dir.exists() {
        std::fs::create_dir_all(downloads_dir).map_err(|e| {
            DownloadError::CreateDirectoryFailed {
                path: downloads_dir.to_path_buf(),
                source: e,
            }
        })?;
        return Ok(0);
    }

    let entries =
        std::fs::read_dir(downloads_dir).map_err(|e| DownloadError::ReadDirectoryFailed {
            path: downloads_dir.to_path_buf(),
            source: e,
        })?;

    let mut cleaned = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_partial = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(PARTIAL_SUFFIX));

        if is_partial && std::fs::remove_file(&path).is_ok() {
            cleaned += 1;
        }
    }

    Ok(cleaned)
}

/// Remove audio files of `index` other than `keep`
///
/// An episode's extension can change between feed refreshes; after a
/// download lands only the newest audio file of that index remains. The
/// sidecar and partial files are left alone.
pub async fn remove_replaced_audio(keep: &Path, index: usize) {
    let Some(dir) = keep.parent() else { return };
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    let prefix = format!("{}.", episode_stem(index));

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let replaced = name.starts_with(&prefix)
            && !name.ends_with(PARTIAL_SUFFIX)
            && !name.ends_with(".json")
            && path != keep;

        if replaced && tokio::fs::remove_file(&path).await.is_ok() {
            debug!(path = %path.display(), "removed replaced audio file");
        }
    }
}
