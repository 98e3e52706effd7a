// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;
use crate::feed::EpisodeRecord;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

use super::path::partial_path;
use super::storage::remove_replaced_audio;

/// A fully received body waiting in its job-specific partial file
///
/// Nothing is visible at the destination until [`StagedDownload::publish`]
/// runs. Whoever holds it decides between publishing and discarding.
#[must_use = "a staged download must be published or discarded"]
pub struct StagedDownload {
    job: u64,
    index: usize,
    title: String,
    partial: PathBuf,
    bytes: u64,
    reporter: SharedProgressReporter,
}

/// Stream an episode into a partial file next to `destination`
///
/// The partial file is named after the job, so transfers of the same index
/// never share a file. On any failure it is removed again.
pub async fn stage_episode<C: HttpClient>(
    client: &C,
    episode: &EpisodeRecord,
    destination: &Path,
    job: u64,
    reporter: &SharedProgressReporter,
) -> Result<StagedDownload, DownloadError> {
    let partial = partial_path(destination, job);

    match stream_to_file(client, episode, &partial, job, reporter).await {
        Ok(bytes) => Ok(StagedDownload {
            job,
            index: episode.index,
            title: episode.title.clone(),
            partial,
            bytes,
            reporter: reporter.clone(),
        }),
        Err(e) => {
            // The file may not exist if the request itself failed
            let _ = tokio::fs::remove_file(&partial).await;
            reporter.report(ProgressEvent::TransferFailed {
                job,
                episode_title: episode.title.clone(),
                error: e.to_string(),
            });
            Err(e)
        }
    }
}

impl StagedDownload {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Move the body over `destination`
    ///
    /// Audio files of the same index with another extension are removed, so
    /// an index holds one audio file at a time. Returns the bytes written.
    pub async fn publish(self, destination: &Path) -> Result<u64, DownloadError> {
        if let Err(source) = tokio::fs::rename(&self.partial, destination).await {
            let _ = tokio::fs::remove_file(&self.partial).await;
            let error = DownloadError::FileWriteFailed {
                path: destination.to_path_buf(),
                source,
            };
            self.reporter.report(ProgressEvent::TransferFailed {
                job: self.job,
                episode_title: self.title,
                error: error.to_string(),
            });
            return Err(error);
        }

        remove_replaced_audio(destination, self.index).await;

        self.reporter.report(ProgressEvent::TransferCompleted {
            job: self.job,
            episode_title: self.title,
            bytes_downloaded: self.bytes,
        });
        Ok(self.bytes)
    }

    /// Drop the body without touching the destination
    pub async fn discard(self) {
        let _ = tokio::fs::remove_file(&self.partial).await;
        self.reporter.report(ProgressEvent::TransferDiscarded {
            job: self.job,
            episode_title: self.title,
        });
    }
}

async fn stream_to_file<C: HttpClient>(
    client: &C,
    episode: &EpisodeRecord,
    output_path: &Path,
    job: u64,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let url = episode.source_url.as_str();

    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::TransferStarting {
        job,
        episode_index: episode.index,
        episode_title: episode.title.clone(),
        content_length: response.content_length,
    });

    let mut file =
        File::create(output_path)
            .await
            .map_err(|e| DownloadError::FileCreateFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::TransferProgress {
            job,
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_downloaded)
}
