// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::DownloadError;
use crate::feed::EpisodeRecord;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, ProgressReporter, SharedProgressReporter};

use super::metadata::{EpisodeMetadata, write_episode_metadata};
use super::path::{destination_path, metadata_path};
use super::storage::prepare_downloads_dir;
use super::transfer::stage_episode;

/// Identifies one download job; strictly increasing per coordinator
pub type JobId = u64;

/// Pollable view of the current download
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DownloadStatus {
    pub active: bool,
    /// 0..=100; stays 0 while the total size is unknown
    pub progress: f64,
    pub job: Option<JobId>,
    pub episode_index: Option<usize>,
    /// Title of the episode being fetched, as it was when the job started
    pub episode_title: Option<String>,
}

#[derive(Debug)]
struct RunningJob {
    episode_index: usize,
    episode_title: String,
    progress: f64,
}

#[derive(Debug, Default)]
struct JobState {
    /// The job whose progress is observable
    current: Option<JobId>,
    /// Jobs still streaming
    running: HashMap<JobId, RunningJob>,
    /// Newest job per episode index; only it may publish to that index
    owners: HashMap<usize, JobId>,
}

impl JobState {
    fn status(&self) -> DownloadStatus {
        match self.current.and_then(|job| self.running.get(&job).map(|r| (job, r))) {
            Some((job, running)) => DownloadStatus {
                active: true,
                progress: running.progress,
                job: Some(job),
                episode_index: Some(running.episode_index),
                episode_title: Some(running.episode_title.clone()),
            },
            None => DownloadStatus::default(),
        }
    }

    fn owns_index(&self, index: usize, job: JobId) -> bool {
        self.owners.get(&index) == Some(&job)
    }
}

/// Owns episode downloads and their observable progress
///
/// Starting a download while another one runs makes the new job the
/// current one. The older job is not cancelled: it keeps streaming into its
/// own partial file, but its progress is no longer observable and its
/// result is handed back only to whoever holds its [`DownloadHandle`].
///
/// Each episode index has one destination file. When two jobs for the same
/// index overlap, only the newest one publishes there; the older job's body
/// is discarded and it finishes with [`DownloadError::Displaced`].
pub struct DownloadCoordinator<C> {
    client: C,
    downloads_dir: PathBuf,
    reporter: SharedProgressReporter,
    state: Arc<Mutex<JobState>>,
    // Serializes the ownership check with the rename that follows it
    publish: Arc<tokio::sync::Mutex<()>>,
    next_job: AtomicU64,
}

impl<C: HttpClient + Clone + 'static> DownloadCoordinator<C> {
    /// Create a coordinator writing into `downloads_dir`
    ///
    /// The directory is created if absent and leftover partial files from a
    /// previous run are removed.
    pub fn new(
        client: C,
        downloads_dir: impl Into<PathBuf>,
        reporter: SharedProgressReporter,
    ) -> Result<Self, DownloadError> {
        let downloads_dir = downloads_dir.into();
        let cleaned = prepare_downloads_dir(&downloads_dir)?;
        if cleaned > 0 {
            reporter.report(ProgressEvent::PartialFilesCleanedUp { count: cleaned });
        }

        Ok(Self {
            client,
            downloads_dir,
            reporter,
            state: Arc::new(Mutex::new(JobState::default())),
            publish: Arc::new(tokio::sync::Mutex::new(())),
            next_job: AtomicU64::new(0),
        })
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Where `episode` lands once downloaded
    pub fn destination_for(&self, episode: &EpisodeRecord) -> PathBuf {
        destination_path(&self.downloads_dir, episode)
    }

    pub fn status(&self) -> DownloadStatus {
        self.state.lock().status()
    }

    pub fn progress(&self) -> f64 {
        self.status().progress
    }

    pub fn is_active(&self) -> bool {
        self.status().active
    }

    /// Make a still-running job the observable one again
    ///
    /// Returns false if the job has already finished.
    pub fn promote(&self, job: JobId) -> bool {
        let mut state = self.state.lock();
        if state.running.contains_key(&job) {
            state.current = Some(job);
            true
        } else {
            false
        }
    }

    /// Start downloading `episode` on a background task
    pub fn start(&self, episode: EpisodeRecord) -> DownloadHandle {
        let job = self.next_job.fetch_add(1, Ordering::SeqCst) + 1;
        let destination = self.destination_for(&episode);
        let episode_index = episode.index;

        {
            let mut state = self.state.lock();
            if let Some(previous) = state.current.filter(|j| state.running.contains_key(j)) {
                debug!(previous, job, "new download supersedes running job");
            }
            if let Some(previous) = state.owners.insert(episode_index, job) {
                debug!(previous, job, episode_index, "new download takes over episode index");
            }
            state.running.insert(
                job,
                RunningJob {
                    episode_index,
                    episode_title: episode.title.clone(),
                    progress: 0.0,
                },
            );
            state.current = Some(job);
        }

        info!(job, episode_index, title = %episode.title, path = %destination.display(), "starting download");

        let reporter: SharedProgressReporter = Arc::new(JobReporter {
            job,
            state: self.state.clone(),
            inner: self.reporter.clone(),
        });
        let client = self.client.clone();
        let state = self.state.clone();
        let downloads_dir = self.downloads_dir.clone();
        let task_destination = destination.clone();
        let publish = self.publish.clone();

        let task = tokio::spawn(async move {
            let result =
                match stage_episode(&client, &episode, &task_destination, job, &reporter).await {
                    Ok(staged) => {
                        let _publishing = publish.lock().await;
                        let owns = state.lock().owns_index(episode_index, job);
                        if owns {
                            let published = staged.publish(&task_destination).await;
                            if let Ok(bytes) = published {
                                write_sidecar(&downloads_dir, &episode, &task_destination, bytes);
                            }
                            published.map(|_| task_destination)
                        } else {
                            debug!(job, episode_index, "newer download owns this index; discarding");
                            staged.discard().await;
                            Err(DownloadError::Displaced {
                                index: episode_index,
                            })
                        }
                    }
                    Err(e) => Err(e),
                };

            {
                let mut state = state.lock();
                state.running.remove(&job);
                if state.current == Some(job) {
                    state.current = None;
                }
                if state.owns_index(episode_index, job) {
                    state.owners.remove(&episode_index);
                }
            }

            result
        });

        DownloadHandle {
            job,
            episode_index,
            destination,
            task,
        }
    }
}

fn write_sidecar(downloads_dir: &Path, episode: &EpisodeRecord, audio: &Path, bytes: u64) {
    let audio_filename = audio
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let metadata = EpisodeMetadata::from_record(episode, &audio_filename, bytes);
    let path = metadata_path(downloads_dir, episode.index);

    if let Err(e) = write_episode_metadata(&metadata, &path) {
        warn!(error = %e, "could not write episode metadata");
    }
}

/// Feeds one job's transfer events into the shared progress state
struct JobReporter {
    job: JobId,
    state: Arc<Mutex<JobState>>,
    inner: SharedProgressReporter,
}

impl ProgressReporter for JobReporter {
    fn report(&self, event: ProgressEvent) {
        if let ProgressEvent::TransferProgress {
            bytes_downloaded,
            total_bytes: Some(total),
            ..
        } = event
            && total > 0
        {
            let percent = (bytes_downloaded as f64 / total as f64 * 100.0).min(100.0);
            let mut state = self.state.lock();
            if let Some(running) = state.running.get_mut(&self.job) {
                // Never roll back, even if a server under-reports its length
                running.progress = running.progress.max(percent);
            }
        }

        self.inner.report(event);
    }
}

/// A running download job
///
/// Awaiting [`DownloadHandle::finish`] yields the final path on success.
/// Dropping the handle does not stop the transfer.
#[derive(Debug)]
pub struct DownloadHandle {
    job: JobId,
    episode_index: usize,
    destination: PathBuf,
    task: JoinHandle<Result<PathBuf, DownloadError>>,
}

impl DownloadHandle {
    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn episode_index(&self) -> usize {
        self.episode_index
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Wait for the transfer to end
    pub async fn finish(self) -> Result<PathBuf, DownloadError> {
        self.task
            .await
            .map_err(|e| DownloadError::Interrupted {
                index: self.episode_index,
                reason: e.to_string(),
            })?
    }
}
