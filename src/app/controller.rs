// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::PlayerConfig;
use crate::download::{DownloadCoordinator, DownloadStatus};
use crate::error::{DownloadError, FeedError, PlaybackError, SetupError};
use crate::feed::{EpisodeRecord, FeedService};
use crate::http::HttpClient;
use crate::playback::{AudioOutput, PlaybackController, PlaybackState, PlayerSnapshot};
use crate::progress::SharedProgressReporter;

use super::ledger::{Admission, RequestLedger};

/// How a play request ended
#[derive(Debug)]
pub enum PlayOutcome {
    /// The episode was downloaded and is now playing
    Started { index: usize, path: PathBuf },
    /// The episode was downloaded but a later request won; the file stays
    /// on disk
    Superseded { index: usize, path: PathBuf },
    /// A transfer of this episode was already running and will deliver it
    Joined { index: usize },
    /// No episode at that index in the current list
    UnknownEpisode { index: usize },
    /// A refresh put another episode at this index and a newer transfer
    /// for it took over; this body was discarded
    Displaced { index: usize },
    DownloadFailed { index: usize, error: DownloadError },
    LoadFailed { index: usize, error: PlaybackError },
}

/// Everything the presentation layer reads for one frame
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub podcast_title: String,
    pub episodes: Arc<[EpisodeRecord]>,
    pub download: DownloadStatus,
    pub player: PlayerSnapshot,
}

/// Turns user intents into downloads and playback
///
/// This is the only place that decides whether a play request supersedes
/// an earlier one. Cloning is cheap and clones share all state, so a clone
/// can be moved into a background task.
pub struct AppController<C, O: AudioOutput> {
    feed: Arc<FeedService<C>>,
    downloads: Arc<DownloadCoordinator<C>>,
    playback: Arc<PlaybackController<O>>,
    ledger: Arc<RequestLedger>,
    episodes: Arc<RwLock<Arc<[EpisodeRecord]>>>,
    limit: usize,
}

impl<C, O: AudioOutput> Clone for AppController<C, O> {
    fn clone(&self) -> Self {
        Self {
            feed: self.feed.clone(),
            downloads: self.downloads.clone(),
            playback: self.playback.clone(),
            ledger: self.ledger.clone(),
            episodes: self.episodes.clone(),
            limit: self.limit,
        }
    }
}

impl<C: HttpClient + Clone + 'static, O: AudioOutput> AppController<C, O> {
    pub fn new(
        feed: FeedService<C>,
        downloads: DownloadCoordinator<C>,
        playback: PlaybackController<O>,
        limit: usize,
    ) -> Self {
        Self {
            feed: Arc::new(feed),
            downloads: Arc::new(downloads),
            playback: Arc::new(playback),
            ledger: Arc::new(RequestLedger::new()),
            episodes: Arc::new(RwLock::new(Arc::from(Vec::new()))),
            limit,
        }
    }

    /// Assemble a controller from configuration; the episode list starts
    /// empty until the first refresh
    pub fn from_config(
        client: C,
        config: &PlayerConfig,
        output: O,
        reporter: SharedProgressReporter,
    ) -> Result<Self, SetupError> {
        let feed = FeedService::new(client.clone(), &config.feed_url)?;
        let downloads = DownloadCoordinator::new(client, &config.downloads_dir, reporter)?;
        let playback = PlaybackController::new(output);
        Ok(Self::new(feed, downloads, playback, config.limit))
    }

    pub fn episodes(&self) -> Arc<[EpisodeRecord]> {
        self.episodes.read().clone()
    }

    pub fn episode(&self, index: usize) -> Option<EpisodeRecord> {
        self.episodes.read().get(index).cloned()
    }

    pub fn podcast_title(&self) -> String {
        self.feed.podcast_title()
    }

    /// Replace the episode list with a fresh fetch
    ///
    /// Runs in the background. A failed fetch keeps the current list.
    /// Running downloads and playback are left alone even if their episode
    /// is gone from the new list.
    pub fn refresh(&self) -> JoinHandle<Result<usize, FeedError>> {
        let feed = self.feed.clone();
        let episodes = self.episodes.clone();
        let limit = self.limit;

        tokio::spawn(async move {
            match feed.fetch(limit).await {
                Ok(fetched) => {
                    let count = fetched.len();
                    *episodes.write() = Arc::from(fetched);
                    info!(count, "episode list refreshed");
                    Ok(count)
                }
                Err(e) => {
                    warn!(error = %e, "refresh failed; keeping current episode list");
                    Err(e)
                }
            }
        })
    }

    /// Download episode `index` in the background and play it when done
    ///
    /// If another play request is issued before this one finishes, this
    /// one's result is discarded.
    pub fn play_episode(&self, index: usize) -> JoinHandle<PlayOutcome> {
        let Some(episode) = self.episode(index) else {
            warn!(index, "no such episode");
            return tokio::spawn(async move { PlayOutcome::UnknownEpisode { index } });
        };

        let owner = match self.ledger.admit(&episode) {
            Admission::Start(ticket) => ticket,
            Admission::Joined { ticket, job } => {
                if let Some(job) = job {
                    self.downloads.promote(job);
                }
                info!(index, ticket, "episode already downloading; joined running transfer");
                return tokio::spawn(async move { PlayOutcome::Joined { index } });
            }
        };

        let handle = self.downloads.start(episode.clone());
        self.ledger.attach_job(index, owner, handle.job());

        let ledger = self.ledger.clone();
        let playback = self.playback.clone();

        tokio::spawn(async move {
            let path = match handle.finish().await {
                Ok(path) => path,
                Err(DownloadError::Displaced { .. }) => {
                    ledger.release(index, owner);
                    info!(index, "download displaced by a newer transfer of this index");
                    return PlayOutcome::Displaced { index };
                }
                Err(error) => {
                    ledger.release(index, owner);
                    warn!(index, error = %error, "download failed");
                    return PlayOutcome::DownloadFailed { index, error };
                }
            };

            // Decoding happens before the ledger is locked; the commit only
            // swaps the opened track into the output
            let opened = playback.open_track(&path).await;
            match ledger.settle(index, owner, || playback.start_track(opened, &path, episode)) {
                Some(Ok(())) => PlayOutcome::Started { index, path },
                Some(Err(error)) => PlayOutcome::LoadFailed { index, error },
                None => {
                    info!(index, "download superseded by a newer request; not playing");
                    PlayOutcome::Superseded { index, path }
                }
            }
        })
    }

    /// Silence output immediately
    pub fn stop(&self) {
        self.playback.stop();
    }

    pub fn toggle_play_pause(&self) -> PlaybackState {
        self.playback.toggle_play_pause()
    }

    /// Per-frame housekeeping; returns true when a track just ended
    pub fn tick(&self) -> bool {
        self.playback.tick()
    }

    pub fn download_progress(&self) -> f64 {
        self.downloads.progress()
    }

    pub fn is_downloading(&self) -> bool {
        self.downloads.is_active()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn current_episode(&self) -> Option<EpisodeRecord> {
        self.playback.current_episode()
    }

    pub fn position_seconds(&self) -> f64 {
        self.playback.position_seconds()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            podcast_title: self.podcast_title(),
            episodes: self.episodes(),
            download: self.downloads.status(),
            player: self.playback.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopReporter;
    use crate::testing::{ChannelClient, FakeOutput, feed_xml, wait_for};
    use bytes::Bytes;
    use std::time::{Duration, Instant};
    use tempfile::{TempDir, tempdir};

    struct Harness {
        app: AppController<ChannelClient, FakeOutput>,
        client: ChannelClient,
        output: FakeOutput,
        dir: TempDir,
    }

    async fn harness(episodes: usize) -> Harness {
        let dir = tempdir().unwrap();
        let client = ChannelClient::new();
        client.set_feed(feed_xml("Harness Podcast", episodes));
        let output = FakeOutput::new();
        let config = PlayerConfig {
            feed_url: "https://example.com/feed.xml".to_string(),
            downloads_dir: dir.path().to_path_buf(),
            ..PlayerConfig::default()
        };

        let app = AppController::from_config(
            client.clone(),
            &config,
            output.clone(),
            NoopReporter::shared(),
        )
        .unwrap();
        app.refresh().await.unwrap().unwrap();

        Harness {
            app,
            client,
            output,
            dir,
        }
    }

    fn url(index: usize) -> String {
        format!("https://example.com/{index}.mp3")
    }

    #[tokio::test]
    async fn refresh_loads_episode_list() {
        let h = harness(3).await;

        assert_eq!(h.app.episodes().len(), 3);
        assert_eq!(h.app.podcast_title(), "Harness Podcast");
        assert_eq!(h.app.episode(2).unwrap().index, 2);
        assert!(h.app.episode(3).is_none());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_list() {
        let h = harness(3).await;
        h.client.set_feed("<<not a feed>>");

        let result = h.app.refresh().await.unwrap();

        assert!(result.is_err());
        assert_eq!(h.app.episodes().len(), 3);
        assert_eq!(h.app.podcast_title(), "Harness Podcast");
    }

    #[tokio::test]
    async fn play_downloads_then_plays() {
        let h = harness(3).await;
        let body = h.client.serve(&url(1), Some(4));

        let request = h.app.play_episode(1);
        wait_for(|| h.app.is_downloading()).await;
        assert_eq!(h.app.playback_state(), PlaybackState::Stopped);

        body.send(Ok(Bytes::from_static(b"abcd"))).unwrap();
        drop(body);

        let outcome = request.await.unwrap();
        let expected = h.dir.path().join("episode_1.mp3");
        assert!(matches!(outcome, PlayOutcome::Started { index: 1, ref path } if *path == expected));
        assert_eq!(h.app.playback_state(), PlaybackState::Playing);
        assert_eq!(h.app.current_episode().unwrap().index, 1);
        assert_eq!(h.output.loaded(), Some(expected));
        assert!(!h.app.is_downloading());
    }

    #[tokio::test]
    async fn later_request_wins_when_earlier_finishes_last() {
        let h = harness(10).await;
        let five = h.client.serve(&url(5), Some(3));
        let six = h.client.serve(&url(6), Some(3));

        let first = h.app.play_episode(5);
        let second = h.app.play_episode(6);

        six.send(Ok(Bytes::from_static(b"six"))).unwrap();
        drop(six);
        assert!(matches!(second.await.unwrap(), PlayOutcome::Started { index: 6, .. }));

        five.send(Ok(Bytes::from_static(b"fiv"))).unwrap();
        drop(five);
        assert!(matches!(first.await.unwrap(), PlayOutcome::Superseded { index: 5, .. }));

        assert_eq!(h.app.current_episode().unwrap().index, 6);
        assert_eq!(h.output.load_count(), 1);
        assert!(h.dir.path().join("episode_5.mp3").exists());
    }

    #[tokio::test]
    async fn later_request_wins_when_earlier_finishes_first() {
        let h = harness(10).await;
        let five = h.client.serve(&url(5), Some(3));
        let six = h.client.serve(&url(6), Some(3));

        let first = h.app.play_episode(5);
        let second = h.app.play_episode(6);

        five.send(Ok(Bytes::from_static(b"fiv"))).unwrap();
        drop(five);
        assert!(matches!(first.await.unwrap(), PlayOutcome::Superseded { index: 5, .. }));
        assert_eq!(h.app.playback_state(), PlaybackState::Stopped);

        six.send(Ok(Bytes::from_static(b"six"))).unwrap();
        drop(six);
        assert!(matches!(second.await.unwrap(), PlayOutcome::Started { index: 6, .. }));
        assert_eq!(h.output.load_count(), 1);
    }

    #[tokio::test]
    async fn repeat_request_joins_running_download() {
        let h = harness(10).await;
        let five = h.client.serve(&url(5), Some(3));
        let six = h.client.serve(&url(6), Some(3));

        let first = h.app.play_episode(5);
        let second = h.app.play_episode(6);
        let third = h.app.play_episode(5);

        assert!(matches!(third.await.unwrap(), PlayOutcome::Joined { index: 5 }));
        assert_eq!(h.app.snapshot().download.episode_index, Some(5));

        six.send(Ok(Bytes::from_static(b"six"))).unwrap();
        drop(six);
        assert!(matches!(second.await.unwrap(), PlayOutcome::Superseded { index: 6, .. }));

        five.send(Ok(Bytes::from_static(b"fiv"))).unwrap();
        drop(five);
        assert!(matches!(first.await.unwrap(), PlayOutcome::Started { index: 5, .. }));
        assert_eq!(h.app.current_episode().unwrap().index, 5);
    }

    #[tokio::test]
    async fn failed_download_leaves_playback_untouched() {
        let h = harness(3).await;
        let ok = h.client.serve(&url(0), Some(2));
        ok.send(Ok(Bytes::from_static(b"ok"))).unwrap();
        drop(ok);
        h.app.play_episode(0).await.unwrap();

        let broken = h.client.serve(&url(1), Some(10));
        let request = h.app.play_episode(1);
        broken.send(Ok(Bytes::from_static(b"abc"))).unwrap();
        broken
            .send(Err(std::io::Error::other("connection reset")))
            .unwrap();

        assert!(matches!(
            request.await.unwrap(),
            PlayOutcome::DownloadFailed { index: 1, .. }
        ));
        assert_eq!(h.app.current_episode().unwrap().index, 0);
        assert_eq!(h.app.playback_state(), PlaybackState::Playing);
        assert!(!h.dir.path().join("episode_1.mp3").exists());

        // Retrying the same episode starts a fresh transfer
        let retry = h.client.serve(&url(1), Some(3));
        retry.send(Ok(Bytes::from_static(b"abc"))).unwrap();
        drop(retry);
        assert!(matches!(
            h.app.play_episode(1).await.unwrap(),
            PlayOutcome::Started { index: 1, .. }
        ));
    }

    #[tokio::test]
    async fn load_failure_returns_to_stopped() {
        let h = harness(3).await;
        let body = h.client.serve(&url(2), Some(3));
        body.send(Ok(Bytes::from_static(b"bad"))).unwrap();
        drop(body);
        h.output.fail_next_load();

        let outcome = h.app.play_episode(2).await.unwrap();

        assert!(matches!(outcome, PlayOutcome::LoadFailed { index: 2, .. }));
        assert_eq!(h.app.playback_state(), PlaybackState::Stopped);
        assert!(h.app.current_episode().is_none());
    }

    #[tokio::test]
    async fn unknown_index_is_reported() {
        let h = harness(3).await;

        let outcome = h.app.play_episode(99).await.unwrap();

        assert!(matches!(outcome, PlayOutcome::UnknownEpisode { index: 99 }));
        assert!(!h.app.is_downloading());
    }

    #[tokio::test]
    async fn stop_silences_while_newer_download_runs() {
        let h = harness(3).await;
        let first = h.client.serve(&url(0), Some(1));
        first.send(Ok(Bytes::from_static(b"a"))).unwrap();
        drop(first);
        h.app.play_episode(0).await.unwrap();

        let pending = h.client.serve(&url(1), Some(1));
        let request = h.app.play_episode(1);
        h.app.stop();

        assert_eq!(h.app.playback_state(), PlaybackState::Stopped);
        assert!(!h.output.is_playing());
        assert!(h.app.current_episode().is_none());
        assert!(h.app.is_downloading());

        pending.send(Ok(Bytes::from_static(b"b"))).unwrap();
        drop(pending);
        request.await.unwrap();
    }

    #[tokio::test]
    async fn controls_forward_to_player() {
        let h = harness(3).await;
        assert_eq!(h.app.toggle_play_pause(), PlaybackState::Stopped);

        let body = h.client.serve(&url(0), Some(1));
        body.send(Ok(Bytes::from_static(b"a"))).unwrap();
        drop(body);
        h.app.play_episode(0).await.unwrap();

        assert_eq!(h.app.toggle_play_pause(), PlaybackState::Paused);
        assert_eq!(h.app.toggle_play_pause(), PlaybackState::Playing);

        h.output.set_position_ms(1500);
        assert_eq!(h.app.position_seconds(), 1.5);

        h.output.finish_track();
        assert!(h.app.tick());
        assert_eq!(h.app.playback_state(), PlaybackState::Stopped);
        assert_eq!(h.app.position_seconds(), 0.0);
    }

    #[tokio::test]
    async fn refresh_does_not_interrupt_download_or_playback() {
        let h = harness(3).await;
        let playing = h.client.serve(&url(0), Some(1));
        playing.send(Ok(Bytes::from_static(b"a"))).unwrap();
        drop(playing);
        h.app.play_episode(0).await.unwrap();

        let body = h.client.serve(&url(2), Some(2));
        let request = h.app.play_episode(2);
        wait_for(|| h.app.download_progress() == 0.0 && h.app.is_downloading()).await;

        h.client.set_feed(feed_xml("Smaller Podcast", 1));
        assert_eq!(h.app.refresh().await.unwrap().unwrap(), 1);
        assert_eq!(h.app.current_episode().unwrap().index, 0);
        assert!(h.app.is_downloading());

        body.send(Ok(Bytes::from_static(b"zz"))).unwrap();
        drop(body);
        assert!(matches!(request.await.unwrap(), PlayOutcome::Started { index: 2, .. }));
        assert_eq!(h.app.current_episode().unwrap().title, "Episode 2");
        assert_eq!(h.app.episodes().len(), 1);
    }

    #[tokio::test]
    async fn replay_after_refresh_keeps_newest_episode_on_disk() {
        let h = harness(3).await;
        let old_body = h.client.serve(&url(0), Some(3));
        let old_request = h.app.play_episode(0);

        // A newly published episode shifts the old one off index 0
        h.client.set_feed(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Harness Podcast</title><description>d</description><item><title>Fresh</title><enclosure url="https://example.com/new0.mp3" type="audio/mpeg"/></item></channel></rss>"#,
        );
        h.app.refresh().await.unwrap().unwrap();
        let new_body = h.client.serve("https://example.com/new0.mp3", Some(3));
        let new_request = h.app.play_episode(0);

        new_body.send(Ok(Bytes::from_static(b"NEW"))).unwrap();
        drop(new_body);
        assert!(matches!(
            new_request.await.unwrap(),
            PlayOutcome::Started { index: 0, .. }
        ));

        old_body.send(Ok(Bytes::from_static(b"OLD"))).unwrap();
        drop(old_body);
        assert!(matches!(
            old_request.await.unwrap(),
            PlayOutcome::Displaced { index: 0 }
        ));

        let playing = h.output.loaded().unwrap();
        assert_eq!(std::fs::read(&playing).unwrap(), b"NEW");
        assert_eq!(h.app.current_episode().unwrap().title, "Fresh");
        assert_eq!(h.output.load_count(), 1);
    }

    #[tokio::test]
    async fn slow_decode_does_not_block_new_requests() {
        let h = harness(3).await;
        h.output.set_open_delay(Duration::from_millis(300));
        let first = h.client.serve(&url(0), Some(1));
        first.send(Ok(Bytes::from_static(b"a"))).unwrap();
        drop(first);
        let first_request = h.app.play_episode(0);
        wait_for(|| h.output.open_count() == 1).await;

        let second = h.client.serve(&url(1), Some(1));
        let started = Instant::now();
        let second_request = h.app.play_episode(1);
        let snapshot = h.app.snapshot();
        h.app.tick();
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(snapshot.player.state, PlaybackState::Stopped);

        assert!(matches!(
            first_request.await.unwrap(),
            PlayOutcome::Superseded { index: 0, .. }
        ));
        second.send(Ok(Bytes::from_static(b"b"))).unwrap();
        drop(second);
        assert!(matches!(
            second_request.await.unwrap(),
            PlayOutcome::Started { index: 1, .. }
        ));
        assert_eq!(h.output.load_count(), 1);
    }
}
