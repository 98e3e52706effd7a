// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::PlaybackError;
use crate::feed::EpisodeRecord;

use super::output::{AudioOutput, TrackOpener};

/// Status of the single audio output slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// The episode loaded into the output and the file it was loaded from
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub episode: EpisodeRecord,
    pub file: PathBuf,
}

/// Consistent copy of the player for one presentation frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerSnapshot {
    pub state: PlaybackState,
    pub now_playing: Option<NowPlaying>,
    pub position_secs: f64,
}

struct Slot<O> {
    output: O,
    state: PlaybackState,
    // Some exactly when state is Playing or Paused
    now_playing: Option<NowPlaying>,
}

impl<O: AudioOutput> Slot<O> {
    fn reset(&mut self) {
        self.output.stop();
        self.state = PlaybackState::Stopped;
        self.now_playing = None;
    }

    fn position_secs(&self) -> f64 {
        match self.state {
            PlaybackState::Stopped => 0.0,
            PlaybackState::Playing | PlaybackState::Paused => {
                self.output.position_ms() as f64 / 1000.0
            }
        }
    }
}

/// Owns the audio output and its Stopped/Playing/Paused state machine
///
/// Every operation takes the slot lock for its whole duration, so a reader
/// never sees a state that disagrees with the loaded episode. File I/O and
/// decoding happen in [`PlaybackController::open_track`], outside the lock.
pub struct PlaybackController<O: AudioOutput> {
    opener: TrackOpener<O::Track>,
    slot: Mutex<Slot<O>>,
}

impl<O: AudioOutput> PlaybackController<O> {
    pub fn new(output: O) -> Self {
        Self {
            opener: output.opener(),
            slot: Mutex::new(Slot {
                output,
                state: PlaybackState::Stopped,
                now_playing: None,
            }),
        }
    }

    /// Open and decode `path` on the blocking pool
    ///
    /// Touches neither the slot nor the device, so it can run while the
    /// presentation loop keeps reading state.
    pub async fn open_track(&self, path: &Path) -> Result<O::Track, PlaybackError> {
        let opener = self.opener.clone();
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || opener(&owned))
            .await
            .map_err(|e| PlaybackError::LoadFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
    }

    /// Replace whatever is loaded with an opened track and start playing it
    ///
    /// Takes the result of [`PlaybackController::open_track`]. On any error
    /// the controller ends up Stopped with nothing loaded.
    pub fn start_track(
        &self,
        opened: Result<O::Track, PlaybackError>,
        path: &Path,
        episode: EpisodeRecord,
    ) -> Result<(), PlaybackError> {
        let mut slot = self.slot.lock();
        slot.reset();

        if let Err(e) = opened.and_then(|track| slot.output.load(track)) {
            warn!(error = %e, "could not load episode");
            return Err(e);
        }
        slot.output.play();

        info!(index = episode.index, title = %episode.title, "playing");
        slot.state = PlaybackState::Playing;
        slot.now_playing = Some(NowPlaying {
            episode,
            file: path.to_path_buf(),
        });
        Ok(())
    }

    /// Open `path` and play it, replacing whatever was loaded
    ///
    /// If the file cannot be opened the controller ends up Stopped with
    /// nothing loaded.
    pub async fn load_and_play(
        &self,
        path: &Path,
        episode: EpisodeRecord,
    ) -> Result<(), PlaybackError> {
        let opened = self.open_track(path).await;
        self.start_track(opened, path, episode)
    }

    /// Pause when playing, resume when paused; ignored when stopped
    pub fn toggle_play_pause(&self) -> PlaybackState {
        let mut slot = self.slot.lock();
        match slot.state {
            PlaybackState::Playing => {
                slot.output.pause();
                slot.state = PlaybackState::Paused;
            }
            PlaybackState::Paused => {
                slot.output.unpause();
                slot.state = PlaybackState::Playing;
            }
            PlaybackState::Stopped => {}
        }
        debug!(state = %slot.state, "toggled playback");
        slot.state
    }

    /// Silence output and unload; returns once the output is stopped
    pub fn stop(&self) {
        let mut slot = self.slot.lock();
        slot.reset();
        debug!("playback stopped");
    }

    /// Detect the natural end of the loaded track
    ///
    /// Called once per presentation frame. Returns true when this call moved
    /// the controller from Playing to Stopped.
    pub fn tick(&self) -> bool {
        let mut slot = self.slot.lock();
        if slot.state == PlaybackState::Playing && !slot.output.is_busy() {
            if let Some(now_playing) = &slot.now_playing {
                info!(index = now_playing.episode.index, "episode finished");
            }
            slot.reset();
            return true;
        }
        false
    }

    pub fn state(&self) -> PlaybackState {
        self.slot.lock().state
    }

    pub fn current_episode(&self) -> Option<EpisodeRecord> {
        self.slot
            .lock()
            .now_playing
            .as_ref()
            .map(|n| n.episode.clone())
    }

    pub fn current_file(&self) -> Option<PathBuf> {
        self.slot.lock().now_playing.as_ref().map(|n| n.file.clone())
    }

    /// Seconds played since load, excluding pauses; 0 when stopped
    pub fn position_seconds(&self) -> f64 {
        self.slot.lock().position_secs()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let slot = self.slot.lock();
        PlayerSnapshot {
            state: slot.state,
            now_playing: slot.now_playing.clone(),
            position_secs: slot.position_secs(),
        }
    }
}
