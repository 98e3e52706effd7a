// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;
use std::sync::Arc;

use crate::error::PlaybackError;

/// Opens and decodes an audio file without touching the output device
///
/// Runs on a blocking thread, so it may do file I/O freely.
pub type TrackOpener<T> = Arc<dyn Fn(&Path) -> Result<T, PlaybackError> + Send + Sync>;

/// A single-stream audio device
///
/// Holds at most one loaded track. Opening a file is split from loading it:
/// the opener does the slow work off the device, and `load` only hands the
/// decoded stream over. `load` replaces whatever was loaded before and
/// leaves the new stream paused until `play` is called.
pub trait AudioOutput: Send + 'static {
    /// A decoded stream ready to be handed to the device
    type Track: Send + 'static;

    /// Opener for tracks this output can load
    fn opener(&self) -> TrackOpener<Self::Track>;

    fn load(&mut self, track: Self::Track) -> Result<(), PlaybackError>;

    /// Start the loaded stream from its beginning
    fn play(&mut self);

    fn pause(&mut self);

    fn unpause(&mut self);

    /// Halt output and unload the stream; a no-op when nothing is loaded
    fn stop(&mut self);

    /// Elapsed playback time of the loaded stream, excluding paused time
    fn position_ms(&self) -> u64;

    /// Whether the loaded stream still has audio left to play
    fn is_busy(&self) -> bool;
}
