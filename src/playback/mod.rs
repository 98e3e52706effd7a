// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod controller;
mod output;
#[cfg(feature = "rodio")]
mod rodio_output;

pub use controller::{NowPlaying, PlaybackController, PlaybackState, PlayerSnapshot};
pub use output::{AudioOutput, TrackOpener};
#[cfg(feature = "rodio")]
pub use rodio_output::RodioOutput;
