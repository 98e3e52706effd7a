// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, mpsc};
use std::thread;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tracing::debug;

use crate::error::PlaybackError;

use super::output::{AudioOutput, TrackOpener};

/// Audio output on the default device via rodio
///
/// `OutputStream` is not `Send`, so it lives on a parked thread for the
/// lifetime of this value; only its handle and the current sink are kept
/// here.
pub struct RodioOutput {
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    // Dropping the sender releases the stream thread
    _keepalive: mpsc::Sender<()>,
}

impl RodioOutput {
    pub fn open_default() -> Result<Self, PlaybackError> {
        let (handle_tx, handle_rx) = mpsc::channel();
        let (keepalive_tx, keepalive_rx) = mpsc::channel::<()>();

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = handle_tx.send(Ok(handle));
                    // Blocks until the RodioOutput is dropped
                    let _ = keepalive_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = handle_tx.send(Err(e.to_string()));
                }
            })
            .map_err(|e| PlaybackError::OutputUnavailable(e.to_string()))?;

        let handle = handle_rx
            .recv()
            .map_err(|e| PlaybackError::OutputUnavailable(e.to_string()))?
            .map_err(PlaybackError::OutputUnavailable)?;

        Ok(Self {
            handle,
            sink: None,
            _keepalive: keepalive_tx,
        })
    }
}

impl AudioOutput for RodioOutput {
    type Track = Decoder<BufReader<File>>;

    fn opener(&self) -> TrackOpener<Self::Track> {
        Arc::new(|path: &Path| {
            let load_failed = |reason: String| PlaybackError::LoadFailed {
                path: path.to_path_buf(),
                reason,
            };
            let file = File::open(path).map_err(|e| load_failed(e.to_string()))?;
            let source =
                Decoder::new(BufReader::new(file)).map_err(|e| load_failed(e.to_string()))?;
            debug!(path = %path.display(), "decoded episode");
            Ok(source)
        })
    }

    fn load(&mut self, track: Self::Track) -> Result<(), PlaybackError> {
        self.stop();

        let sink = Sink::try_new(&self.handle)
            .map_err(|e| PlaybackError::OutputUnavailable(e.to_string()))?;
        sink.pause();
        sink.append(track);
        self.sink = Some(sink);
        Ok(())
    }

    fn play(&mut self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn unpause(&mut self) {
        self.play();
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn position_ms(&self) -> u64 {
        self.sink
            .as_ref()
            .map(|sink| sink.get_pos().as_millis() as u64)
            .unwrap_or(0)
    }

    fn is_busy(&self) -> bool {
        self.sink.as_ref().is_some_and(|sink| !sink.empty())
    }
}
