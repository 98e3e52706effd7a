// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test doubles shared by the unit tests

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::error::PlaybackError;
use crate::feed::EpisodeRecord;
use crate::http::{ByteStream, HttpClient, HttpResponse};
use crate::playback::{AudioOutput, TrackOpener};

pub fn make_episode(index: usize) -> EpisodeRecord {
    EpisodeRecord {
        index,
        title: format!("Episode {index}"),
        description: String::new(),
        source_url: Url::parse(&format!("https://example.com/{index}.mp3")).unwrap(),
        mime_type: None,
        published: None,
        duration_secs: None,
        file_size: None,
    }
}

/// Poll `condition` until it holds, failing the test after about a second
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached");
}

#[derive(Debug, Default)]
struct FakeState {
    loaded: Option<PathBuf>,
    playing: bool,
    busy: bool,
    position_ms: u64,
    load_count: usize,
    open_count: usize,
    open_delay: Duration,
    fail_next_load: bool,
}

/// Audio output that records calls; clones share state
#[derive(Debug, Clone, Default)]
pub struct FakeOutput {
    state: Arc<Mutex<FakeState>>,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded(&self) -> Option<PathBuf> {
        self.state.lock().loaded.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn load_count(&self) -> usize {
        self.state.lock().load_count
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Make every later open block its thread for `delay`
    pub fn set_open_delay(&self, delay: Duration) {
        self.state.lock().open_delay = delay;
    }

    pub fn fail_next_load(&self) {
        self.state.lock().fail_next_load = true;
    }

    /// Simulate the stream running out of audio
    pub fn finish_track(&self) {
        let mut state = self.state.lock();
        state.busy = false;
        state.playing = false;
    }

    pub fn set_position_ms(&self, position_ms: u64) {
        self.state.lock().position_ms = position_ms;
    }
}

impl AudioOutput for FakeOutput {
    type Track = PathBuf;

    fn opener(&self) -> TrackOpener<PathBuf> {
        let state = self.state.clone();
        Arc::new(move |path: &Path| {
            let delay = {
                let mut state = state.lock();
                state.open_count += 1;
                if std::mem::take(&mut state.fail_next_load) {
                    return Err(PlaybackError::LoadFailed {
                        path: path.to_path_buf(),
                        reason: "unsupported format".to_string(),
                    });
                }
                state.open_delay
            };
            std::thread::sleep(delay);
            Ok(path.to_path_buf())
        })
    }

    fn load(&mut self, track: PathBuf) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        state.loaded = Some(track);
        state.playing = false;
        state.busy = true;
        state.position_ms = 0;
        state.load_count += 1;
        Ok(())
    }

    fn play(&mut self) {
        let mut state = self.state.lock();
        state.playing = state.loaded.is_some();
    }

    fn pause(&mut self) {
        self.state.lock().playing = false;
    }

    fn unpause(&mut self) {
        let mut state = self.state.lock();
        state.playing = state.loaded.is_some();
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.loaded = None;
        state.playing = false;
        state.busy = false;
        state.position_ms = 0;
    }

    fn position_ms(&self) -> u64 {
        self.state.lock().position_ms
    }

    fn is_busy(&self) -> bool {
        let state = self.state.lock();
        state.busy && state.loaded.is_some()
    }
}

type BodyReceiver = mpsc::UnboundedReceiver<Result<Bytes, std::io::Error>>;
pub type BodySender = mpsc::UnboundedSender<Result<Bytes, std::io::Error>>;

/// HTTP client whose feed body is fixed and whose audio bodies are pushed
/// chunk by chunk by the test
#[derive(Clone, Default)]
pub struct ChannelClient {
    feed: Arc<Mutex<String>>,
    bodies: Arc<Mutex<HashMap<String, (Option<u64>, BodyReceiver)>>>,
}

impl ChannelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_feed(&self, xml: impl Into<String>) {
        *self.feed.lock() = xml.into();
    }

    /// Register the body for `url`; dropping the sender ends the body
    pub fn serve(&self, url: &str, content_length: Option<u64>) -> BodySender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.bodies
            .lock()
            .insert(url.to_string(), (content_length, rx));
        tx
    }
}

#[async_trait]
impl HttpClient for ChannelClient {
    async fn get_bytes(&self, _url: &str) -> Result<Bytes, reqwest::Error> {
        Ok(Bytes::from(self.feed.lock().clone()))
    }

    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let (content_length, rx) = self
            .bodies
            .lock()
            .remove(url)
            .unwrap_or_else(|| panic!("no body registered for {url}"));
        let body: ByteStream = Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }));
        Ok(HttpResponse {
            status: 200,
            content_length,
            body,
        })
    }
}

/// RSS document with `count` playable items at `https://example.com/<i>.mp3`
pub fn feed_xml(title: &str, count: usize) -> String {
    let items: String = (0..count)
        .map(|i| {
            format!(
                r#"<item><title>Episode {i}</title><enclosure url="https://example.com/{i}.mp3" type="audio/mpeg"/></item>"#
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>{title}</title><description>d</description>{items}</channel></rss>"#
    )
}
