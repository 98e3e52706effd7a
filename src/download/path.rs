// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use crate::feed::EpisodeRecord;

/// Suffix for in-progress transfers
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Get the audio file extension from an episode's enclosure
///
/// Attempts to extract from URL path or MIME type, defaults to "mp3"
pub fn audio_extension(episode: &EpisodeRecord) -> String {
    if let Some(ext) = episode
        .source_url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|filename| filename.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| is_valid_audio_extension(ext))
    {
        return ext.to_lowercase();
    }

    if let Some(ref mime) = episode.mime_type
        && let Some(ext) = mime_to_extension(mime)
    {
        return ext.to_string();
    }

    "mp3".to_string()
}

/// File stem shared by an episode's audio file and its sidecar
pub fn episode_stem(index: usize) -> String {
    format!("episode_{index}")
}

/// Deterministic destination of an episode: `episode_<index>.<ext>`
pub fn destination_path(downloads_dir: &Path, episode: &EpisodeRecord) -> PathBuf {
    downloads_dir.join(format!(
        "{}.{}",
        episode_stem(episode.index),
        audio_extension(episode)
    ))
}

/// Sidecar metadata path for an episode index
pub fn metadata_path(downloads_dir: &Path, index: usize) -> PathBuf {
    downloads_dir.join(format!("{}.json", episode_stem(index)))
}

/// Scratch file a single job streams into before it is renamed
///
/// The job id keeps two transfers of the same index from sharing a file.
pub fn partial_path(destination: &Path, job: u64) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{job}{PARTIAL_SUFFIX}"));
    destination.with_file_name(name)
}

fn is_valid_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}

fn mime_to_extension(mime: &str) -> Option<&'static str> {
    match mime.to_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}
