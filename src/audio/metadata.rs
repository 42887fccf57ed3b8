// Tag reading for the now-playing panel
// Everything here is best-effort: a missing field means "unknown", never an error

use base64::prelude::*;
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::tag::{Accessor, ItemKey, Tag};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("failed to read tags from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: lofty::error::LoftyError,
    },
    #[error("tag reader task failed: {0}")]
    Join(String),
}

/// Embedded cover image, owned by the metadata it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumArt {
    pub format: String, // MIME type, e.g. "image/jpeg"
    #[serde(skip)]
    pub data: Vec<u8>,
    pub description: Option<String>,
}

impl AlbumArt {
    /// `data:<mime>;base64,<payload>`, ready for anything that eats data URIs.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.format, BASE64_STANDARD.encode(&self.data))
    }
}

/// Snapshot of a song's tags and audio properties, taken once per `play()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SongMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub year: Option<u32>,
    pub genre: Vec<String>,
    pub duration: Option<f64>, // seconds
    pub bitrate: Option<u32>,  // kbps
    pub sample_rate: Option<u32>,
    pub track_number: u32,
    pub disk_number: u32,
    pub comment: Vec<String>,
    pub album_art: Option<AlbumArt>,
}

impl SongMetadata {
    pub fn has_tags(&self) -> bool {
        self.title.is_some()
            || self.artist.is_some()
            || self.album.is_some()
            || self.album_artist.is_some()
            || self.year.is_some()
            || !self.genre.is_empty()
            || !self.comment.is_empty()
            || self.album_art.is_some()
    }

    pub fn display_title(&self, path: &Path) -> String {
        self.title.clone().unwrap_or_else(|| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("Unknown")
                .to_string()
        })
    }

    pub fn display_artist(&self) -> String {
        self.artist
            .clone()
            .unwrap_or_else(|| "Unknown Artist".to_string())
    }
}

/// Seam between the playback controller and whatever reads tags off disk.
pub trait TagReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<SongMetadata, TagError>;
}

/// Default reader backed by lofty, which covers every format in the allow-list
/// that carries tags at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Result<SongMetadata, TagError> {
        let tagged_file = lofty::read_from_path(path).map_err(|source| TagError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Ok(metadata_from_tagged_file(&tagged_file))
    }
}

fn metadata_from_tagged_file(tagged_file: &TaggedFile) -> SongMetadata {
    let properties = tagged_file.properties();
    let duration = properties.duration();

    let mut metadata = SongMetadata {
        duration: (!duration.is_zero()).then(|| duration.as_secs_f64()),
        bitrate: properties.audio_bitrate().or_else(|| properties.overall_bitrate()),
        sample_rate: properties.sample_rate(),
        ..SongMetadata::default()
    };

    // Files without any tag block still give us duration/bitrate above
    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        apply_tag(&mut metadata, tag);
    }

    metadata
}

fn apply_tag(metadata: &mut SongMetadata, tag: &Tag) {
    metadata.title = non_empty(tag.title().map(|s| s.into_owned()));
    metadata.artist = non_empty(tag.artist().map(|s| s.into_owned()));
    metadata.album = non_empty(tag.album().map(|s| s.into_owned()));
    metadata.album_artist = non_empty(tag.get_string(&ItemKey::AlbumArtist).map(str::to_string));
    metadata.year = tag.year().or_else(|| {
        tag.get_string(&ItemKey::RecordingDate)
            .and_then(year_from_date)
    });
    metadata.genre = collect_strings(tag, &ItemKey::Genre);
    metadata.track_number = tag.track().unwrap_or(0);
    metadata.disk_number = tag.disk().unwrap_or(0);
    metadata.comment = collect_strings(tag, &ItemKey::Comment);
    metadata.album_art = tag.pictures().first().map(|picture| {
        let format = picture
            .mime_type()
            .map(|mime| mime.as_str().to_string())
            .or_else(|| infer::get(picture.data()).map(|kind| kind.mime_type().to_string()))
            .unwrap_or_else(|| "application/octet-stream".to_string());

        AlbumArt {
            format,
            data: picture.data().to_vec(),
            description: non_empty(picture.description().map(str::to_string)),
        }
    });
}

fn collect_strings(tag: &Tag, key: &ItemKey) -> Vec<String> {
    tag.get_strings(key)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// "2019-03-01" / "2019" -> 2019
fn year_from_date(date: &str) -> Option<u32> {
    let digits: String = date.trim().chars().take_while(char::is_ascii_digit).collect();
    if digits.len() == 4 {
        digits.parse().ok()
    } else {
        None
    }
}
