pub mod command;
pub mod metadata;
pub mod player;
mod process;

pub use command::{CommandResolver, CustomPlayer, Platform, PlayerBackend, PlayerCommand, ResolveError};
pub use metadata::{AlbumArt, LoftyTagReader, SongMetadata, TagError, TagReader};
pub use player::{
    ControllerOptions, PlaybackController, PlaybackError, PlaybackOptions, PlayerEvent, PlayerStatus,
    SessionPhase,
};
pub use process::is_process_alive;

use std::path::Path;

// Suffixes we hand to the external player. Anything else never reaches the song list.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "m4a", "aac", "ogg", "oga", "wma", "opus", "aiff", "aif", "dsf", "dff",
    "mp4", "3gp", "amr", "ape", "au", "ra",
];

pub fn is_audio_extension(ext: &str) -> bool {
    let normalized = ext.to_ascii_lowercase();
    AUDIO_EXTENSIONS.contains(&normalized.as_str())
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(is_audio_extension)
        .unwrap_or(false)
}
