// Shufflo Library - the engine under the terminal music browser
// Scanner + playback controller; the UI only ever talks to these

pub mod audio;    // tags, player commands, the playback session
pub mod config;   // settings and preferences
pub mod library;  // scanning, directory browsing, track navigation
pub mod shutdown; // signal handling that stops playback before exit

// Export the stuff other modules actually use
pub use audio::{PlaybackController, PlayerStatus, SongMetadata};
pub use config::Config;
pub use library::{MediaScanner, ScanResult, TrackList};
