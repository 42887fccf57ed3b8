// Everything that turns a folder on disk into a list of songs

pub mod browse;   // one level at a time, for the directory picker
pub mod scanner;  // full recursive index for the song list
pub mod tracklist; // filtering + next/previous over a scan

pub use browse::{list_directory, DirectoryEntry};
pub use scanner::{MediaScanner, ScanDiagnostics, ScanError, ScanProgress, ScanResult};
pub use tracklist::TrackList;
