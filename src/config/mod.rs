// Configuration management for Shufflo
// Handles loading/saving settings, with sensible defaults when config is missing

use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::audio::{CommandResolver, ControllerOptions, CustomPlayer, PlaybackController, PlaybackOptions, Platform};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find a config directory for this user")]
    NoConfigDir,
    #[error("config io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub music_directory: PathBuf,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub volume: u8, // 0 to 100
    pub start_offset_seconds: u64,
    pub sweep_stray_players: bool,
    /// Looked in for player binaries before PATH, e.g. a portable ffmpeg build
    pub player_dirs: Vec<PathBuf>,
    pub player: Option<CustomPlayer>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: 100,
            start_offset_seconds: 0,
            sweep_stray_players: true,
            player_dirs: Vec::new(),
            player: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            music_directory: dirs::audio_dir()
                .or_else(|| dirs::home_dir().map(|home| home.join("Music")))
                .unwrap_or_else(|| PathBuf::from("Music")),
            playback: PlaybackConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Read `path`, writing the defaults there first if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(io_error)?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = config_dir().ok_or(ConfigError::NoConfigDir)?.join("shufflo");

        Ok(config_dir.join("config.toml"))
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            volume: self.playback.volume.min(100),
            start_at: Duration::from_secs(self.playback.start_offset_seconds),
        }
    }

    /// Controller wired for this machine and these settings.
    pub fn build_controller(&self) -> PlaybackController {
        let resolver = CommandResolver::new(Platform::current()).with_custom_player(self.playback.player.clone());
        let options = ControllerOptions {
            playback: self.playback_options(),
            sweep_strays: self.playback.sweep_stray_players,
            player_dirs: self.playback.player_dirs.clone(),
            ..ControllerOptions::default()
        };
        PlaybackController::new(resolver, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let config = Config::load_from(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.playback, PlaybackConfig::default());
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
music_directory = "/srv/music"

[playback]
volume = 40
player_dirs = ["/opt/ffmpeg/bin"]

[playback.player]
program = "mpv"
args = ["--no-video", "{file}"]
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.music_directory, PathBuf::from("/srv/music"));
        assert_eq!(config.playback.volume, 40);
        assert!(config.playback.sweep_stray_players);
        assert_eq!(config.playback.player.as_ref().unwrap().program, "mpv");
        assert_eq!(config.playback_options().volume, 40);
        assert_eq!(config.playback_options().start_at, Duration::ZERO);
        assert_eq!(config.playback.player_dirs, vec![PathBuf::from("/opt/ffmpeg/bin")]);
    }

    #[test]
    fn test_invalid_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "music_directory = [").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut config = Config::default();
        config.playback.volume = 250;
        assert_eq!(config.playback_options().volume, 100);
    }
}
