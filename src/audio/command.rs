// Which OS binary plays a file, and with what arguments
// Pure functions only - nothing in here touches the process table

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::player::PlaybackOptions;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

/// OS families we know how to drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
    Other(String),
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "macos" | "darwin" => Platform::MacOs,
            "linux" => Platform::Linux,
            "windows" | "win32" => Platform::Windows,
            other => Platform::Other(other.to_string()),
        }
    }

    /// Candidate players in the order they should be tried.
    pub fn backends(&self) -> Result<Vec<PlayerBackend>, ResolveError> {
        match self {
            Platform::MacOs => Ok(vec![PlayerBackend::Afplay]),
            Platform::Linux => Ok(vec![PlayerBackend::Mpg123, PlayerBackend::Ffplay]),
            Platform::Windows => Ok(vec![PlayerBackend::PowerShell]),
            Platform::Other(name) => Err(ResolveError::UnsupportedPlatform(name.clone())),
        }
    }
}

/// User-supplied player, e.g. `mpv --no-video {file}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPlayer {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

pub const FILE_PLACEHOLDER: &str = "{file}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerBackend {
    Afplay,
    Mpg123,
    Ffplay,
    PowerShell,
    Custom(CustomPlayer),
}

impl PlayerBackend {
    pub fn binary(&self) -> &str {
        match self {
            PlayerBackend::Afplay => "afplay",
            PlayerBackend::Mpg123 => "mpg123",
            PlayerBackend::Ffplay => "ffplay",
            PlayerBackend::PowerShell => "powershell",
            PlayerBackend::Custom(custom) => &custom.program,
        }
    }

    /// Process name the stray sweep may `pkill`. None for shells and user
    /// commands, whose names also match processes we never started.
    pub fn sweep_name(&self) -> Option<&'static str> {
        match self {
            PlayerBackend::Afplay => Some("afplay"),
            PlayerBackend::Mpg123 => Some("mpg123"),
            PlayerBackend::Ffplay => Some("ffplay"),
            PlayerBackend::PowerShell | PlayerBackend::Custom(_) => None,
        }
    }

    pub fn command(&self, path: &Path, options: &PlaybackOptions) -> PlayerCommand {
        let volume = options.volume.min(100);
        let start = options.start_at;
        let mut args: Vec<OsString> = Vec::new();

        match self {
            PlayerBackend::Afplay => {
                if volume != 100 {
                    args.push("-v".into());
                    args.push(format!("{}", f32::from(volume) / 100.0).into());
                }
                if !start.is_zero() {
                    tracing::debug!(?start, "afplay cannot seek, starting from the top");
                }
                args.push(path.as_os_str().to_owned());
            }
            PlayerBackend::Mpg123 => {
                args.push("-q".into());
                if volume != 100 {
                    args.push("-f".into());
                    args.push((32768 * u32::from(volume) / 100).to_string().into());
                }
                if !start.is_zero() {
                    args.push("-k".into());
                    args.push(mpg123_frame_offset(start).to_string().into());
                }
                args.push(path.as_os_str().to_owned());
            }
            PlayerBackend::Ffplay => {
                for arg in ["-nodisp", "-autoexit", "-loglevel", "quiet"] {
                    args.push(arg.into());
                }
                if volume != 100 {
                    args.push("-volume".into());
                    args.push(volume.to_string().into());
                }
                if !start.is_zero() {
                    args.push("-ss".into());
                    args.push(format!("{:.3}", start.as_secs_f64()).into());
                }
                args.push(path.as_os_str().to_owned());
            }
            PlayerBackend::PowerShell => {
                // PlaySync keeps the process alive until the sound ends
                let quoted = path.to_string_lossy().replace('\'', "''");
                args.push("-NoProfile".into());
                args.push("-Command".into());
                args.push(format!("(New-Object Media.SoundPlayer '{quoted}').PlaySync()").into());
            }
            PlayerBackend::Custom(custom) => {
                let mut substituted = false;
                for arg in &custom.args {
                    if arg == FILE_PLACEHOLDER {
                        args.push(path.as_os_str().to_owned());
                        substituted = true;
                    } else if arg.contains(FILE_PLACEHOLDER) {
                        args.push(arg.replace(FILE_PLACEHOLDER, &path.to_string_lossy()).into());
                        substituted = true;
                    } else {
                        args.push(arg.into());
                    }
                }
                if !substituted {
                    args.push(path.as_os_str().to_owned());
                }
            }
        }

        PlayerCommand {
            program: self.binary().to_string(),
            args,
        }
    }
}

// mpg123 counts in MPEG frames; 38.28 frames/s is the 44.1kHz layer III rate.
fn mpg123_frame_offset(start: Duration) -> u64 {
    (start.as_secs_f64() * 38.28).floor() as u64
}

/// Fully built invocation: binary plus arguments, nothing left to decide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    pub program: String,
    pub args: Vec<OsString>,
}

/// Turns (platform, file) into the ordered list of commands to try.
#[derive(Debug, Clone)]
pub struct CommandResolver {
    platform: Platform,
    custom: Option<CustomPlayer>,
}

impl CommandResolver {
    pub fn new(platform: Platform) -> Self {
        Self { platform, custom: None }
    }

    pub fn with_custom_player(mut self, custom: Option<CustomPlayer>) -> Self {
        self.custom = custom;
        self
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn backends(&self) -> Result<Vec<PlayerBackend>, ResolveError> {
        match &self.custom {
            Some(custom) => Ok(vec![PlayerBackend::Custom(custom.clone())]),
            None => self.platform.backends(),
        }
    }

    pub fn resolve(
        &self,
        path: &Path,
        options: &PlaybackOptions,
    ) -> Result<Vec<(PlayerBackend, PlayerCommand)>, ResolveError> {
        Ok(self
            .backends()?
            .into_iter()
            .map(|backend| {
                let command = backend.command(path, options);
                (backend, command)
            })
            .collect())
    }
}

impl Default for CommandResolver {
    fn default() -> Self {
        Self::new(Platform::current())
    }
}
