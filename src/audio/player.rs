// Playback session controller
// Owns the single external player process and the state derived from it.
// Decoding happens in the OS player; we only spawn, signal, kill and watch it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::command::{CommandResolver, PlayerBackend, ResolveError};
use super::metadata::{LoftyTagReader, SongMetadata, TagError, TagReader};
use super::process::{self, ProcessHandle, ProcessSignal};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("cannot play {}: {source}", .path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a regular file", .path.display())]
    NotAFile { path: PathBuf },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("failed to launch player {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to signal player process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("pause/resume needs POSIX process signals")]
    SignalUnsupported,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    #[default]
    Idle,
    Starting,
    Playing,
    Stopping,
}

#[derive(Debug, Clone)]
pub enum PlayerEvent {
    TrackStarted { path: PathBuf, generation: u64 },
    TrackPaused,
    TrackResumed,
    TrackStopped,
    TrackFinished { path: PathBuf, generation: u64, success: bool },
    Error(String),
}

/// Per-call knobs forwarded to the external player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackOptions {
    pub volume: u8, // 0 to 100
    pub start_at: Duration,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            volume: 100,
            start_at: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub playback: PlaybackOptions,
    /// Also `pkill` the player binary on stop, catching processes from earlier runs.
    pub sweep_strays: bool,
    /// How long a player with a fallback behind it must survive before it counts
    /// as started. A non-zero exit inside this window moves on to the next player.
    pub fallback_window: Duration,
    /// Searched for player binaries ahead of PATH.
    pub player_dirs: Vec<PathBuf>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            playback: PlaybackOptions::default(),
            sweep_strays: true,
            fallback_window: Duration::from_millis(500),
            player_dirs: Vec::new(),
        }
    }
}

/// Point-in-time view of the session for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStatus {
    pub phase: SessionPhase,
    pub is_playing: bool,
    pub current_file: Option<PathBuf>,
    pub player: Option<String>,
    pub metadata: Option<Arc<SongMetadata>>,
    pub start_time: Option<DateTime<Utc>>,
    pub elapsed_time: Option<f64>, // seconds, only while actually playing
}

#[derive(Default)]
struct Session {
    phase: SessionPhase,
    current_file: Option<PathBuf>,
    process: Option<ProcessHandle>,
    sweep_target: Option<&'static str>,
    is_playing: bool,
    start_time: Option<DateTime<Utc>>,
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
    metadata: Option<Arc<SongMetadata>>,
}

impl Session {
    fn reset(&mut self) {
        *self = Session::default();
    }

    fn generation(&self) -> Option<u64> {
        self.process.as_ref().map(|p| p.generation)
    }

    fn elapsed(&self, now: Instant) -> Option<Duration> {
        if !self.is_playing {
            return None;
        }
        self.started_at.map(|started| {
            now.saturating_duration_since(started)
                .saturating_sub(self.paused_total)
        })
    }
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

fn emit(sender: &Option<mpsc::UnboundedSender<PlayerEvent>>, event: PlayerEvent) {
    if let Some(sender) = sender {
        let _ = sender.send(event);
    }
}

pub struct PlaybackController {
    session: Arc<Mutex<Session>>,
    // Serialises play/stop/pause/resume so only one lifecycle change runs at a time
    lifecycle: tokio::sync::Mutex<()>,
    resolver: CommandResolver,
    tag_reader: Arc<dyn TagReader>,
    options: ControllerOptions,
    search_path: Option<OsString>,
    next_generation: AtomicU64,
    event_sender: Option<mpsc::UnboundedSender<PlayerEvent>>,
}

impl PlaybackController {
    pub fn new(resolver: CommandResolver, options: ControllerOptions) -> Self {
        let search_path = player_search_path(&options.player_dirs);
        Self {
            session: Arc::new(Mutex::new(Session::default())),
            lifecycle: tokio::sync::Mutex::new(()),
            resolver,
            tag_reader: Arc::new(LoftyTagReader),
            options,
            search_path,
            next_generation: AtomicU64::new(0),
            event_sender: None,
        }
    }

    pub fn with_tag_reader(mut self, tag_reader: Arc<dyn TagReader>) -> Self {
        self.tag_reader = tag_reader;
        self
    }

    pub fn set_event_sender(&mut self, sender: mpsc::UnboundedSender<PlayerEvent>) {
        self.event_sender = Some(sender);
    }

    pub fn resolver(&self) -> &CommandResolver {
        &self.resolver
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    pub async fn play(&self, path: impl AsRef<Path>) -> Result<(), PlaybackError> {
        self.play_with(path, self.options.playback.clone()).await
    }

    /// Start playing `path`, replacing whatever was playing. Returns once the
    /// player process is running, not when the song ends.
    pub async fn play_with(
        &self,
        path: impl AsRef<Path>,
        options: PlaybackOptions,
    ) -> Result<(), PlaybackError> {
        let path = path.as_ref().to_path_buf();

        // Nothing below may touch the session until these two pass
        check_playable(&path).await?;
        let candidates = self.resolver.resolve(&path, &options)?;

        let _lifecycle = self.lifecycle.lock().await;

        // Old process must be gone (reaped, not just signalled) before the next one starts
        self.stop_locked().await;

        {
            let mut session = self.session();
            session.phase = SessionPhase::Starting;
            session.current_file = Some(path.clone());
        }

        let metadata = self.read_metadata(&path).await;
        self.session().metadata = metadata;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut last_failure = None;
        let last = candidates.len().saturating_sub(1);

        for (index, (backend, command)) in candidates.into_iter().enumerate() {
            let mut child = match process::spawn(&command, self.search_path.as_deref()) {
                Ok(child) => child,
                Err(e) => {
                    warn!(player = %command.program, error = %e, "player failed to launch, trying next candidate");
                    last_failure = Some((command.program, e));
                    continue;
                }
            };

            // mpg123 launches fine on a FLAC and then quits with an error
            if index < last {
                let early = tokio::time::timeout(self.options.fallback_window, child.wait()).await;
                if let Ok(Ok(status)) = early {
                    if !status.success() {
                        warn!(player = %command.program, %status, "player rejected the file, trying next candidate");
                        last_failure = Some((command.program, io::Error::other(format!("exited early with {status}"))));
                        continue;
                    }
                }
            }

            // Hold the lock across watch() so a process that dies instantly
            // can't report its exit before it is recorded as current
            let mut session = self.session();
            let handle = process::watch(
                child,
                generation,
                command.program.clone(),
                self.exit_handler(generation, path.clone()),
            );
            info!(
                path = %path.display(),
                player = backend.binary(),
                pid = ?handle.pid,
                generation,
                "playback started"
            );

            session.process = Some(handle);
            session.sweep_target = backend.sweep_name();
            session.phase = SessionPhase::Playing;
            session.is_playing = true;
            session.start_time = Some(Utc::now());
            session.started_at = Some(Instant::now());
            session.paused_at = None;
            session.paused_total = Duration::ZERO;
            drop(session);

            emit(&self.event_sender, PlayerEvent::TrackStarted { path, generation });
            return Ok(());
        }

        self.session().reset();

        let (program, source) = last_failure.unwrap_or_else(|| {
            (
                String::from("<none>"),
                io::Error::new(io::ErrorKind::NotFound, "no player candidates"),
            )
        });
        emit(
            &self.event_sender,
            PlayerEvent::Error(format!("failed to launch {program}: {source}")),
        );
        Err(PlaybackError::Spawn { program, source })
    }

    /// Kill the current player, if any. Calling this while idle changes nothing.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_locked().await;
    }

    /// Stop plus an unconditional stray sweep. Meant for signal handlers and teardown.
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_locked().await;

        if self.options.sweep_strays {
            if let Ok(backends) = self.resolver.backends() {
                for binary in backends.iter().filter_map(PlayerBackend::sweep_name) {
                    process::sweep_strays(binary).await;
                }
            }
        }
        info!("playback controller shut down");
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.pause_locked()
    }

    pub async fn resume(&self) -> Result<(), PlaybackError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.resume_locked()
    }

    pub async fn toggle_play_pause(&self) -> Result<(), PlaybackError> {
        let _lifecycle = self.lifecycle.lock().await;
        let is_playing = self.session().is_playing;
        if is_playing {
            self.pause_locked()
        } else {
            self.resume_locked()
        }
    }

    pub fn get_status(&self) -> PlayerStatus {
        let session = self.session();
        PlayerStatus {
            phase: session.phase,
            is_playing: session.is_playing,
            current_file: session.current_file.clone(),
            player: session.process.as_ref().map(|p| p.program.clone()),
            metadata: session.metadata.clone(),
            start_time: session.start_time,
            elapsed_time: session.elapsed(Instant::now()).map(|d| d.as_secs_f64()),
        }
    }

    /// Cover art of the current song as a `data:` URI.
    pub fn album_art_encoded(&self) -> Option<String> {
        let session = self.session();
        session
            .metadata
            .as_ref()
            .and_then(|m| m.album_art.as_ref())
            .map(|art| art.to_data_uri())
    }

    pub fn process_id(&self) -> Option<u32> {
        self.session().process.as_ref().and_then(|p| p.pid)
    }

    // Caller must hold the lifecycle lock.
    async fn stop_locked(&self) -> bool {
        let (handle, sweep_target) = {
            let mut session = self.session();
            match session.process.take() {
                Some(handle) => {
                    session.phase = SessionPhase::Stopping;
                    session.is_playing = false;
                    (handle, session.sweep_target.take())
                }
                None => return false,
            }
        };

        debug!(generation = handle.generation, player = %handle.program, "stopping player");
        handle.terminate().await;

        if self.options.sweep_strays {
            if let Some(binary) = sweep_target {
                process::sweep_strays(binary).await;
            }
        }

        self.session().reset();
        emit(&self.event_sender, PlayerEvent::TrackStopped);
        true
    }

    fn pause_locked(&self) -> Result<(), PlaybackError> {
        let mut session = self.session();
        if !session.is_playing {
            return Ok(());
        }
        let Some(pid) = session.process.as_ref().and_then(|p| p.pid) else {
            return Ok(());
        };

        process::send_signal(pid, ProcessSignal::Suspend).map_err(|e| signal_error(pid, e))?;
        session.is_playing = false;
        session.paused_at = Some(Instant::now());
        drop(session);

        debug!(pid, "playback paused");
        emit(&self.event_sender, PlayerEvent::TrackPaused);
        Ok(())
    }

    fn resume_locked(&self) -> Result<(), PlaybackError> {
        let mut session = self.session();
        if session.is_playing {
            return Ok(());
        }
        let Some(pid) = session.process.as_ref().and_then(|p| p.pid) else {
            return Ok(());
        };

        process::send_signal(pid, ProcessSignal::Continue).map_err(|e| signal_error(pid, e))?;
        if let Some(paused_at) = session.paused_at.take() {
            session.paused_total += paused_at.elapsed();
        }
        session.is_playing = true;
        drop(session);

        debug!(pid, "playback resumed");
        emit(&self.event_sender, PlayerEvent::TrackResumed);
        Ok(())
    }

    async fn read_metadata(&self, path: &Path) -> Option<Arc<SongMetadata>> {
        let reader = Arc::clone(&self.tag_reader);
        let owned = path.to_path_buf();

        let result = tokio::task::spawn_blocking(move || reader.read(&owned))
            .await
            .map_err(|e| TagError::Join(e.to_string()))
            .and_then(|read| read);

        match result {
            Ok(metadata) => Some(Arc::new(metadata)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "no metadata, playing anyway");
                None
            }
        }
    }

    // Runs in the watcher task when the player exits by itself. A newer play()
    // may already own the session, so only act if our generation is still current.
    fn exit_handler(
        &self,
        generation: u64,
        path: PathBuf,
    ) -> impl FnOnce(io::Result<std::process::ExitStatus>) + Send + 'static {
        let session: Weak<Mutex<Session>> = Arc::downgrade(&self.session);
        let sender = self.event_sender.clone();

        move |status| {
            let Some(session) = session.upgrade() else {
                return;
            };

            let finished = {
                let mut session = lock(&session);
                if session.generation() != Some(generation) {
                    debug!(generation, "ignoring exit of superseded player");
                    return;
                }
                let finished = session.process.take();
                session.reset();
                finished
            };
            drop(finished);

            let success = status.as_ref().map(|s| s.success()).unwrap_or(false);
            info!(path = %path.display(), generation, success, "playback finished");
            emit(&sender, PlayerEvent::TrackFinished { path, generation, success });
        }
    }
}

// Extra directories first, then whatever PATH we inherited.
fn player_search_path(player_dirs: &[PathBuf]) -> Option<OsString> {
    if player_dirs.is_empty() {
        return None;
    }

    let inherited = std::env::var_os("PATH").unwrap_or_default();
    let dirs = player_dirs
        .iter()
        .cloned()
        .chain(std::env::split_paths(&inherited));
    match std::env::join_paths(dirs) {
        Ok(joined) => Some(joined),
        Err(e) => {
            warn!(error = %e, "unusable player directory, falling back to PATH");
            None
        }
    }
}

fn signal_error(pid: u32, source: io::Error) -> PlaybackError {
    if source.kind() == io::ErrorKind::Unsupported {
        PlaybackError::SignalUnsupported
    } else {
        PlaybackError::Signal { pid, source }
    }
}

async fn check_playable(path: &Path) -> Result<(), PlaybackError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|source| PlaybackError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
    if !metadata.is_file() {
        return Err(PlaybackError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    // Opening proves read permission, which stat alone doesn't
    tokio::fs::File::open(path)
        .await
        .map_err(|source| PlaybackError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(())
}
