// Stop the player before we go away
// An orphaned afplay/mpg123 keeps blasting after the terminal closes otherwise

use std::io;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::audio::PlaybackController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    Hangup,
}

impl ShutdownSignal {
    /// Conventional 128 + signal number.
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownSignal::Hangup => 129,
            ShutdownSignal::Interrupt => 130,
            ShutdownSignal::Terminate => 143,
        }
    }
}

#[cfg(unix)]
pub async fn wait_for_signal() -> io::Result<ShutdownSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| ShutdownSignal::Interrupt),
        _ = terminate.recv() => Ok(ShutdownSignal::Terminate),
        _ = hangup.recv() => Ok(ShutdownSignal::Hangup),
    }
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownSignal::Interrupt)
}

/// Wait for an interrupt/terminate, then shut the controller down. Returns only
/// after the player process has been killed and reaped.
pub async fn shutdown_on_signal(controller: &PlaybackController) -> io::Result<ShutdownSignal> {
    let signal = wait_for_signal().await?;
    info!(?signal, "shutdown requested, stopping playback");
    controller.shutdown().await;
    Ok(signal)
}

/// Background task running [`shutdown_on_signal`]. Abort it once playback is
/// over and the handlers are no longer wanted.
pub fn spawn_shutdown_guard(controller: Arc<PlaybackController>) -> JoinHandle<io::Result<ShutdownSignal>> {
    tokio::spawn(async move { shutdown_on_signal(&controller).await })
}
