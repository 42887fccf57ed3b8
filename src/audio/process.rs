// Low-level handling of the external player process
// The watcher task owns the Child; everyone else talks to it through the handle

use std::ffi::OsStr;
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::command::PlayerCommand;

/// Unix signals we send to a live player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessSignal {
    Suspend,
    Continue,
}

/// What the controller keeps for the one live process.
pub(crate) struct ProcessHandle {
    pub generation: u64,
    pub pid: Option<u32>,
    pub program: String,
    kill_tx: Option<oneshot::Sender<()>>,
    watcher: JoinHandle<()>,
}

impl ProcessHandle {
    /// Kill the process (if it's still around) and wait until it has been reaped.
    /// Safe to call on a process that already exited on its own.
    pub async fn terminate(mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            // Receiver is gone when the process already finished
            let _ = kill_tx.send(());
        }

        if let Err(e) = self.watcher.await {
            warn!(program = %self.program, error = %e, "player watcher task ended abnormally");
        }
    }
}

/// Spawn `command` with all stdio detached. Returns the child so the caller can
/// hand it to [`watch`] once the session is recorded. `search_path` replaces the
/// child's PATH, which is also where the program itself is looked up.
pub(crate) fn spawn(command: &PlayerCommand, search_path: Option<&OsStr>) -> io::Result<Child> {
    let mut cmd = Command::new(&command.program);
    if let Some(search_path) = search_path {
        cmd.env("PATH", search_path);
    }
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
}

/// Move `child` into a watcher task. `on_exit` runs exactly once when the process
/// ends on its own; it does not run when the process was killed through the handle.
pub(crate) fn watch<F>(mut child: Child, generation: u64, program: String, on_exit: F) -> ProcessHandle
where
    F: FnOnce(io::Result<ExitStatus>) + Send + 'static,
{
    let pid = child.id();
    let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
    let task_program = program.clone();

    let watcher = tokio::spawn(async move {
        let natural = tokio::select! {
            status = child.wait() => Some(status),
            // Fires on explicit kill and when the handle is dropped
            _ = &mut kill_rx => None,
        };

        match natural {
            Some(status) => {
                debug!(program = %task_program, generation, ?status, "player exited on its own");
                on_exit(status);
            }
            None => {
                if let Err(e) = child.start_kill() {
                    // InvalidInput means it already exited between select and kill
                    debug!(program = %task_program, error = %e, "kill skipped");
                }
                match child.wait().await {
                    Ok(status) => debug!(program = %task_program, generation, ?status, "player killed"),
                    Err(e) => warn!(program = %task_program, error = %e, "failed to reap killed player"),
                }
            }
        }
    });

    ProcessHandle {
        generation,
        pid,
        program,
        kill_tx: Some(kill_tx),
        watcher,
    }
}

#[cfg(unix)]
pub(crate) fn send_signal(pid: u32, signal: ProcessSignal) -> io::Result<()> {
    let signo = match signal {
        ProcessSignal::Suspend => libc::SIGSTOP,
        ProcessSignal::Continue => libc::SIGCONT,
    };

    // SAFETY: kill(2) has no memory-safety preconditions
    let rc = unsafe { libc::kill(pid as libc::pid_t, signo) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub(crate) fn send_signal(_pid: u32, _signal: ProcessSignal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process suspension needs POSIX signals",
    ))
}

/// Whether `pid` still names a live (or zombie) process.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    // SAFETY: signal 0 only performs the permission/existence check
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    false
}

/// Kill every process named `binary`, tracked or not. Failures are logged and dropped.
pub(crate) async fn sweep_strays(binary: &str) {
    let name = std::path::Path::new(binary)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(binary)
        .to_string();

    let mut sweep = if cfg!(windows) {
        let image = format!("{name}.exe");
        let mut cmd = Command::new("taskkill");
        cmd.args(["/F", "/IM", image.as_str()]);
        cmd
    } else {
        let mut cmd = Command::new("pkill");
        cmd.args(["-x", name.as_str()]);
        cmd
    };

    let result = sweep
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match result {
        // pkill exits 1 when nothing matched, that's the normal case
        Ok(status) => debug!(binary = %name, ?status, "stray player sweep done"),
        Err(e) => debug!(binary = %name, error = %e, "stray player sweep unavailable"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn sh(script: &str) -> PlayerCommand {
        PlayerCommand {
            program: "sh".to_string(),
            args: vec![OsString::from("-c"), OsString::from(script)],
        }
    }

    fn spawn_sh(command: PlayerCommand) -> io::Result<Child> {
        spawn(&command, None)
    }

    #[tokio::test]
    async fn test_terminate_kills_and_reaps() {
        let child = spawn_sh(sh("sleep 30")).unwrap();
        let exited = Arc::new(AtomicBool::new(false));
        let flag = exited.clone();
        let handle = watch(child, 1, "sh".to_string(), move |_| flag.store(true, Ordering::SeqCst));
        let pid = handle.pid.unwrap();
        assert!(is_process_alive(pid));

        handle.terminate().await;

        assert!(!is_process_alive(pid));
        // Explicit kill is not a natural exit
        assert!(!exited.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_natural_exit_runs_callback() {
        let child = spawn_sh(sh("exit 0")).unwrap();
        let (tx, rx) = oneshot::channel();
        let _handle = watch(child, 7, "sh".to_string(), move |status| {
            let _ = tx.send(status.map(|s| s.success()).unwrap_or(false));
        });

        let success = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(success);
    }

    #[tokio::test]
    async fn test_terminate_after_exit_is_harmless() {
        let child = spawn_sh(sh("exit 3")).unwrap();
        let handle = watch(child, 2, "sh".to_string(), |_| {});
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.terminate().await;
    }

    #[tokio::test]
    async fn test_suspend_and_continue_live_process() {
        let child = spawn_sh(sh("sleep 30")).unwrap();
        let handle = watch(child, 3, "sh".to_string(), |_| {});
        let pid = handle.pid.unwrap();

        send_signal(pid, ProcessSignal::Suspend).unwrap();
        send_signal(pid, ProcessSignal::Continue).unwrap();

        // A stopped process still dies on SIGKILL
        send_signal(pid, ProcessSignal::Suspend).unwrap();
        handle.terminate().await;
        assert!(!is_process_alive(pid));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let result = spawn(
            &PlayerCommand {
                program: "/nonexistent/shufflo-player".to_string(),
                args: Vec::new(),
            },
            None,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_search_path_finds_program() {
        use std::os::unix::fs::PermissionsExt;

        let bin = tempfile::tempdir().unwrap();
        let script = bin.path().join("shufflo-fake-player");
        std::fs::write(&script, "#!/bin/sh\nexit 4\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let command = PlayerCommand {
            program: "shufflo-fake-player".to_string(),
            args: Vec::new(),
        };
        assert!(spawn(&command, None).is_err());

        let mut child = spawn(&command, Some(bin.path().as_os_str())).unwrap();
        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), Some(4));
    }
}
