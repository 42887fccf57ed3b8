// Shufflo - terminal music browser
// Scans a music folder, lets the OS player do the decoding, and keeps exactly
// one player process alive at a time

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shufflo::{
    audio::{LoftyTagReader, PlaybackOptions, PlayerEvent, PlayerStatus, SongMetadata, TagReader},
    config::Config,
    library::{list_directory, MediaScanner, ScanProgress, TrackList},
    shutdown::{self, ShutdownSignal},
    PlaybackController,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "shufflo")]
#[command(about = "A terminal music browser that hands playback to your OS audio player")]
struct Args {
    /// Enable developer logging (stderr + debug output)
    #[arg(long, global = true)]
    dev: bool,

    /// Read settings from this file instead of the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recursively list every playable song under a directory
    Scan {
        dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
        /// Don't descend into symlinked folders
        #[arg(long)]
        no_follow_links: bool,
    },
    /// Show one directory level, folders first
    Browse { dir: Option<PathBuf> },
    /// Print the tags of a song
    Tags {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Play one song until it ends or Ctrl+C
    Play {
        file: PathBuf,
        /// 0 to 100
        #[arg(long)]
        volume: Option<u8>,
        /// Start offset in seconds
        #[arg(long)]
        start: Option<u64>,
    },
    /// Play a directory in order, optionally only songs whose path matches
    Queue {
        dir: Option<PathBuf>,
        #[arg(long)]
        filter: Option<String>,
    },
}

fn init_logging(dev: bool) -> Result<WorkerGuard> {
    // Create logs directory in the working directory
    let log_dir = PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(&log_dir, "shufflo.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Base filter: info level for general logs, debug for shufflo
    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shufflo=debug"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false);

    // Dev mode mirrors everything to stderr as well
    let stderr_layer = dev.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(base_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let _log_guard = init_logging(args.dev)?;

    info!("shufflo starting up");

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("loading config")?;
    debug!(?config, "config loaded");

    match args.command {
        Commands::Scan { dir, json, no_follow_links } => {
            let dir = dir.unwrap_or_else(|| config.music_directory.clone());
            let scanner = MediaScanner::new().follow_links(!no_follow_links);
            scan(scanner, &dir, json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Browse { dir } => {
            let dir = dir.unwrap_or_else(|| config.music_directory.clone());
            browse(&dir).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Tags { file, json } => {
            tags(&file, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Play { file, volume, start } => {
            let mut options = config.playback_options();
            if let Some(volume) = volume {
                options.volume = volume.min(100);
            }
            if let Some(start) = start {
                options.start_at = Duration::from_secs(start);
            }
            play(&config, file, options).await
        }
        Commands::Queue { dir, filter } => {
            let dir = dir.unwrap_or_else(|| config.music_directory.clone());
            queue(&config, &dir, filter.as_deref()).await
        }
    }
}

async fn scan(scanner: MediaScanner, dir: &Path, json: bool) -> Result<()> {
    if json {
        let result = scanner.scan(dir).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let (progress_tx, mut progress_rx) = mpsc::channel(128);
    let scan_task = {
        let scanner = scanner.clone();
        let dir = dir.to_path_buf();
        tokio::spawn(async move { scanner.scan_with_progress(&dir, progress_tx).await })
    };

    while let Some(progress) = progress_rx.recv().await {
        match progress {
            ScanProgress::Started { root } => println!("🔍 Scanning {}", root.display()),
            ScanProgress::FileFound { count, .. } if count % 50 == 0 => {
                println!("   📀 Found {} songs so far...", count);
            }
            ScanProgress::Skipped { path, error } => {
                eprintln!("   ⚠️  Skipped {:?}: {}", path, error);
            }
            _ => {}
        }
    }

    let result = scan_task.await??;
    for entry in &result.entries {
        println!("{}", entry);
    }

    let d = result.diagnostics;
    println!();
    println!("✅ {} songs", d.files_added);
    println!(
        "   {} entries examined, {} directories, {} skipped",
        d.entries_examined, d.directories_descended, d.skipped
    );
    Ok(())
}

async fn browse(dir: &Path) -> Result<()> {
    println!("📂 {}", dir.display());
    if let Some(parent) = shufflo::library::browse::parent_directory(dir) {
        println!("   ../  ({})", parent.display());
    }
    for entry in list_directory(dir).await? {
        if entry.is_directory {
            println!("   📁 {}/", entry.name);
        } else {
            println!("   🎵 {}", entry.name);
        }
    }
    Ok(())
}

fn tags(file: &Path, json: bool) -> Result<()> {
    let metadata = LoftyTagReader
        .read(file)
        .with_context(|| format!("reading tags from {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    print_metadata(file, &metadata);
    Ok(())
}

fn print_metadata(file: &Path, metadata: &SongMetadata) {
    println!("🎧 {}", metadata.display_title(file));
    println!("   Artist: {}", metadata.display_artist());
    if !metadata.has_tags() {
        println!("   (no tags, file properties only)");
    }
    if let Some(album) = &metadata.album {
        println!("   Album: {}", album);
    }
    if let Some(album_artist) = &metadata.album_artist {
        println!("   Album artist: {}", album_artist);
    }
    if let Some(year) = metadata.year {
        println!("   Year: {}", year);
    }
    if !metadata.genre.is_empty() {
        println!("   Genre: {}", metadata.genre.join(", "));
    }
    if metadata.track_number > 0 {
        println!("   Track: {}  Disk: {}", metadata.track_number, metadata.disk_number);
    }
    if let Some(duration) = metadata.duration {
        println!("   Duration: {}", format_clock(duration));
    }
    if let (Some(bitrate), Some(rate)) = (metadata.bitrate, metadata.sample_rate) {
        println!("   {} kbps @ {} Hz", bitrate, rate);
    }
    for comment in &metadata.comment {
        println!("   Comment: {}", comment);
    }
    if let Some(art) = &metadata.album_art {
        println!("   Art: {} ({} bytes)", art.format, art.data.len());
    }
}

fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn status_line(status: &PlayerStatus) -> String {
    let elapsed = status
        .elapsed_time
        .map(format_clock)
        .unwrap_or_else(|| "--:--".to_string());
    let total = status
        .metadata
        .as_ref()
        .and_then(|m| m.duration)
        .map(format_clock)
        .unwrap_or_else(|| "?:??".to_string());
    let state = if status.is_playing { "▶️ " } else { "⏸️ " };
    format!("{} {} / {}", state, elapsed, total)
}

enum Outcome {
    Finished,
    Interrupted(ShutdownSignal),
}

// Controller with an event channel plus the signal guard that stops it on Ctrl+C
fn start_controller(
    config: &Config,
) -> (
    Arc<PlaybackController>,
    mpsc::UnboundedReceiver<PlayerEvent>,
    JoinHandle<std::io::Result<ShutdownSignal>>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let mut controller = config.build_controller();
    controller.set_event_sender(event_tx);
    let controller = Arc::new(controller);

    let guard = shutdown::spawn_shutdown_guard(Arc::clone(&controller));

    (controller, event_rx, guard)
}

async fn wait_for_song(
    controller: &PlaybackController,
    events: &mut mpsc::UnboundedReceiver<PlayerEvent>,
    guard: &mut JoinHandle<std::io::Result<ShutdownSignal>>,
) -> Result<Outcome> {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            signal = &mut *guard => {
                println!();
                return Ok(Outcome::Interrupted(signal??));
            }
            event = events.recv() => match event {
                Some(PlayerEvent::TrackFinished { success, .. }) => {
                    println!();
                    if !success {
                        warn!("player exited with an error");
                    }
                    return Ok(Outcome::Finished);
                }
                Some(PlayerEvent::Error(message)) => eprintln!("\n❌ {}", message),
                Some(_) => {}
                None => return Ok(Outcome::Finished),
            },
            _ = ticker.tick() => {
                print!("\r   {}   ", status_line(&controller.get_status()));
                let _ = std::io::stdout().flush();
            }
        }
    }
}

async fn play(config: &Config, file: PathBuf, options: PlaybackOptions) -> Result<ExitCode> {
    let (controller, mut events, mut guard) = start_controller(config);

    controller
        .play_with(&file, options)
        .await
        .with_context(|| format!("playing {}", file.display()))?;

    match controller.get_status().metadata {
        Some(metadata) => print_metadata(&file, &metadata),
        None => println!("🎧 {}", file.display()),
    }

    let outcome = wait_for_song(&controller, &mut events, &mut guard).await?;
    controller.stop().await;
    guard.abort();

    Ok(exit_code(outcome))
}

async fn queue(config: &Config, dir: &Path, filter: Option<&str>) -> Result<ExitCode> {
    let result = MediaScanner::new().scan(dir).await?;
    let mut tracks = TrackList::from_scan(result);
    if let Some(filter) = filter {
        tracks.set_filter(filter);
    }

    let total = tracks.filtered().len();
    if total == 0 {
        eprintln!("❌ No songs found in {}", dir.display());
        return Ok(ExitCode::FAILURE);
    }
    if tracks.filter().is_empty() {
        println!("🎵 {} songs queued", total);
    } else {
        println!("🎵 {} songs queued matching \"{}\"", total, tracks.filter());
    }

    let (controller, mut events, mut guard) = start_controller(config);
    let mut current = None;

    for position in 1..=total {
        let Some(index) = tracks.next(current) else {
            break;
        };
        current = Some(index);
        let Some(path) = tracks.path(index) else {
            break;
        };

        println!("\n[{}/{}] {}", position, total, tracks.get(index).unwrap_or_default());
        if let Err(e) = controller.play(&path).await {
            // Bad file or missing player; move on rather than stall the queue
            eprintln!("❌ {:#}", anyhow::Error::from(e));
            continue;
        }

        if let Outcome::Interrupted(signal) = wait_for_song(&controller, &mut events, &mut guard).await? {
            return Ok(exit_code(Outcome::Interrupted(signal)));
        }
    }

    controller.shutdown().await;
    guard.abort();
    println!("\n👋 Queue finished");
    Ok(ExitCode::SUCCESS)
}

fn exit_code(outcome: Outcome) -> ExitCode {
    match outcome {
        Outcome::Finished => ExitCode::SUCCESS,
        Outcome::Interrupted(signal) => ExitCode::from(signal.exit_code() as u8),
    }
}
