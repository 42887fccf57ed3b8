use shufflo::config::Config;
use shufflo::library::MediaScanner;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("🎵 Shufflo Audio Playback Test");
    println!("==============================");

    let config = Config::load()?;
    let music_dir = match std::env::args().nth(1) {
        Some(dir) => PathBuf::from(dir),
        None => config.music_directory.clone(),
    };

    if !music_dir.exists() {
        println!("❌ Music directory not found: {:?}", music_dir);
        return Ok(());
    }

    println!("📁 Scanning for music files...");
    let result = MediaScanner::new().scan(&music_dir).await?;

    let test_track = result
        .absolute_path(0)
        .ok_or_else(|| anyhow::anyhow!("No music files found"))?;

    let controller = config.build_controller();
    println!("🔧 Platform: {:?}", controller.resolver().platform());
    println!("🔧 Player candidates: {:?}", controller.resolver().backends()?);

    println!("\n▶️  Starting playback...");
    controller.play(&test_track).await?;

    let status = controller.get_status();
    if let Some(metadata) = &status.metadata {
        println!("🎧 Testing playback with:");
        println!("   Title: {}", metadata.display_title(&test_track));
        println!("   Artist: {}", metadata.display_artist());
    }
    println!("   Path: {:?}", test_track);
    println!("   PID: {:?}", controller.process_id());

    // Play for 10 seconds
    println!("🎶 Playing for 10 seconds...");
    sleep(Duration::from_secs(10)).await;

    // Test pause
    println!("⏸️  Pausing...");
    controller.pause().await?;
    sleep(Duration::from_secs(2)).await;

    // Test resume
    println!("▶️  Resuming...");
    controller.resume().await?;
    sleep(Duration::from_secs(5)).await;

    // Replacing the song must not leave two players running
    println!("🔁 Restarting the same song...");
    let old_pid = controller.process_id();
    controller.play(&test_track).await?;
    if let Some(pid) = old_pid {
        println!("   Old player alive: {}", shufflo::audio::is_process_alive(pid));
    }
    sleep(Duration::from_secs(3)).await;

    println!(
        "   Elapsed: {:.1}s",
        controller.get_status().elapsed_time.unwrap_or_default()
    );

    // Stop playback
    println!("⏹️  Stopping playback...");
    controller.shutdown().await;

    println!("✅ Playback test completed successfully!");
    println!("🎉 Shufflo playback controller is working!");

    Ok(())
}
