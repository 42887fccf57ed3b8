use shufflo::audio::{LoftyTagReader, TagReader};
use shufflo::config::Config;
use shufflo::library::MediaScanner;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("🎵 Shufflo Music Scanner Test");
    println!("============================");

    let music_dir = match std::env::args().nth(1) {
        Some(dir) => PathBuf::from(dir),
        None => Config::load()?.music_directory,
    };

    if !music_dir.exists() {
        println!("❌ Music directory not found: {:?}", music_dir);
        return Ok(());
    }

    println!("📁 Scanning music directory: {:?}", music_dir);

    let scanner = MediaScanner::new();

    match scanner.scan(&music_dir).await {
        Ok(result) => {
            println!("✅ Found {} music files", result.len());
            println!();

            // Tags for the first 10 songs
            for (i, entry) in result.entries.iter().take(10).enumerate() {
                let path = result.root.join(entry);
                match LoftyTagReader.read(&path) {
                    Ok(tags) => {
                        println!("{}. {}", i + 1, tags.display_title(&path));
                        println!("   Artist: {}", tags.display_artist());
                        println!("   Album: {}", tags.album.as_deref().unwrap_or("Unknown Album"));
                        if let Some(duration) = tags.duration {
                            let total = duration as u64;
                            println!("   Duration: {}:{:02}", total / 60, total % 60);
                        }
                    }
                    Err(e) => println!("{}. ⚠️  {}", i + 1, e),
                }
                println!("   Path: {:?}", entry);
                println!();
            }

            if result.len() > 10 {
                println!("... and {} more tracks", result.len() - 10);
            }

            // Show format breakdown
            let mut format_counts = BTreeMap::new();
            for entry in &result.entries {
                let extension = Path::new(entry)
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                *format_counts.entry(extension).or_insert(0) += 1;
            }

            println!("\n📊 Format breakdown:");
            for (format, count) in format_counts {
                println!("   {}: {} files", format, count);
            }

            let d = result.diagnostics;
            println!("\n🔎 {} entries examined, {} directories, {} skipped", d.entries_examined, d.directories_descended, d.skipped);
        }
        Err(e) => {
            println!("❌ Error scanning directory: {}", e);
        }
    }

    Ok(())
}
