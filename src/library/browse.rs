// Single-level listing for the "choose directory" picker
// Shares the scanner's error type but never recurses

use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::scanner::ScanError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub full_path: PathBuf,
    pub is_directory: bool,
}

/// List `dir` one level deep: dotfiles hidden, directories first, then files,
/// each group alphabetical.
pub async fn list_directory<P: AsRef<Path>>(dir: P) -> Result<Vec<DirectoryEntry>, ScanError> {
    let dir = dir.as_ref();
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| ScanError::RootUnreadable {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut entries = Vec::new();
    loop {
        let entry = match read_dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "stopped listing early");
                break;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }

        let full_path = entry.path();
        // Follows symlinks, so a link to a folder browses like a folder
        let is_directory = match tokio::fs::metadata(&full_path).await {
            Ok(meta) => meta.is_dir(),
            Err(e) => {
                debug!(path = %full_path.display(), error = %e, "skipping entry we can't stat");
                continue;
            }
        };

        entries.push(DirectoryEntry {
            name,
            full_path,
            is_directory,
        });
    }

    entries.sort_by(compare_entries);
    Ok(entries)
}

fn compare_entries(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    b.is_directory
        .cmp(&a.is_directory)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

/// Parent of `dir`, for the ".." row of the picker.
pub fn parent_directory(dir: &Path) -> Option<PathBuf> {
    dir.parent().map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_directories_first_then_alphabetical() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.mp3"), b"x").unwrap();
        fs::write(dir.path().join("A.flac"), b"x").unwrap();
        fs::write(dir.path().join(".DS_Store"), b"x").unwrap();
        fs::create_dir(dir.path().join("zed")).unwrap();
        fs::create_dir(dir.path().join("Albums")).unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::create_dir_all(dir.path().join("zed/nested")).unwrap();

        let entries = list_directory(dir.path()).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();

        assert_eq!(names, vec!["Albums", "zed", "A.flac", "b.mp3"]);
        assert!(entries[0].is_directory);
        assert!(!entries[2].is_directory);
        assert_eq!(entries[1].full_path, dir.path().join("zed"));
    }

    #[tokio::test]
    async fn test_unreadable_directory_errors() {
        let result = list_directory("/nonexistent/shufflo").await;
        assert!(matches!(result, Err(ScanError::RootUnreadable { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_broken_link_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.mp3"), b"x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("broken")).unwrap();

        let entries = list_directory(dir.path()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "real.mp3");
    }

    #[test]
    fn test_parent_directory() {
        assert_eq!(parent_directory(Path::new("/music/rock")), Some(PathBuf::from("/music")));
        assert_eq!(parent_directory(Path::new("/")), None);
    }
}
