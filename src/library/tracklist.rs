use std::path::PathBuf;

use super::scanner::ScanResult;

/// Scanned songs plus the search box. Indices always refer to the full,
/// unfiltered list so they stay valid while the filter changes.
#[derive(Debug, Clone, Default)]
pub struct TrackList {
    root: PathBuf,
    entries: Vec<String>,
    filter: String,
}

impl TrackList {
    pub fn new(root: PathBuf, mut entries: Vec<String>) -> Self {
        entries.sort();
        Self {
            root,
            entries,
            filter: String::new(),
        }
    }

    pub fn from_scan(result: ScanResult) -> Self {
        Self::new(result.root, result.entries)
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.filter = filter.trim().to_lowercase();
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    pub fn path(&self, index: usize) -> Option<PathBuf> {
        self.entries.get(index).map(|relative| self.root.join(relative))
    }

    fn matches(&self, entry: &str) -> bool {
        self.filter.is_empty() || entry.to_lowercase().contains(&self.filter)
    }

    /// Indices of entries matching the current filter, in list order.
    pub fn filtered(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| self.matches(entry))
            .map(|(index, _)| index)
            .collect()
    }

    /// Entries are sorted, so lookup is a binary search.
    pub fn position_of(&self, relative: &str) -> Option<usize> {
        self.entries
            .binary_search_by(|entry| entry.as_str().cmp(relative))
            .ok()
    }

    /// Next match after `current`, wrapping around. With no current song (or one
    /// the filter hides) this starts from the first match.
    pub fn next(&self, current: Option<usize>) -> Option<usize> {
        let visible = self.filtered();
        if visible.is_empty() {
            return None;
        }

        let next = match current.and_then(|c| visible.iter().position(|&i| i == c)) {
            Some(pos) => (pos + 1) % visible.len(),
            None => 0,
        };
        Some(visible[next])
    }

    pub fn previous(&self, current: Option<usize>) -> Option<usize> {
        let visible = self.filtered();
        if visible.is_empty() {
            return None;
        }

        let previous = match current.and_then(|c| visible.iter().position(|&i| i == c)) {
            Some(0) | None => visible.len() - 1,
            Some(pos) => pos - 1,
        };
        Some(visible[previous])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> TrackList {
        TrackList::new(
            PathBuf::from("/music"),
            vec![
                "rock/Highway.mp3".to_string(),
                "jazz/Blue.flac".to_string(),
                "rock/Thunder.ogg".to_string(),
                "ambient/Drift.wav".to_string(),
            ],
        )
    }

    #[test]
    fn test_entries_are_sorted_on_construction() {
        let list = list();
        assert_eq!(list.get(0), Some("ambient/Drift.wav"));
        assert_eq!(list.get(3), Some("rock/Thunder.ogg"));
        assert_eq!(list.path(1), Some(PathBuf::from("/music/jazz/Blue.flac")));
    }

    #[test]
    fn test_next_and_previous_wrap() {
        let list = list();
        assert_eq!(list.next(None), Some(0));
        assert_eq!(list.next(Some(0)), Some(1));
        assert_eq!(list.next(Some(3)), Some(0));
        assert_eq!(list.previous(Some(0)), Some(3));
        assert_eq!(list.previous(Some(2)), Some(1));
        assert_eq!(list.previous(None), Some(3));
    }

    #[test]
    fn test_filter_limits_navigation() {
        let mut list = list();
        list.set_filter("ROCK/");

        assert_eq!(list.filtered(), vec![2, 3]);
        assert_eq!(list.next(Some(2)), Some(3));
        assert_eq!(list.next(Some(3)), Some(2));
        assert_eq!(list.previous(Some(2)), Some(3));
        // Current song hidden by the filter: jump to the first match
        assert_eq!(list.next(Some(0)), Some(2));
    }

    #[test]
    fn test_filter_with_no_matches() {
        let mut list = list();
        list.set_filter("polka");
        assert!(list.filtered().is_empty());
        assert_eq!(list.next(Some(0)), None);
        assert_eq!(list.previous(None), None);
    }

    #[test]
    fn test_position_of() {
        let list = list();
        assert_eq!(list.position_of("jazz/Blue.flac"), Some(1));
        assert_eq!(list.position_of("jazz/Red.flac"), None);
    }
}
