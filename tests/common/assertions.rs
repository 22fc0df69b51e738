//! Event and filesystem assertions

use std::path::Path;
use tokio::sync::broadcast;
use tweetlikes_dl::Event;

/// Drain every event currently buffered in `events`
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

/// Assert that each of `expected_files` exists below `dir` and is not empty
pub fn assert_files_exist(dir: &Path, expected_files: &[&str]) {
    for file in expected_files {
        let path = dir.join(file);
        let metadata = std::fs::metadata(&path)
            .unwrap_or_else(|e| panic!("expected file {} to exist: {e}", path.display()));
        assert!(metadata.len() > 0, "file {} is empty", path.display());
    }
}

/// Assert that no `.part` file is left anywhere below `dir`
pub fn assert_no_partial_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            assert_no_partial_files(&path);
        } else {
            assert!(
                path.extension().is_none_or(|ext| ext != "part"),
                "partial file left behind: {}",
                path.display()
            );
        }
    }
}
