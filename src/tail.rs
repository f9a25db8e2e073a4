//! Console log discovery and tailing
//!
//! The game only writes `console.log` when launched with `-condebug`. The log
//! is emptied at startup so a previous match is not replayed, then followed
//! from its end. A `notify` watcher on the containing directory wakes the
//! reader early; a fixed poll interval covers platforms where change events
//! are unreliable.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::engine::EngineInput;
use crate::error::{RelayError, Result};

/// Longest unterminated line kept while waiting for its newline
const MAX_PARTIAL_LINE: usize = 64 * 1024;

const TF2_LOG_SUFFIX: &[&str] = &[
    "steamapps",
    "common",
    "Team Fortress 2",
    "tf",
    "console.log",
];

/// Places a Steam library commonly lives on this platform
fn steam_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    if cfg!(target_os = "windows") {
        roots.push(PathBuf::from(r"C:\Program Files (x86)\Steam"));
        roots.push(PathBuf::from(r"C:\Program Files\Steam"));
    } else if let Some(home) = dirs::home_dir() {
        if cfg!(target_os = "macos") {
            roots.push(home.join("Library/Application Support/Steam"));
        } else {
            roots.push(home.join(".steam/steam"));
            roots.push(home.join(".local/share/Steam"));
            roots.push(home.join(".var/app/com.valvesoftware.Steam/.local/share/Steam"));
        }
    }

    roots
}

/// All default `console.log` locations, most likely first
pub fn candidate_log_paths() -> Vec<PathBuf> {
    steam_roots()
        .into_iter()
        .map(|root| TF2_LOG_SUFFIX.iter().fold(root, |path, part| path.join(part)))
        .collect()
}

/// Pick the first candidate whose game directory exists
pub fn detect_log_path() -> Option<PathBuf> {
    let candidates = candidate_log_paths();
    candidates
        .iter()
        .find(|path| path.parent().is_some_and(Path::exists))
        .or_else(|| candidates.first())
        .cloned()
}

/// Empty (or create) the log file
pub fn truncate(path: &Path) -> Result<()> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| RelayError::startup(format!("Unable to empty {}: {}", path.display(), e)))?;
    Ok(())
}

/// Incremental line reader over a growing file
#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    offset: u64,
    /// Bytes after the last newline, waiting for the rest of their line
    partial: Vec<u8>,
    /// Set after an overlong line was dropped, until its newline shows up
    skipping: bool,
    poll_interval: Duration,
}

impl LogTailer {
    /// Tail from the beginning of the file
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            partial: Vec::new(),
            skipping: false,
            poll_interval,
        }
    }

    /// Tail from the current end of the file
    pub fn from_end(path: impl Into<PathBuf>, poll_interval: Duration) -> io::Result<Self> {
        let mut tailer = Self::new(path, poll_interval);
        tailer.offset = match std::fs::metadata(&tailer.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        Ok(tailer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read whatever complete lines were appended since the last call.
    ///
    /// A shrinking file is treated as truncated and re-read from the start.
    pub fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let len = file.metadata()?.len();
        if len < self.offset {
            tracing::debug!("{} shrank, restarting from the top", self.path.display());
            self.offset = 0;
            self.partial.clear();
            self.skipping = false;
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut buffer = Vec::new();
        let read = file.read_to_end(&mut buffer)?;
        self.offset += read as u64;

        let mut fresh = buffer.as_slice();
        if self.skipping {
            match fresh.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    fresh = &fresh[pos + 1..];
                    self.skipping = false;
                }
                None => return Ok(Vec::new()),
            }
        }
        self.partial.extend_from_slice(fresh);

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let rest = self.partial.split_off(pos + 1);
            let raw = std::mem::replace(&mut self.partial, rest);
            let line = String::from_utf8_lossy(&raw);
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }

        if self.partial.len() > MAX_PARTIAL_LINE {
            tracing::warn!(
                "Dropping unterminated line of {} bytes in {}",
                self.partial.len(),
                self.path.display()
            );
            self.partial = Vec::new();
            self.skipping = true;
        }
        Ok(lines)
    }

    fn start_watcher(&self, wake: mpsc::UnboundedSender<()>) -> Option<RecommendedWatcher> {
        let dir = self.path.parent()?.to_path_buf();
        let target = self.path.clone();

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if event.paths.iter().any(|p| p == &target) {
                    let _ = wake.send(());
                }
            }
        });

        match watcher {
            Ok(mut watcher) => match watcher.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => Some(watcher),
                Err(e) => {
                    tracing::warn!("Cannot watch {}: {}; polling only", dir.display(), e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("File watcher unavailable: {}; polling only", e);
                None
            }
        }
    }

    /// Forward new lines to the engine until cancelled or the engine stops
    pub async fn run(self, tx: mpsc::Sender<EngineInput>, cancel: CancellationToken) {
        let (wake_tx, mut wake_rx) = mpsc::unbounded_channel();
        let _watcher = self.start_watcher(wake_tx);

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Tailing log file at {}", self.path.display());

        let mut tailer = self;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Log tailer shutting down");
                    break;
                }
                _ = ticker.tick() => {}
                Some(()) = wake_rx.recv() => {}
            }

            // File reads block, keep them off the runtime workers
            let read = tokio::task::spawn_blocking(move || {
                let result = tailer.read_new_lines();
                (tailer, result)
            })
            .await;
            let result = match read {
                Ok((returned, result)) => {
                    tailer = returned;
                    result
                }
                Err(e) => {
                    tracing::error!("Log reader task failed: {}", e);
                    return;
                }
            };

            let lines = match result {
                Ok(lines) => lines,
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", tailer.path.display(), e);
                    continue;
                }
            };

            for line in lines {
                if tx.send(EngineInput::Line(line)).await.is_err() {
                    tracing::debug!("Engine input closed, stopping tailer");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn append(path: &Path, text: &str) {
        let mut file = OpenOptions::new().append(true).create(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_reads_complete_lines_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        let mut tailer = LogTailer::new(&path, Duration::from_millis(50));

        assert!(tailer.read_new_lines().unwrap().is_empty());

        append(&path, "first line\r\nsecond ");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["first line"]);

        append(&path, "half\nthird\n");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["second half", "third"]);
        assert!(tailer.read_new_lines().unwrap().is_empty());
    }

    #[test]
    fn test_from_end_skips_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        append(&path, "old match\n");

        let mut tailer = LogTailer::from_end(&path, Duration::from_millis(50)).unwrap();
        append(&path, "new match\n");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["new match"]);
    }

    #[test]
    fn test_truncation_restarts_from_top() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        let mut tailer = LogTailer::new(&path, Duration::from_millis(50));

        append(&path, "a fairly long line before truncation\n");
        assert_eq!(tailer.read_new_lines().unwrap().len(), 1);

        truncate(&path).unwrap();
        append(&path, "short\n");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["short"]);
    }

    #[test]
    fn test_overlong_line_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        let mut tailer = LogTailer::new(&path, Duration::from_millis(50));

        append(&path, "before\n");
        append(&path, &"x".repeat(MAX_PARTIAL_LINE + 1));
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["before"]);
        assert!(tailer.partial.is_empty());

        // The rest of the dropped line never surfaces
        append(&path, &"x".repeat(1024));
        assert!(tailer.read_new_lines().unwrap().is_empty());
        assert!(tailer.partial.is_empty());

        append(&path, "xxx tail\nLobby updated\n");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["Lobby updated"]);
    }

    #[test]
    fn test_truncate_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        truncate(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        let missing_dir = dir.path().join("no").join("such").join("console.log");
        assert!(matches!(
            truncate(&missing_dir),
            Err(RelayError::StartupFailure { .. })
        ));
    }

    #[test]
    fn test_candidate_paths_end_in_console_log() {
        for path in candidate_log_paths() {
            assert!(path.ends_with("Team Fortress 2/tf/console.log"));
        }
    }

    #[tokio::test]
    async fn test_run_forwards_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        truncate(&path).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let tailer = LogTailer::from_end(&path, Duration::from_millis(20)).unwrap();
        let task = tokio::spawn(tailer.run(tx, cancel.clone()));

        append(&path, "Lobby updated\n");
        let input = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(input, EngineInput::Line("Lobby updated".to_string()));

        cancel.cancel();
        task.await.unwrap();
    }
}
