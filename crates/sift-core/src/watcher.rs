//! File watcher for the image root. New or modified images are re-ingested.
//!
//! Notifications arrive on the notify thread; they are filtered there and handed to
//! the async side over a channel, where captioning and store updates happen.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify_debouncer_mini::notify::{self, RecommendedWatcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::mpsc;

use crate::images::{has_image_extension, ingest};
use crate::llm::Captioner;
use crate::search::QueryEngine;

/// Coalescing window for bursts of raw filesystem events.
const DEBOUNCE: Duration = Duration::from_millis(400);

/// Drops a path seen again within `window` of its last admission.
#[derive(Debug)]
pub struct Cooldown {
    window: Duration,
    last: HashMap<PathBuf, Instant>,
}

impl Cooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    /// True if `path` should be processed now; records `now` when it is.
    /// Entries older than the window are dropped, so only recent paths are kept.
    pub fn admit(&mut self, path: &Path, now: Instant) -> bool {
        let window = self.window;
        self.last
            .retain(|_, seen| now.saturating_duration_since(*seen) < window);
        if let Some(prev) = self.last.get(path) {
            if now.saturating_duration_since(*prev) < self.window {
                return false;
            }
        }
        self.last.insert(path.to_path_buf(), now);
        true
    }
}

/// Keeps the watch alive; dropping it stops notifications.
pub struct ImageWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    root: PathBuf,
}

impl ImageWatcher {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Watches `root` recursively and sends each changed image path on `tx`, at most once
/// per `cooldown` per path. Returns Err on setup failure.
pub fn watch_images(
    root: &Path,
    extensions: Vec<String>,
    cooldown: Duration,
    tx: mpsc::UnboundedSender<PathBuf>,
) -> Result<ImageWatcher, WatchError> {
    if !root.is_dir() {
        return Err(WatchError::NotADirectory(root.to_path_buf()));
    }
    let root = root.canonicalize().map_err(WatchError::Canonicalize)?;

    let mut gate = Cooldown::new(cooldown);
    let mut debouncer = new_debouncer(DEBOUNCE, move |res: DebounceEventResult| match res {
        Ok(events) => {
            for event in events {
                let path = event.path;
                // Removals and directories show up here too.
                if !has_image_extension(&path, &extensions) || !path.is_file() {
                    continue;
                }
                if !gate.admit(&path, Instant::now()) {
                    tracing::debug!(path = %path.display(), "within cooldown, ignored");
                    continue;
                }
                if tx.send(path).is_err() {
                    tracing::debug!("ingest loop gone, dropping event");
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "watcher error"),
    })
    .map_err(|e| WatchError::Notify(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&root, notify::RecursiveMode::Recursive)
        .map_err(|e| WatchError::Watch(e.to_string()))?;

    tracing::info!(root = %root.display(), "watching for new images");
    Ok(ImageWatcher {
        _debouncer: debouncer,
        root,
    })
}

/// Ingests every path received until the sender side closes.
pub async fn run_ingest_loop(
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    engine: Arc<QueryEngine>,
    captioner: Arc<dyn Captioner>,
) {
    while let Some(path) = rx.recv().await {
        match ingest(&path, captioner.as_ref()).await {
            Ok(record) => {
                engine.add_records(vec![record]).await;
                tracing::info!(path = %path.display(), "processed new image");
            }
            Err(e) => tracing::warn!(error = %e, "could not process new image"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("watcher init: {0}")]
    Notify(String),
    #[error("watch failed: {0}")]
    Watch(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::PNG_HEADER;
    use crate::llm::NoCaptioner;
    use crate::records::RecordStore;

    #[test]
    fn cooldown_blocks_repeats_inside_window() {
        let mut gate = Cooldown::new(Duration::from_secs(5));
        let t0 = Instant::now();
        let a = Path::new("/x/a.png");
        let b = Path::new("/x/b.png");
        assert!(gate.admit(a, t0));
        assert!(!gate.admit(a, t0 + Duration::from_secs(4)));
        assert!(gate.admit(b, t0 + Duration::from_secs(4)));
        assert!(gate.admit(a, t0 + Duration::from_secs(5)));
        assert!(!gate.admit(a, t0 + Duration::from_secs(6)));
    }

    #[test]
    fn cooldown_forgets_expired_paths() {
        let mut gate = Cooldown::new(Duration::from_secs(5));
        let t0 = Instant::now();
        for i in 0..10 {
            assert!(gate.admit(&PathBuf::from(format!("/x/{i}.png")), t0));
        }
        assert_eq!(gate.last.len(), 10);
        assert!(gate.admit(Path::new("/x/late.png"), t0 + Duration::from_secs(6)));
        assert_eq!(gate.last.len(), 1);
    }

    #[test]
    fn watch_rejects_missing_root() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = watch_images(Path::new("/definitely/not/here"), vec!["png".into()], Duration::ZERO, tx);
        assert!(matches!(err, Err(WatchError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn ingest_loop_appends_until_closed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("new.png");
        std::fs::write(&file, PNG_HEADER).unwrap();

        let store = Arc::new(RecordStore::new());
        let engine = Arc::new(QueryEngine::local(store.clone()));
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(file.clone()).unwrap();
        tx.send(dir.path().join("vanished.png")).unwrap();
        drop(tx);

        run_ingest_loop(rx, engine, Arc::new(NoCaptioner)).await;
        let records = store.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, file);
    }
}
