//! Polling reload of the bookmarks file.
//!
//! The file's SHA-256 is checked every interval. A change triggers a full
//! reload; a file that fails to load leaves the current store in place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use super::Bookmarks;
use super::store::BookmarkStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Unchanged,
    /// The file is unreadable; nothing was touched.
    Unreadable,
    Reloaded { count: usize },
    /// The file changed but did not load; the old store stays.
    Rejected { reason: String },
}

/// Hex SHA-256 of the file contents, `None` if it cannot be read.
pub fn file_digest(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let digest = Sha256::digest(&bytes);
    Some(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

pub struct BookmarkWatcher {
    path: PathBuf,
    interval: Duration,
    last_digest: Option<String>,
}

impl BookmarkWatcher {
    /// Start watching from the file's current contents.
    pub fn new(path: PathBuf, interval: Duration) -> Self {
        let last_digest = file_digest(&path);
        Self {
            path,
            interval,
            last_digest,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One poll: compare digests and reload on change.
    pub async fn check(&mut self, bookmarks: &Bookmarks) -> WatchEvent {
        let Some(digest) = file_digest(&self.path) else {
            return WatchEvent::Unreadable;
        };
        if self.last_digest.as_deref() == Some(digest.as_str()) {
            return WatchEvent::Unchanged;
        }
        info!(
            path = %self.path.display(),
            from = ?self.last_digest,
            to = %digest,
            "bookmarks file changed"
        );
        self.last_digest = Some(digest);

        match BookmarkStore::load(&self.path) {
            Ok(store) => {
                let count = store.len();
                bookmarks.replace(store).await;
                info!(count, "reloaded bookmarks");
                WatchEvent::Reloaded { count }
            }
            Err(e) => {
                error!(path = %self.path.display(), "keeping previous bookmarks: {}", e);
                WatchEvent::Rejected {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Poll forever. Run it as a background task and abort it on shutdown.
    pub async fn run(mut self, bookmarks: Bookmarks) {
        info!(
            path = %self.path.display(),
            interval = ?self.interval,
            "watching bookmarks file"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let event = self.check(&bookmarks).await;
            debug!(?event, "bookmarks poll");
        }
    }
}
