//! Bookmark store, URL templates and the file watcher that keeps the store
//! in sync with its JSON file.

pub mod store;
pub mod template;
pub mod watch;

use std::sync::Arc;

use tokio::sync::RwLock;

pub use store::{Bookmark, BookmarkStore, RESERVED_KEYS};
pub use template::{Target, expand_direct, expand_search, placeholders, to_location};
pub use watch::{BookmarkWatcher, WatchEvent};

/// Shared, atomically replaceable store.
///
/// Readers take a snapshot and never observe a half-applied reload.
#[derive(Debug, Clone, Default)]
pub struct Bookmarks {
    current: Arc<RwLock<Arc<BookmarkStore>>>,
}

impl Bookmarks {
    pub fn new(store: BookmarkStore) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(store))),
        }
    }

    pub async fn snapshot(&self) -> Arc<BookmarkStore> {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, store: BookmarkStore) {
        *self.current.write().await = Arc::new(store);
    }
}
