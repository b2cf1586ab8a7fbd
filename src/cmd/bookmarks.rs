//! Bookmarks file check: `bunnify check-bookmarks`.

use std::path::Path;

use anyhow::{Context, Result};

use bunnify::bookmarks::BookmarkStore;

pub fn cmd_check_bookmarks(path: &Path) -> Result<()> {
    let store = BookmarkStore::load(path)
        .with_context(|| format!("Invalid bookmarks file: {}", path.display()))?;

    println!();
    for bookmark in store.iter() {
        let params = bookmark.params();
        if params.is_empty() {
            println!("  {:<12} {}", bookmark.key, bookmark.url);
        } else {
            println!(
                "  {:<12} {}  ({})",
                bookmark.key,
                bookmark.url,
                params.join(", ")
            );
        }
    }
    println!();
    println!("{} bookmarks OK ({})", store.len(), path.display());
    Ok(())
}
