use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::api::{self, AppState};
use super::review::ReviewSettings;
use crate::bookmarks::{BookmarkStore, BookmarkWatcher, Bookmarks};
use crate::config::BunnifyToml;

/// Configuration for the bunnify server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
    pub base_url: String,
    pub bookmarks_file: PathBuf,
    /// `None` disables reloading.
    pub watch_interval: Option<Duration>,
    pub review: ReviewSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&BunnifyToml::default())
    }
}

impl From<&BunnifyToml> for ServerConfig {
    fn from(toml: &BunnifyToml) -> Self {
        Self {
            host: toml.server.host.clone(),
            port: toml.server.port,
            dev_mode: toml.server.dev_mode,
            base_url: toml.server.base_url(),
            bookmarks_file: toml.bookmarks.file.clone(),
            watch_interval: toml
                .bookmarks
                .watch
                .then(|| Duration::from_secs(toml.bookmarks.watch_interval_secs.max(1))),
            review: ReviewSettings::from(&toml.review),
        }
    }
}

/// Build the full application router.
pub fn build_router(state: Arc<AppState>, dev_mode: bool) -> Router {
    let app = api::api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if dev_mode {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Start the bunnify server.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let store = BookmarkStore::load(&config.bookmarks_file).with_context(|| {
        format!(
            "Failed to load bookmarks from {}",
            config.bookmarks_file.display()
        )
    })?;
    info!(
        count = store.len(),
        path = %config.bookmarks_file.display(),
        "loaded bookmarks"
    );
    let bookmarks = Bookmarks::new(store);

    let watcher = config.watch_interval.map(|interval| {
        let watcher = BookmarkWatcher::new(config.bookmarks_file.clone(), interval);
        tokio::spawn(watcher.run(bookmarks.clone()))
    });

    if !config.review.helper.exists() {
        warn!(
            helper = %config.review.helper.display(),
            "review helper not found; /review-pr/ will fail until it exists"
        );
    }

    let state = Arc::new(AppState {
        bookmarks,
        review: config.review,
        base_url: config.base_url,
    });
    let app = build_router(state, config.dev_mode);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!("bunnify running at http://{}", local_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    if let Some(task) = watcher {
        task.abort();
    }
    served?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
