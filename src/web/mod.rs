//! HTTP surface: bookmark redirects, suggestions and the live review relay.

pub mod api;
pub mod review;
pub mod server;

pub use api::{AppState, SharedState};
pub use review::ReviewSettings;
pub use server::{ServerConfig, build_router, start_server};
