pub mod bookmarks;
pub mod config;
pub mod errors;
pub mod logging;
pub mod relay;
pub mod web;
