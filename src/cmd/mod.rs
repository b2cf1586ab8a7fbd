//! CLI command implementations.
//!
//! | Module      | Commands handled    |
//! |-------------|---------------------|
//! | `serve`     | `Serve`             |
//! | `bookmarks` | `CheckBookmarks`    |
//! | `config`    | `Config`            |

pub mod bookmarks;
pub mod config;
pub mod serve;

pub use bookmarks::cmd_check_bookmarks;
pub use config::cmd_config;
pub use serve::cmd_serve;
