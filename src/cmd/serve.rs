//! Redirect and review server command: `bunnify serve`.

use anyhow::Result;
use tracing::warn;

use bunnify::config::BunnifyConfig;
use bunnify::web::{ServerConfig, start_server};

pub async fn cmd_serve(config: BunnifyConfig) -> Result<()> {
    for warning in config.validate() {
        warn!("config: {}", warning);
    }
    start_server(ServerConfig::from(&config.toml)).await
}
