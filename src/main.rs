use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use bunnify::config::{BunnifyConfig, CliOverrides};
use bunnify::logging::init_logging;

mod cmd;

#[derive(Parser)]
#[command(name = "bunnify")]
#[command(version, about = "Bookmark redirects with a live PR review relay")]
pub struct Cli {
    /// Path to bunnify.toml (defaults to ./bunnify.toml, then the user config dir)
    #[arg(short, long, global = true, env = "BUNNIFY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Bookmarks JSON file
        #[arg(short, long)]
        bookmarks: Option<PathBuf>,

        /// Review helper program
        #[arg(long)]
        helper: Option<PathBuf>,

        /// Enable permissive CORS for local front-end work
        #[arg(long)]
        dev: bool,
    },
    /// Load a bookmarks file and report problems
    CheckBookmarks {
        /// Bookmarks JSON file
        file: PathBuf,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default bunnify.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            port,
            host,
            bookmarks,
            helper,
            dev,
        } => {
            let overrides = CliOverrides {
                host: host.clone(),
                port: *port,
                bookmarks: bookmarks.clone(),
                helper: helper.clone(),
                dev: *dev,
            };
            let config = BunnifyConfig::load(cli.config.as_deref(), &overrides)?;
            let _guard = init_logging(&config.toml.logging)?;
            cmd::cmd_serve(config).await?;
        }
        Commands::CheckBookmarks { file } => cmd::cmd_check_bookmarks(file)?,
        Commands::Config { command } => cmd::cmd_config(cli.config.as_deref(), command.clone())?,
    }

    Ok(())
}
