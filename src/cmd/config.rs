//! Configuration view and validation commands: `bunnify config`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::super::ConfigCommands;
use bunnify::config::{BunnifyConfig, BunnifyToml, CONFIG_FILE_NAME, CliOverrides};

pub fn cmd_config(explicit: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let config = BunnifyConfig::load(explicit, &CliOverrides::default())?;

            println!();
            if config.source.exists() {
                println!("Config file: {}", config.source.display());
            } else {
                println!(
                    "No {} found at {}; using defaults.",
                    CONFIG_FILE_NAME,
                    config.source.display()
                );
            }
            println!("Effective values (with env overrides):");
            println!();
            let rendered =
                toml::to_string_pretty(&config.toml).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = BunnifyConfig::load(explicit, &CliOverrides::default())?;
            if !config.source.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE_NAME);
                return Ok(());
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            let path = explicit
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            if path.exists() {
                println!("{} already exists at {}", CONFIG_FILE_NAME, path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            BunnifyToml::default().save(&path)?;

            println!("Created {} at {}", CONFIG_FILE_NAME, path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, public_url");
            println!("  - [bookmarks] file, watch");
            println!("  - [review] helper, default_repo, phases");
            println!();
        }
    }

    Ok(())
}
