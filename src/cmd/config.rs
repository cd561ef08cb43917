//! Configuration view and validation commands — `shopflow config`.

use anyhow::{Context, Result};

use super::super::ConfigCommands;
use shopflow::config::ShopflowConfig;

pub fn cmd_config(config: &ShopflowConfig, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Shopflow Configuration");
            println!("======================");
            println!();
            if config.config_path.exists() {
                println!("Config file: {}", config.config_path.display());
            } else {
                println!("No shopflow.toml found at {}", config.config_path.display());
                println!("Using defaults. Run 'shopflow init' to create one.");
            }
            println!();
            println!("Effective values (with env overrides):");
            println!();
            let rendered = toml::to_string_pretty(&config.toml)
                .context("Failed to render configuration")?;
            println!("{}", rendered);
            println!("Push URL: {}", config.toml.client.push_url());
            println!("Database: {}", config.db_path().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

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
    }

    Ok(())
}
