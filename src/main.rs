use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "shopflow")]
#[command(version, about = "Service-shop workflow board")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Path to shopflow.toml. Defaults to .shopflow/shopflow.toml in the project directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the shop backend (REST API and push socket)
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (CORS permissive for a local front-end dev server)
        #[arg(long)]
        dev: bool,
    },
    /// Create the config file and database
    Init {
        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Seed demo customers, vehicles and service requests
        #[arg(long)]
        demo: bool,
    },
    /// Fetch and print the board
    Board {
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Drag a card onto a column or another card and confirm the move
    Move {
        /// Card being dragged
        card_id: String,
        /// Column id (drop at its end) or card id (drop before it)
        over_id: String,

        #[arg(long)]
        base_url: Option<String>,
    },
    /// Print the board and re-print it on every update until Ctrl+C
    Watch {
        #[arg(long)]
        base_url: Option<String>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = shopflow::config::ShopflowConfig::load(project_dir, cli.config.clone())?;
    let mut logging = config.toml.logging.clone();
    logging.file = logging.file.map(|dir| config.resolve(&dir));
    let _guard = shopflow::logging::init(&logging, cli.verbose)?;
    for warning in &config.env_warnings {
        tracing::warn!("{}", warning);
    }

    match &cli.command {
        Commands::Serve {
            host,
            port,
            db_path,
            dev,
        } => {
            cmd::cmd_serve(&config, host.clone(), *port, db_path.clone(), *dev).await?;
        }
        Commands::Init { db_path, demo } => cmd::cmd_init(&config, db_path.clone(), *demo)?,
        Commands::Board { base_url } => cmd::cmd_board(&config, base_url.as_deref()).await?,
        Commands::Move {
            card_id,
            over_id,
            base_url,
        } => {
            cmd::cmd_move(&config, card_id, over_id, base_url.as_deref()).await?;
        }
        Commands::Watch { base_url } => cmd::cmd_watch(&config, base_url.as_deref()).await?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
