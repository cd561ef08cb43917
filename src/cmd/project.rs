//! Project initialization — `shopflow init`.

use anyhow::{Context, Result};
use std::path::PathBuf;

use shopflow::config::{CONFIG_DIR, ShopflowConfig, ShopflowToml};
use shopflow::shop::db::ShopDb;

pub fn cmd_init(config: &ShopflowConfig, db_path: Option<PathBuf>, demo: bool) -> Result<()> {
    let shopflow_dir = config.project_dir.join(CONFIG_DIR);
    std::fs::create_dir_all(&shopflow_dir)
        .with_context(|| format!("Failed to create {}", shopflow_dir.display()))?;

    if config.config_path.exists() {
        println!("Config already exists at {}", config.config_path.display());
    } else {
        ShopflowToml::default().save(&config.config_path)?;
        println!("Created config at {}", config.config_path.display());
    }

    let db_path = match db_path {
        Some(path) => config.resolve(&path),
        None => config.db_path(),
    };
    let db = ShopDb::new(&db_path)?;
    println!("Shop database initialized at {}", db_path.display());

    if demo {
        let created = db.seed_demo()?;
        println!("Seeded {} demo service requests", created);
    }

    println!();
    println!("Next steps:");
    println!("  1. Run `shopflow serve` to start the backend");
    println!("  2. Run `shopflow board` or `shopflow watch` to see the board");
    Ok(())
}
