//! Backend server command — `shopflow serve`.

use anyhow::Result;
use std::path::PathBuf;

use shopflow::config::ShopflowConfig;
use shopflow::shop::server::{ServerConfig, start_server};

/// Apply CLI flags over the file/env server settings.
pub fn server_config(
    config: &ShopflowConfig,
    host: Option<String>,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> ServerConfig {
    let mut server = config.server_config();
    if let Some(host) = host {
        server.host = host;
    }
    if let Some(port) = port {
        server.port = port;
    }
    if let Some(path) = db_path {
        server.db_path = config.resolve(&path);
    }
    server.dev_mode |= dev;
    server
}

pub async fn cmd_serve(
    config: &ShopflowConfig,
    host: Option<String>,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    start_server(server_config(config, host, port, db_path, dev)).await
}
