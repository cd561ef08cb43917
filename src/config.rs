//! Configuration for shopflow, read from `.shopflow/shopflow.toml`.
//!
//! Layered as file → environment → CLI. Every key is optional; a missing
//! file yields the defaults below.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8040
//! db_path = ".shopflow/shop.db"
//! cache_ttl_secs = 300
//! dev = false
//!
//! [client]
//! base_url = "http://127.0.0.1:8040"
//! push_path = "/ws/admin/workflow/"
//! debounce_ms = 1000
//! request_timeout_secs = 10
//! reconnect_delay_ms = 2000
//! toast_ttl_ms = 4000
//!
//! [logging]
//! level = "info"
//! json = false
//! file = ".shopflow/logs"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::shop::server::ServerConfig;
use crate::workflow::push::push_url;

pub const CONFIG_DIR: &str = ".shopflow";
pub const CONFIG_FILE: &str = "shopflow.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub cache_ttl_secs: u64,
    pub dev: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8040,
            db_path: PathBuf::from(".shopflow/shop.db"),
            cache_ttl_secs: 300,
            dev: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientSection {
    pub base_url: String,
    pub push_path: String,
    /// Minimum spacing between applied push updates.
    pub debounce_ms: u64,
    pub request_timeout_secs: u64,
    pub reconnect_delay_ms: u64,
    pub toast_ttl_ms: u64,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8040".to_string(),
            push_path: "/ws/admin/workflow/".to_string(),
            debounce_ms: 1000,
            request_timeout_secs: 10,
            reconnect_delay_ms: 2000,
            toast_ttl_ms: 4000,
        }
    }
}

impl ClientSection {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn toast_ttl(&self) -> Duration {
        Duration::from_millis(self.toast_ttl_ms)
    }

    pub fn push_url(&self) -> String {
        push_url(&self.base_url, &self.push_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Directory for daily-rolling log files. Unset means stderr only.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

/// The complete shopflow.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ShopflowToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ShopflowToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse shopflow.toml")
    }

    /// Load `path`, or defaults if it does not exist. A file that exists
    /// but does not parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize shopflow.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Overlay environment values. `lookup` is `std::env::var` in
    /// production; unparsable values are reported and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(url) = lookup("SHOPFLOW_BASE_URL") {
            self.client.base_url = url;
        }
        if let Some(port) = lookup("SHOPFLOW_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warnings.push(format!("Ignoring SHOPFLOW_PORT='{}': not a port", port)),
            }
        }
        if let Some(path) = lookup("SHOPFLOW_DB_PATH") {
            self.server.db_path = PathBuf::from(path);
        }
        if let Some(level) = lookup("SHOPFLOW_LOG") {
            self.logging.level = level;
        }
        warnings
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0: the OS will pick a random port".to_string());
        }
        if !self.client.base_url.starts_with("http://")
            && !self.client.base_url.starts_with("https://")
        {
            warnings.push(format!(
                "client.base_url '{}' should start with http:// or https://",
                self.client.base_url
            ));
        }
        if !self.client.push_path.starts_with('/') {
            warnings.push(format!(
                "client.push_path '{}' should start with '/'",
                self.client.push_path
            ));
        }
        if self.client.debounce_ms == 0 {
            warnings.push(
                "client.debounce_ms is 0: every push update will be applied".to_string(),
            );
        }
        if self.client.request_timeout_secs == 0 {
            warnings.push("client.request_timeout_secs is 0: every request will time out".to_string());
        }

        warnings
    }
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct ShopflowConfig {
    pub project_dir: PathBuf,
    /// File the settings were read from, whether or not it exists.
    pub config_path: PathBuf,
    pub toml: ShopflowToml,
    /// Problems found while layering environment values.
    pub env_warnings: Vec<String>,
}

impl ShopflowConfig {
    /// Load file settings then overlay the process environment.
    pub fn load(project_dir: PathBuf, config_path: Option<PathBuf>) -> Result<Self> {
        let config_path =
            config_path.unwrap_or_else(|| project_dir.join(CONFIG_DIR).join(CONFIG_FILE));
        let mut toml = ShopflowToml::load_or_default(&config_path)?;
        let env_warnings = toml.apply_env(|key| std::env::var(key).ok());
        Ok(Self {
            project_dir,
            config_path,
            toml,
            env_warnings,
        })
    }

    /// Resolve a possibly relative path against the project directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.resolve(&self.toml.server.db_path)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.toml.server.host.clone(),
            port: self.toml.server.port,
            db_path: self.db_path(),
            cache_ttl: Duration::from_secs(self.toml.server.cache_ttl_secs),
            dev_mode: self.toml.server.dev,
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.env_warnings.clone();
        warnings.extend(self.toml.validate());
        warnings
    }
}
