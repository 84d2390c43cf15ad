// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use session_core::SessionRuntimeConfig;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub http: HttpConfig,
    pub session_runtime: SessionRuntimeConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file_path: Option<String>,
    #[serde(default = "default_env")]
    pub env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_env() -> String {
    "development".to_string()
}

fn default_image_name() -> String {
    "ghcr.io/neovim/neovim:v0.10.3".to_string()
}

fn default_base_path() -> String {
    "./workspaces".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from config.toml with environment variable overrides.
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        let mut config = if Path::new(config_path).exists() {
            let content =
                std::fs::read_to_string(config_path).context("Failed to read config.toml")?;
            toml::from_str::<Config>(&content).context("Failed to parse config.toml")?
        } else {
            Config {
                http: HttpConfig::default(),
                session_runtime: SessionRuntimeConfig {
                    image_name: default_image_name(),
                    base_path: default_base_path(),
                    nvim_config_path: None,
                    ws: Default::default(),
                },
                log_file_path: None,
                env: default_env(),
            }
        };

        if let Ok(val) = std::env::var("GATEWAY_HTTP_HOST") {
            config.http.host = val;
        }
        if let Ok(val) = std::env::var("GATEWAY_HTTP_PORT") {
            config.http.port = val
                .parse()
                .with_context(|| format!("GATEWAY_HTTP_PORT must be a valid port, got: {val}"))?;
        }
        if let Ok(val) = std::env::var("GATEWAY_IMAGE_NAME") {
            config.session_runtime.image_name = val;
        }
        if let Ok(val) = std::env::var("GATEWAY_BASE_PATH") {
            config.session_runtime.base_path = val;
        }
        if let Ok(val) = std::env::var("GATEWAY_NVIM_CONFIG_PATH") {
            config.session_runtime.nvim_config_path = Some(val);
        }
        if let Ok(val) = std::env::var("GATEWAY_LOG_FILE_PATH") {
            config.log_file_path = Some(val);
        }
        if let Ok(val) = std::env::var("GATEWAY_ENV") {
            config.env = val;
        }

        if config.session_runtime.image_name.trim().is_empty() {
            anyhow::bail!(
                "session_runtime.image_name is required (set in config.toml or GATEWAY_IMAGE_NAME env var)"
            );
        }
        if config.session_runtime.base_path.trim().is_empty() {
            anyhow::bail!(
                "session_runtime.base_path is required (set in config.toml or GATEWAY_BASE_PATH env var)"
            );
        }
        config
            .session_runtime
            .ws
            .validate()
            .map_err(|e| anyhow::anyhow!(e))?;

        Ok(config)
    }
}
