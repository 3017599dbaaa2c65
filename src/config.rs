use serde::Deserialize;
use std::fs;
use std::env;
use std::net::SocketAddr;
use anyhow::{bail, Context, Result};
use axum::http::{HeaderName, HeaderValue};

use crate::prompt::DEFAULT_SYSTEM_PROMPT;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub limits: LimitsConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub allowed_origin: String,
    pub client_ip_header: String,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub model: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub requests_per_window: u32,
    pub window_ms: u64,
    pub max_history: usize,
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enable: bool,
    pub bind_addr: String,
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8787".to_string(),
            allowed_origin: "https://gabsyfy.co.uk".to_string(),
            client_ip_header: "cf-connecting-ip".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_version: "2023-06-01".to_string(),
            max_tokens: 300,
            timeout_ms: 30_000,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 10,
            window_ms: 60_000,
            max_history: 10,
            sweep_interval_ms: 60_000,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable: false,
            bind_addr: "127.0.0.1:9187".to_string(),
            path: "/metrics".to_string(),
        }
    }
}

impl Config {
    /// Rejects values the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid server bind address: {}", self.server.bind_addr))?;
        HeaderValue::from_str(&self.server.allowed_origin)
            .with_context(|| format!("Invalid allowed origin: {}", self.server.allowed_origin))?;
        HeaderName::from_bytes(self.server.client_ip_header.as_bytes())
            .with_context(|| format!("Invalid client IP header: {}", self.server.client_ip_header))?;

        if self.limits.requests_per_window == 0 {
            bail!("limits.requests_per_window must be greater than zero");
        }
        if self.limits.window_ms == 0 {
            bail!("limits.window_ms must be greater than zero");
        }
        if self.limits.max_history == 0 {
            bail!("limits.max_history must be greater than zero");
        }
        if self.limits.sweep_interval_ms == 0 {
            bail!("limits.sweep_interval_ms must be greater than zero");
        }
        if self.upstream.max_tokens == 0 {
            bail!("upstream.max_tokens must be greater than zero");
        }
        if self.metrics.enable {
            self.metrics
                .bind_addr
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid metrics bind address: {}", self.metrics.bind_addr))?;
        }
        Ok(())
    }

    /// Reads the upstream API key from the environment variable named in the config.
    pub fn api_key(&self) -> Result<String> {
        let name = &self.upstream.api_key_env;
        let key = env::var(name)
            .with_context(|| format!("Missing upstream API key: set {}", name))?;
        if key.trim().is_empty() {
            bail!("Upstream API key in {} is empty", name);
        }
        Ok(key)
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .with_context(|| "Failed to parse configuration")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config() -> Result<Config> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

    let config_content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path))?;

    parse_config(&config_content)
}
