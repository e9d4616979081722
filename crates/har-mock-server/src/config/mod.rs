//! Configuration types for the HAR mock server.

mod listen;
mod upstream;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use listen::{ListenConfig, MetricsConfig};
pub use upstream::{ConnectionPoolConfig, UpstreamConfig};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,

    /// Base URL of the real API that unmatched requests are forwarded to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Directory holding the `*.har` capture files. Defaults to the working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hars_folder: Option<PathBuf>,

    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.api_url()?;
        self.listen.socket_addr()?;

        if self.metrics.enabled && self.metrics.port == self.listen.port {
            anyhow::bail!(
                "Metrics port {} conflicts with the listen port",
                self.metrics.port
            );
        }

        Ok(())
    }

    /// Upstream base URL without a trailing slash.
    pub fn api_url(&self) -> Result<String, anyhow::Error> {
        let raw = self
            .api_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("An upstream API URL is required (--api-url or 'api_url')")
            })?;

        let uri: hyper::Uri = raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid API URL '{raw}': {e}"))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => anyhow::bail!("API URL '{raw}' must be an absolute http:// or https:// URL"),
        }
        if uri.authority().is_none() {
            anyhow::bail!("API URL '{raw}' has no host");
        }
        if uri.query().is_some() {
            anyhow::bail!("API URL '{raw}' must not contain a query string");
        }

        Ok(raw.trim_end_matches('/').to_string())
    }

    /// Capture directory, resolved against `base` when relative.
    pub fn hars_folder_in(&self, base: &Path) -> PathBuf {
        match &self.hars_folder {
            Some(folder) if folder.is_absolute() => folder.clone(),
            Some(folder) => base.join(folder),
            None => base.to_path_buf(),
        }
    }

    /// Capture directory, resolved against the working directory when relative.
    pub fn hars_folder(&self) -> Result<PathBuf, anyhow::Error> {
        let cwd = std::env::current_dir()?;
        Ok(self.hars_folder_in(&cwd))
    }
}
