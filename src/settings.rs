use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, ensure};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::cli::{Cli, LogFormat};

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8888))
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_log_dir() -> Option<PathBuf> {
    Some(PathBuf::from("logs"))
}

fn default_client_timeout() -> u64 {
    5
}

fn default_upstream_connect_timeout() -> u64 {
    10
}

fn default_upstream_timeout() -> u64 {
    10
}

fn default_max_request_header_size() -> usize {
    64 * 1024
}

fn default_max_request_body_size() -> usize {
    64 * 1024 * 1024
}

fn default_max_response_size() -> usize {
    64 * 1024 * 1024
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_cache_ttl() -> u64 {
    86_400
}

fn default_cache_max_entry_size() -> u64 {
    10 * 1024 * 1024 // 10 MiB
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_log_format")]
    pub log: LogFormat,
    /// Directory receiving one log file per run. An empty path disables the file sink.
    #[serde(default = "default_log_dir")]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_client_timeout")]
    pub client_timeout: u64,
    #[serde(default = "default_upstream_connect_timeout")]
    pub upstream_connect_timeout: u64,
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: u64,
    #[serde(default = "default_max_request_header_size")]
    pub max_request_header_size: usize,
    #[serde(default = "default_max_request_body_size")]
    pub max_request_body_size: usize,
    /// Origin responses above this size are refused instead of buffered.
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    #[serde(default = "default_cache_max_entry_size")]
    pub cache_max_entry_size: u64,
    #[serde(default)]
    pub metrics_listen: Option<SocketAddr>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log: default_log_format(),
            log_dir: default_log_dir(),
            client_timeout: default_client_timeout(),
            upstream_connect_timeout: default_upstream_connect_timeout(),
            upstream_timeout: default_upstream_timeout(),
            max_request_header_size: default_max_request_header_size(),
            max_request_body_size: default_max_request_body_size(),
            max_response_size: default_max_response_size(),
            cache_dir: default_cache_dir(),
            cache_ttl: default_cache_ttl(),
            cache_max_entry_size: default_cache_max_entry_size(),
            metrics_listen: None,
        }
    }
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = Config::builder();
        let config_path = resolve_config_path(cli);

        if let Some(path) = &config_path {
            builder = builder.add_source(File::from(path.clone()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("CACHEPROXY")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().map_err(to_anyhow)?;
        let mut settings: Settings = cfg.try_deserialize().map_err(to_anyhow)?;
        if let Some(path) = &config_path {
            settings.apply_base_dir(path);
        }
        settings.apply_cli(cli);
        settings.validate()?;
        Ok(settings)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout)
    }

    pub fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_timeout)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = cli.host {
            self.listen.set_ip(host);
        }
        if let Some(port) = cli.port {
            self.listen.set_port(port);
        }
        if let Some(log) = cli.log {
            self.log = log;
        }
        if self
            .log_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            self.log_dir = None;
        }
    }

    fn apply_base_dir(&mut self, config_path: &Path) {
        let base_dir = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        self.cache_dir = absolutize(&self.cache_dir, base_dir);
        self.log_dir = self
            .log_dir
            .as_ref()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| absolutize(dir, base_dir));
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.client_timeout > 0,
            "client_timeout must be greater than 0 seconds (got {})",
            self.client_timeout
        );
        ensure!(
            self.upstream_connect_timeout > 0,
            "upstream_connect_timeout must be greater than 0 seconds (got {})",
            self.upstream_connect_timeout
        );
        ensure!(
            self.upstream_timeout > 0,
            "upstream_timeout must be greater than 0 seconds (got {})",
            self.upstream_timeout
        );
        ensure!(
            self.max_request_header_size > 0,
            "max_request_header_size must be greater than 0 (got {})",
            self.max_request_header_size
        );
        ensure!(
            self.max_request_body_size > 0,
            "max_request_body_size must be greater than 0 (got {})",
            self.max_request_body_size
        );
        ensure!(
            self.max_response_size > 0,
            "max_response_size must be greater than 0 (got {})",
            self.max_response_size
        );
        ensure!(
            self.cache_ttl > 0,
            "cache_ttl must be greater than 0 seconds (got {})",
            self.cache_ttl
        );
        ensure!(
            self.cache_max_entry_size > 0,
            "cache_max_entry_size must be greater than 0 (got {})",
            self.cache_max_entry_size
        );
        ensure!(
            !self.cache_dir.as_os_str().is_empty(),
            "cache_dir must not be empty"
        );
        Ok(())
    }
}

fn to_anyhow(err: ConfigError) -> anyhow::Error {
    anyhow::anyhow!(err)
}

impl Cli {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

fn resolve_config_path(cli: &Cli) -> Option<PathBuf> {
    if let Some(path) = cli.config_path() {
        return Some(path.to_path_buf());
    }

    default_config_candidates()
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn default_config_candidates() -> [PathBuf; 2] {
    [
        PathBuf::from("/etc/cacheproxy/cacheproxy.toml"),
        PathBuf::from("cacheproxy.toml"),
    ]
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
