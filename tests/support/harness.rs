use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use cacheproxy::{
    cli::LogFormat,
    proxy::{self, AppContext, cache::HttpCache},
    settings::Settings,
};

use super::net::{find_free_port, wait_for_listener};

fn default_test_settings(listen: SocketAddr, cache_dir: PathBuf) -> Settings {
    Settings {
        listen,
        log: LogFormat::Text,
        log_dir: None,
        client_timeout: 1,
        upstream_connect_timeout: 2,
        upstream_timeout: 2,
        max_request_header_size: 32 * 1024,
        max_request_body_size: 1024 * 1024,
        max_response_size: 16 * 1024 * 1024,
        cache_dir,
        cache_ttl: 86_400,
        cache_max_entry_size: 10 * 1024 * 1024,
        metrics_listen: None,
    }
}

pub struct ProxyHarness {
    pub addr: SocketAddr,
    pub settings: Arc<Settings>,
    pub cache: Arc<HttpCache>,
    cache_root: Arc<TempDir>,
    handle: JoinHandle<()>,
}

impl ProxyHarness {
    pub fn cache_dir(&self) -> &Path {
        &self.settings.cache_dir
    }

    /// Stops the proxy, handing back its cache directory for a restart.
    pub async fn shutdown(self) -> Arc<TempDir> {
        self.handle.abort();
        let _ = self.handle.await;
        self.cache_root
    }
}

pub struct ProxyHarnessBuilder {
    cache_root: Option<Arc<TempDir>>,
    settings_override: Option<Box<dyn FnOnce(&mut Settings) + Send>>,
}

impl ProxyHarnessBuilder {
    pub fn new() -> Self {
        Self {
            cache_root: None,
            settings_override: None,
        }
    }

    /// Reuses an existing cache directory, e.g. one left by an earlier harness.
    pub fn with_cache_root(mut self, cache_root: Arc<TempDir>) -> Self {
        self.cache_root = Some(cache_root);
        self
    }

    pub fn with_settings<F>(mut self, func: F) -> Self
    where
        F: FnOnce(&mut Settings) + Send + 'static,
    {
        self.settings_override = Some(Box::new(func));
        self
    }

    pub async fn spawn(mut self) -> Result<ProxyHarness> {
        let cache_root = match self.cache_root.take() {
            Some(root) => root,
            None => Arc::new(TempDir::new()?),
        };

        let proxy_port = find_free_port()?;
        let proxy_addr = SocketAddr::from(([127, 0, 0, 1], proxy_port));

        let mut settings = default_test_settings(proxy_addr, cache_root.path().join("cache"));
        if let Some(override_fn) = self.settings_override.take() {
            override_fn(&mut settings);
        }
        let proxy_addr = settings.listen;
        let settings = Arc::new(settings);

        let cache = Arc::new(
            HttpCache::new(
                settings.cache_dir.clone(),
                settings.cache_ttl(),
                settings.cache_max_entry_size,
            )
            .await?,
        );
        let app = AppContext::new(settings.clone(), cache.clone());

        let handle = tokio::spawn(async move {
            if let Err(err) = proxy::run(app).await {
                tracing::error!(error = ?err, "proxy run failed");
            }
        });

        wait_for_listener(proxy_addr).await?;

        Ok(ProxyHarness {
            addr: proxy_addr,
            settings,
            cache,
            cache_root,
            handle,
        })
    }
}

impl Default for ProxyHarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
