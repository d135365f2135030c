pub mod cli;
pub mod io_util;
pub mod logging;
pub mod metrics;
pub mod proxy;
pub mod settings;
pub mod util;

use std::sync::Arc;

use anyhow::Result;

use crate::settings::Settings;

pub async fn run(settings: Settings) -> Result<()> {
    let settings = Arc::new(settings);
    if let Some(addr) = settings.metrics_listen {
        tokio::spawn(async move {
            tracing::info!(address = %addr, "metrics endpoint starting");
            if let Err(err) = crate::metrics::serve(addr).await {
                tracing::error!(error = %err, "metrics endpoint failed");
            }
        });
    }

    let cache = Arc::new(
        proxy::cache::HttpCache::new(
            settings.cache_dir.clone(),
            settings.cache_ttl(),
            settings.cache_max_entry_size,
        )
        .await?,
    );

    let app = proxy::AppContext::new(settings, cache);
    proxy::run(app).await
}
