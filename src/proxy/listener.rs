use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use super::{AppContext, http};

pub async fn start_listener(app: AppContext) -> Result<()> {
    let bind_addr = app.settings.listen;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", bind_addr))?;
    serve(listener, app).await
}

/// Accept loop. Each connection gets its own task and the loop never waits on
/// one; accept failures are logged and skipped.
pub async fn serve(listener: TcpListener, app: AppContext) -> Result<()> {
    let local_addr = listener.local_addr().unwrap_or(app.settings.listen);
    info!(
        address = %local_addr,
        cache_dir = %app.cache.disk_dir().display(),
        "proxy listener started"
    );

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                error!(error = %err, "failed to accept incoming connection");
                continue;
            }
        };
        debug!(peer = %peer_addr, "accepted connection");
        if let Err(err) = stream.set_nodelay(true) {
            debug!(peer = %peer_addr, error = %err, "failed to set TCP_NODELAY on downstream stream");
        }
        let connection_app = app.clone();
        tokio::spawn(async move {
            http::handle_http(stream, peer_addr, connection_app).await;
            debug!(peer = %peer_addr, "connection closed");
        });
    }
}
