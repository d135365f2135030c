use std::net::SocketAddr;
use std::time::{Duration, Instant};

use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::io_util::write_all_with_timeout;
use crate::logging::AccessLogBuilder;
use crate::proxy::AppContext;
use crate::proxy::error::{ReceiveError, error_chain, log_forward_error};
use crate::proxy::request::ParsedRequest;
use crate::util::timeout_with_context;

use super::codec::{RequestLimits, error_response, read_request, response_status};

pub async fn handle_http(stream: TcpStream, peer: SocketAddr, app: AppContext) {
    serve_connection(stream, peer, &app).await
}

/// Runs one client connection from first byte to close. Nothing escapes this
/// function: every failure ends as a dropped connection or an error response.
pub async fn serve_connection<S>(mut stream: S, peer: SocketAddr, app: &AppContext)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _inflight = InflightGuard::new();
    let start = Instant::now();
    let io_timeout = app.settings.client_timeout();

    let log = process_request(&mut stream, peer, app).await;

    if let Err(err) =
        timeout_with_context(io_timeout, stream.shutdown(), "shutting down client stream").await
    {
        debug!(peer = %peer, error = format!("{err:#}"), "client shutdown failed");
    }
    drop(stream);

    if let Some(log) = log {
        log.elapsed(start.elapsed()).log();
    }
}

/// Returns the access-log record for the request, or `None` when the
/// connection was dropped before a request could be identified.
async fn process_request<S>(
    stream: &mut S,
    peer: SocketAddr,
    app: &AppContext,
) -> Option<AccessLogBuilder>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let settings = &app.settings;
    let limits = RequestLimits::from_settings(settings);
    let io_timeout = settings.client_timeout();

    let (request, bytes_in) = match read_request(stream, io_timeout, &limits).await {
        Ok(received) => received,
        Err(ReceiveError::Parse { source: err, received }) => {
            warn!(peer = %peer, error = %err, "rejecting malformed request");
            let status = err.status();
            let bytes_out = send_bytes(stream, &error_response(status), io_timeout, peer).await;
            return Some(
                AccessLogBuilder::new(peer)
                    .status(status)
                    .bytes(received as u64, bytes_out)
                    .error_reason(err.reason())
                    .error_detail(err.to_string()),
            );
        }
        Err(err) => {
            debug!(peer = %peer, error = %error_chain(&err), "dropping connection without a request");
            return None;
        }
    };
    let bytes_in = bytes_in as u64;
    info!(
        peer = %peer,
        method = %request.method,
        url = %request.target_url,
        "received request"
    );

    let log = AccessLogBuilder::new(peer)
        .method(request.method.as_str())
        .url(request.target_url.clone());

    let log = if request.is_cacheable() {
        match app.cache.lookup(&request.target_url).await {
            Ok(Some(hit)) => {
                info!(peer = %peer, url = %request.target_url, "serving from cache");
                let bytes_out = send_bytes(stream, &hit.body, io_timeout, peer).await;
                return Some(
                    log.cache_lookup("hit")
                        .status_code(response_status(&hit.body).unwrap_or_default())
                        .bytes(bytes_in, bytes_out),
                );
            }
            Ok(None) => log.cache_lookup("miss"),
            Err(err) => {
                warn!(
                    url = %request.target_url,
                    error = format!("{err:#}"),
                    "cache lookup failed; forwarding"
                );
                log.cache_lookup("miss")
            }
        }
    } else {
        log.cache_lookup("bypass")
    };

    Some(forward_and_respond(stream, peer, app, &request, bytes_in, log).await)
}

async fn forward_and_respond<S>(
    stream: &mut S,
    peer: SocketAddr,
    app: &AppContext,
    request: &ParsedRequest,
    bytes_in: u64,
    log: AccessLogBuilder,
) -> AccessLogBuilder
where
    S: AsyncWrite + Unpin,
{
    let io_timeout = app.settings.client_timeout();
    let response = match app.forwarder.forward(request).await {
        Ok(response) => response,
        Err(err) => {
            log_forward_error(&err, peer, &request.target_url);
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            let bytes_out = send_bytes(stream, &error_response(status), io_timeout, peer).await;
            let log = match err.upstream_addr() {
                Some(addr) => log.upstream_addr(addr),
                None => log,
            };
            return log
                .status(status)
                .bytes(bytes_in, bytes_out)
                .error_reason(err.kind())
                .error_detail(error_chain(&err));
        }
    };

    let mut log = log.upstream_addr(response.upstream_addr.clone());
    if request.is_cacheable() {
        let stored = app
            .cache
            .store(
                request.target_url.clone(),
                request.headers.to_map(),
                response.bytes.clone(),
            )
            .await;
        log = match stored {
            Ok(outcome) => log.cache_store(outcome.as_str()),
            Err(err) => {
                warn!(
                    url = %request.target_url,
                    error = format!("{err:#}"),
                    "failed to store response in cache"
                );
                log.cache_store("error")
            }
        };
    }

    let bytes_out = send_bytes(stream, &response.bytes, io_timeout, peer).await;
    info!(peer = %peer, url = %request.target_url, bytes = bytes_out, "sent response");
    log.status_code(response_status(&response.bytes).unwrap_or_default())
        .bytes(bytes_in, bytes_out)
}

/// Writes a full response. Failures mean the client went away and are only
/// logged; the returned count is zero in that case.
async fn send_bytes<S>(stream: &mut S, bytes: &[u8], io_timeout: Duration, peer: SocketAddr) -> u64
where
    S: AsyncWrite + Unpin,
{
    let written: anyhow::Result<()> = async {
        write_all_with_timeout(stream, bytes, io_timeout, "writing response to client").await?;
        timeout_with_context(io_timeout, stream.flush(), "flushing client stream").await
    }
    .await;
    match written {
        Ok(()) => bytes.len() as u64,
        Err(err) => {
            debug!(peer = %peer, error = format!("{err:#}"), "client write failed");
            0
        }
    }
}

struct InflightGuard;

impl InflightGuard {
    fn new() -> Self {
        crate::metrics::inc_inflight();
        Self
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        crate::metrics::dec_inflight();
    }
}
