use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use http::Method;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
    time::{Instant, timeout_at},
};

use crate::io_util::write_all_with_timeout;
use crate::proxy::http::{RequestHead, RequestLimits, parse_head};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static REQUEST_METHOD_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("requests_method_total", "Requests by method");
    let vec = IntCounterVec::new(opts, &["method"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register requests_method_total");
    vec
});

static REQUEST_STATUS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("requests_status_total", "Requests by status class");
    let vec = IntCounterVec::new(opts, &["status_class"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register requests_status_total");
    vec
});

static REQUEST_LATENCY_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    let opts = HistogramOpts::new("request_duration_seconds", "Request latency")
        .buckets(latency_buckets());
    let histogram = Histogram::with_opts(opts).expect("create histogram");
    REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("register request_duration_seconds");
    histogram
});

static INFLIGHT_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new("inflight_connections", "Client connections being handled")
        .expect("create gauge");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("register inflight_connections");
    gauge
});

static CACHE_LOOKUP_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("cache_lookup_total", "HTTP cache lookups by result");
    let vec = IntCounterVec::new(opts, &["result"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register cache_lookup_total");
    vec
});

static CACHE_STORE_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("cache_store_total", "HTTP cache store calls")
        .expect("create cache_store_total");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_store_total");
    counter
});

static CACHE_STORE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("cache_store_errors_total", "HTTP cache store errors")
        .expect("create cache_store_errors_total");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_store_errors_total");
    counter
});

static CACHE_EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("cache_evictions_total", "Expired cache entries evicted")
        .expect("create counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_evictions_total");
    counter
});

static UPSTREAM_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let vec = IntCounterVec::new(
        Opts::new("upstream_errors_total", "Upstream errors by kind"),
        &["kind"],
    )
    .expect("create upstream_errors_total");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register upstream_errors_total");
    vec
});

fn latency_buckets() -> Vec<f64> {
    vec![
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ]
}

const METRICS_PATH: &str = "/metrics";
const SCRAPE_MAX_HEAD_BYTES: usize = 8192;
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(5);

fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

pub fn inc_inflight() {
    INFLIGHT_CONNECTIONS.inc();
}

pub fn dec_inflight() {
    INFLIGHT_CONNECTIONS.dec();
}

pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    let method = if method.is_empty() { "unknown" } else { method };
    REQUEST_METHOD_TOTAL.with_label_values(&[method]).inc();
    REQUEST_STATUS_TOTAL
        .with_label_values(&[status_class(status)])
        .inc();
    REQUEST_LATENCY_SECONDS.observe(elapsed.as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    let label = if hit { "hit" } else { "miss" };
    CACHE_LOOKUP_TOTAL.with_label_values(&[label]).inc();
}

pub fn record_cache_store() {
    CACHE_STORE_TOTAL.inc();
}

pub fn record_cache_store_error() {
    CACHE_STORE_ERRORS_TOTAL.inc();
}

pub fn record_cache_eviction() {
    CACHE_EVICTIONS_TOTAL.inc();
}

pub fn record_upstream_error(kind: &str) {
    UPSTREAM_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn gather() -> Vec<u8> {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("encode metrics");
    buffer
}

pub async fn serve(addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(err) = handle_scrape(stream, SCRAPE_TIMEOUT, SCRAPE_MAX_HEAD_BYTES).await {
                tracing::debug!(error = %err, "metrics handler error");
            }
        });
    }
}

/// Answers one scrape. Only `GET /metrics` is served; the request may not
/// carry a body and its head must fit in `max_head_bytes`.
async fn handle_scrape<S>(mut stream: S, budget: Duration, max_head_bytes: usize) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let limits = RequestLimits {
        max_header_bytes: max_head_bytes,
        max_body_bytes: 0,
    };
    let Some(head) = read_scrape_head(&mut stream, budget, &limits).await? else {
        return Ok(());
    };

    let response = if head.method == Method::GET && head.target == METRICS_PATH {
        build_response(200, TextEncoder::new().format_type(), gather())
    } else {
        build_response(404, "text/plain", b"not found".to_vec())
    };

    write_all_with_timeout(&mut stream, &response, budget, "writing metrics response").await?;
    stream.shutdown().await?;
    Ok(())
}

/// `None` when the peer hung up before sending anything.
async fn read_scrape_head<S>(
    stream: &mut S,
    budget: Duration,
    limits: &RequestLimits,
) -> Result<Option<RequestHead>>
where
    S: AsyncRead + Unpin,
{
    let deadline = Instant::now() + budget;
    let mut buf = Vec::with_capacity(512);
    loop {
        let mut chunk = [0u8; 512];
        let read = timeout_at(deadline, stream.read(&mut chunk))
            .await
            .map_err(|_| anyhow!("timed out reading metrics request"))??;
        if read == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            bail!("connection closed while reading metrics request");
        }
        buf.extend_from_slice(&chunk[..read]);
        if let Some(head) = parse_head(&buf, limits)? {
            return Ok(Some(head));
        }
    }
}

fn build_response(status: u16, content_type: &str, body: Vec<u8>) -> Vec<u8> {
    let header = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nContent-Type: {content_type}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let mut response = header.into_bytes();
    response.extend_from_slice(&body);
    response
}
