use std::fs::{self, File};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use http::StatusCode;
use time::OffsetDateTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::LogFormat;

const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber: stdout in the requested format, plus a
/// per-run file under `log_dir` when one is configured.
pub fn init_logger(format: LogFormat, log_dir: Option<&Path>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stdout_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        LogFormat::Text => fmt::layer().with_target(false).compact().boxed(),
    };

    let file_layer = match log_dir {
        Some(dir) => {
            let path = run_log_path(dir, OffsetDateTime::now_utc());
            let file = open_log_file(&path)?;
            let layer = match format {
                LogFormat::Json => fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(Mutex::new(file))
                    .boxed(),
                LogFormat::Text => fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .boxed(),
            };
            Some(layer)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    if let Some(dir) = log_dir {
        tracing::debug!(dir = %dir.display(), "file logging enabled");
    }
    Ok(())
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

/// `<dir>/proxy_YYYYmmdd_HHMMSS.log`, one file per process start.
pub fn run_log_path(dir: &Path, started: OffsetDateTime) -> PathBuf {
    let (year, month, day) = started.to_calendar_date();
    let (hour, minute, second) = started.to_hms();
    let month_number: u8 = month.into();
    dir.join(format!(
        "proxy_{year:04}{month_number:02}{day:02}_{hour:02}{minute:02}{second:02}.log"
    ))
}

#[derive(Debug, Clone)]
pub struct AccessLogEvent {
    pub client_ip: IpAddr,
    pub client_port: u16,
    pub method: String,
    pub url: String,
    pub cache_lookup: Option<String>,
    pub cache_store: Option<String>,
    pub status: u16,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub elapsed_ms: u128,
    pub upstream_addr: Option<String>,
    pub error_reason: Option<String>,
    pub error_detail: Option<String>,
}

#[derive(Debug)]
pub struct AccessLogBuilder {
    event: AccessLogEvent,
}

impl AccessLogBuilder {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            event: AccessLogEvent {
                client_ip: peer.ip(),
                client_port: peer.port(),
                method: String::new(),
                url: String::new(),
                cache_lookup: None,
                cache_store: None,
                status: 0,
                bytes_in: 0,
                bytes_out: 0,
                elapsed_ms: 0,
                upstream_addr: None,
                error_reason: None,
                error_detail: None,
            },
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.event.method = method.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.event.url = url.into();
        self
    }

    pub fn cache_lookup(mut self, value: impl Into<String>) -> Self {
        self.event.cache_lookup = Some(value.into());
        self
    }

    pub fn cache_store(mut self, value: impl Into<String>) -> Self {
        self.event.cache_store = Some(value.into());
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.event.status = status.as_u16();
        self
    }

    pub fn status_code(mut self, status: u16) -> Self {
        self.event.status = status;
        self
    }

    pub fn bytes(mut self, in_bytes: u64, out_bytes: u64) -> Self {
        self.event.bytes_in = in_bytes;
        self.event.bytes_out = out_bytes;
        self
    }

    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.event.elapsed_ms = elapsed.as_millis();
        self
    }

    pub fn upstream_addr(mut self, addr: impl Into<String>) -> Self {
        self.event.upstream_addr = Some(addr.into());
        self
    }

    pub fn error_reason(mut self, reason: impl Into<String>) -> Self {
        self.event.error_reason = Some(reason.into());
        self
    }

    pub fn error_detail(mut self, detail: impl Into<String>) -> Self {
        self.event.error_detail = Some(detail.into());
        self
    }

    pub fn build(self) -> AccessLogEvent {
        self.event
    }

    pub fn log(self) {
        log_access(self.build());
    }
}

pub fn log_access(event: AccessLogEvent) {
    let AccessLogEvent {
        client_ip,
        client_port,
        method,
        url,
        cache_lookup,
        cache_store,
        status,
        bytes_in,
        bytes_out,
        elapsed_ms,
        upstream_addr,
        error_reason,
        error_detail,
    } = event;

    let now = OffsetDateTime::now_utc();
    let (year, month, day) = now.to_calendar_date();
    let (hour, minute, second) = now.to_hms();
    let millisecond = now.millisecond();
    let month_number: u8 = month.into();
    let ts = format!(
        "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{millisecond:03}Z",
        month = month_number
    );

    tracing::info!(
        target = "access_log",
        ts,
        client_ip = %client_ip,
        method,
        url,
        cache_lookup = cache_lookup.as_deref(),
        cache_store = cache_store.as_deref(),
        status,
        bytes_in,
        bytes_out,
        elapsed_ms,
        client_port,
        upstream_addr = upstream_addr.as_deref(),
        error_reason = error_reason.as_deref(),
        error_detail = error_detail.as_deref()
    );

    crate::metrics::record_request(
        &method,
        status,
        Duration::from_millis(elapsed_ms as u64),
    );
}
