use std::io;
use std::net::SocketAddr;

use http::StatusCode;
use thiserror::Error;
use tracing::warn;

/// Failure to read a complete request from the client. Every variant drops the
/// connection without a response except `Parse`, which is answered.
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("timed out waiting for a complete request")]
    Timeout,
    #[error("client closed the connection before the request was complete")]
    Closed,
    #[error("failed reading from client")]
    Io(#[from] io::Error),
    #[error("rejected request after {received} bytes")]
    Parse {
        #[source]
        source: ParseError,
        received: usize,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed request line '{0}'")]
    MalformedRequestLine(String),
    #[error("invalid method '{0}'")]
    InvalidMethod(String),
    #[error("request head is not valid UTF-8")]
    InvalidEncoding,
    #[error("invalid Content-Length '{0}'")]
    InvalidContentLength(String),
    #[error("request headers exceed limit of {limit} bytes")]
    HeadersTooLarge { limit: usize },
    #[error("request body of {declared} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { declared: usize, limit: usize },
}

impl ParseError {
    /// Status sent to the client when the request cannot be accepted.
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::HeadersTooLarge { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            ParseError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ParseError::MalformedRequestLine(_) => "malformed_request_line",
            ParseError::InvalidMethod(_) => "invalid_method",
            ParseError::InvalidEncoding => "invalid_encoding",
            ParseError::InvalidContentLength(_) => "invalid_content_length",
            ParseError::HeadersTooLarge { .. } => "headers_too_large",
            ParseError::BodyTooLarge { .. } => "body_too_large",
        }
    }
}

/// Failure to obtain a complete response from the origin. No partial response
/// is ever returned alongside one of these.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid target url '{0}'")]
    InvalidTarget(String),
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("failed to connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out connecting to {addr}")]
    ConnectTimeout { addr: String },
    #[error("timed out sending request to {addr}")]
    WriteTimeout { addr: String },
    #[error("timed out reading response from {addr}")]
    ReadTimeout { addr: String },
    #[error("response from {addr} exceeds limit of {limit} bytes")]
    ResponseTooLarge { addr: String, limit: usize },
    #[error("i/o error talking to {addr}")]
    Io {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("{addr} closed the connection without responding")]
    EmptyResponse { addr: String },
}

impl ForwardError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::InvalidTarget(_) => "invalid_target",
            ForwardError::UnsupportedScheme(_) => "unsupported_scheme",
            ForwardError::Connect { .. } => "connect",
            ForwardError::ConnectTimeout { .. } => "connect_timeout",
            ForwardError::WriteTimeout { .. } => "write_timeout",
            ForwardError::ReadTimeout { .. } => "read_timeout",
            ForwardError::ResponseTooLarge { .. } => "response_too_large",
            ForwardError::Io { .. } => "io",
            ForwardError::EmptyResponse { .. } => "empty_response",
        }
    }

    pub fn upstream_addr(&self) -> Option<&str> {
        match self {
            ForwardError::InvalidTarget(_) | ForwardError::UnsupportedScheme(_) => None,
            ForwardError::Connect { addr, .. }
            | ForwardError::ConnectTimeout { addr }
            | ForwardError::WriteTimeout { addr }
            | ForwardError::ReadTimeout { addr }
            | ForwardError::ResponseTooLarge { addr, .. }
            | ForwardError::Io { addr, .. }
            | ForwardError::EmptyResponse { addr } => Some(addr),
        }
    }
}

pub fn log_forward_error(err: &ForwardError, peer: SocketAddr, url: &str) {
    crate::metrics::record_upstream_error(err.kind());
    warn!(
        peer = %peer,
        url,
        kind = err.kind(),
        error = %error_chain(err),
        "upstream request failed"
    );
}

/// Renders an error with its source chain, `a: b: c`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
