use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::Uri;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::proxy::error::ForwardError;
use crate::proxy::request::ParsedRequest;
use crate::settings::Settings;

const DEFAULT_PORT: u16 = 80;
const READ_CHUNK: usize = 8192;

/// Headers never copied from the client; the proxy writes its own.
const SKIPPED_HEADERS: [&str; 3] = ["host", "proxy-connection", "connection"];

/// Complete origin response, exactly as received.
#[derive(Debug, Clone)]
pub struct ForwardResponse {
    pub upstream_addr: String,
    pub bytes: Bytes,
}

/// Replays requests to the origin over a fresh connection each time.
#[derive(Debug, Clone)]
pub struct Forwarder {
    connect_timeout: Duration,
    read_timeout: Duration,
    max_response_bytes: usize,
}

/// Where a target URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginTarget {
    pub host: String,
    pub port: u16,
    /// Value sent as `Host`.
    pub authority: String,
    pub path: String,
}

impl OriginTarget {
    pub fn parse(url: &str) -> Result<Self, ForwardError> {
        let uri: Uri = url
            .parse()
            .map_err(|_| ForwardError::InvalidTarget(url.to_string()))?;
        match uri.scheme_str() {
            Some(scheme) if scheme.eq_ignore_ascii_case("http") => {}
            Some(other) => return Err(ForwardError::UnsupportedScheme(other.to_string())),
            None => return Err(ForwardError::InvalidTarget(url.to_string())),
        }
        let authority = uri
            .authority()
            .ok_or_else(|| ForwardError::InvalidTarget(url.to_string()))?;
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        if host.is_empty() {
            return Err(ForwardError::InvalidTarget(url.to_string()));
        }
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/");
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Ok(Self {
            host,
            port: authority.port_u16().unwrap_or(DEFAULT_PORT),
            authority: authority.as_str().to_string(),
            path,
        })
    }

    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Forwarder {
    pub fn new(connect_timeout: Duration, read_timeout: Duration, max_response_bytes: usize) -> Self {
        Self {
            connect_timeout,
            read_timeout,
            max_response_bytes,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.upstream_connect_timeout(),
            settings.upstream_timeout(),
            settings.max_response_size,
        )
    }

    /// Sends `request` to its origin and reads the response until the origin
    /// closes the connection.
    pub async fn forward(&self, request: &ParsedRequest) -> Result<ForwardResponse, ForwardError> {
        let target = OriginTarget::parse(&request.target_url)?;
        let addr = target.addr();
        debug!(url = %request.target_url, upstream = %addr, "forwarding request");

        let mut stream = match timeout(
            self.connect_timeout,
            TcpStream::connect((target.host.as_str(), target.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ForwardError::Connect { addr, source }),
            Err(_) => return Err(ForwardError::ConnectTimeout { addr }),
        };
        if let Err(err) = stream.set_nodelay(true) {
            debug!(upstream = %addr, error = %err, "failed to set TCP_NODELAY on upstream stream");
        }

        let head = build_upstream_request(request, &target);
        self.write(&mut stream, &head, &addr).await?;
        if !request.body.is_empty() {
            self.write(&mut stream, &request.body, &addr).await?;
        }

        let bytes = self.read_to_close(&mut stream, &addr).await?;
        if bytes.is_empty() {
            return Err(ForwardError::EmptyResponse { addr });
        }
        Ok(ForwardResponse {
            upstream_addr: addr,
            bytes,
        })
    }

    async fn write(
        &self,
        stream: &mut TcpStream,
        buf: &[u8],
        addr: &str,
    ) -> Result<(), ForwardError> {
        match timeout(self.read_timeout, stream.write_all(buf)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) if closed_by_origin(&source) => Err(ForwardError::EmptyResponse {
                addr: addr.to_string(),
            }),
            Ok(Err(source)) => Err(ForwardError::Io {
                addr: addr.to_string(),
                source,
            }),
            Err(_) => Err(ForwardError::WriteTimeout {
                addr: addr.to_string(),
            }),
        }
    }

    async fn read_to_close(&self, stream: &mut TcpStream, addr: &str) -> Result<Bytes, ForwardError> {
        let mut response = BytesMut::with_capacity(READ_CHUNK);
        loop {
            response.reserve(READ_CHUNK);
            match timeout(self.read_timeout, stream.read_buf(&mut response)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(_)) => {
                    if response.len() > self.max_response_bytes {
                        return Err(ForwardError::ResponseTooLarge {
                            addr: addr.to_string(),
                            limit: self.max_response_bytes,
                        });
                    }
                }
                // A reset before any byte arrived means the origin never answered.
                Ok(Err(source)) if response.is_empty() && closed_by_origin(&source) => {
                    return Err(ForwardError::EmptyResponse {
                        addr: addr.to_string(),
                    });
                }
                Ok(Err(source)) => {
                    return Err(ForwardError::Io {
                        addr: addr.to_string(),
                        source,
                    });
                }
                Err(_) => {
                    return Err(ForwardError::ReadTimeout {
                        addr: addr.to_string(),
                    });
                }
            }
        }
        Ok(response.freeze())
    }
}

fn closed_by_origin(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionAborted
    )
}

/// Request head in origin form: path-only request line, the proxy's own `Host`,
/// the client's remaining headers and `Connection: close`.
pub fn build_upstream_request(request: &ParsedRequest, target: &OriginTarget) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(256);
    buffer.extend_from_slice(request.method.as_str().as_bytes());
    buffer.extend_from_slice(b" ");
    buffer.extend_from_slice(target.path.as_bytes());
    buffer.extend_from_slice(b" HTTP/1.1\r\n");

    buffer.extend_from_slice(b"Host: ");
    buffer.extend_from_slice(target.authority.as_bytes());
    buffer.extend_from_slice(b"\r\n");

    for header in request.headers.iter() {
        if SKIPPED_HEADERS
            .iter()
            .any(|skipped| header.name.eq_ignore_ascii_case(skipped))
        {
            continue;
        }
        buffer.extend_from_slice(header.name.as_bytes());
        buffer.extend_from_slice(b": ");
        buffer.extend_from_slice(header.value.as_bytes());
        buffer.extend_from_slice(b"\r\n");
    }

    buffer.extend_from_slice(b"Connection: close\r\n\r\n");
    buffer
}
