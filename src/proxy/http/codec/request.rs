use std::time::Duration;

use bytes::Bytes;
use http::Method;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{Instant, timeout_at};

use crate::proxy::error::{ParseError, ReceiveError};
use crate::proxy::request::{ParsedRequest, normalize_target};
use crate::settings::Settings;

use super::headers::RequestHeaders;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl RequestLimits {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_header_bytes: settings.max_request_header_size,
            max_body_bytes: settings.max_request_body_size,
        }
    }
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Request line and headers, decoded once the blank line has arrived.
#[derive(Debug)]
pub struct RequestHead {
    pub method: Method,
    pub target: String,
    pub headers: RequestHeaders,
    /// Offset of the first body byte.
    pub header_len: usize,
    pub content_length: usize,
}

impl RequestHead {
    pub fn total_len(&self) -> usize {
        self.header_len + self.content_length
    }

    fn into_request(self, buf: &[u8]) -> ParsedRequest {
        let body = Bytes::copy_from_slice(&buf[self.header_len..self.total_len()]);
        let target_url = normalize_target(&self.target, self.headers.host());
        ParsedRequest {
            method: self.method,
            target_url,
            headers: self.headers,
            body,
        }
    }
}

#[derive(Debug)]
pub enum ParseStatus {
    Partial,
    Complete(ParsedRequest),
}

/// Parses everything received so far. `Partial` means more bytes are needed.
pub fn parse_request(buf: &[u8], limits: &RequestLimits) -> Result<ParseStatus, ParseError> {
    let Some(head) = parse_head(buf, limits)? else {
        return Ok(ParseStatus::Partial);
    };
    if buf.len() < head.total_len() {
        return Ok(ParseStatus::Partial);
    }
    Ok(ParseStatus::Complete(head.into_request(buf)))
}

/// Decodes the head once `\r\n\r\n` is present, enforcing both size limits.
pub fn parse_head(buf: &[u8], limits: &RequestLimits) -> Result<Option<RequestHead>, ParseError> {
    let Some(end) = find_terminator(buf) else {
        if buf.len() > limits.max_header_bytes {
            return Err(ParseError::HeadersTooLarge {
                limit: limits.max_header_bytes,
            });
        }
        return Ok(None);
    };
    let header_len = end + HEAD_TERMINATOR.len();
    if header_len > limits.max_header_bytes {
        return Err(ParseError::HeadersTooLarge {
            limit: limits.max_header_bytes,
        });
    }

    let text = std::str::from_utf8(&buf[..end]).map_err(|_| ParseError::InvalidEncoding)?;
    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let (method, target) = parse_request_line(request_line)?;

    let mut headers = RequestHeaders::new();
    for line in lines {
        headers.push_line(line);
    }

    let content_length = match headers.content_length_raw() {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidContentLength(raw.to_string()))?,
        None => 0,
    };
    if content_length > limits.max_body_bytes {
        return Err(ParseError::BodyTooLarge {
            declared: content_length,
            limit: limits.max_body_bytes,
        });
    }

    Ok(Some(RequestHead {
        method,
        target,
        headers,
        header_len,
        content_length,
    }))
}

fn parse_request_line(line: &str) -> Result<(Method, String), ParseError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let [method, target, _version] = parts[..] else {
        return Err(ParseError::MalformedRequestLine(line.to_string()));
    };
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| ParseError::InvalidMethod(method.to_string()))?;
    Ok((method, target.to_string()))
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
}

/// Reads one complete request, giving the client `budget` for all of it.
/// Returns the request and the number of bytes consumed from the stream.
pub async fn read_request<S>(
    stream: &mut S,
    budget: Duration,
    limits: &RequestLimits,
) -> Result<(ParsedRequest, usize), ReceiveError>
where
    S: AsyncRead + Unpin,
{
    let deadline = Instant::now() + budget;
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut head: Option<RequestHead> = None;

    loop {
        if let Some(parsed) = &head
            && buf.len() >= parsed.total_len()
        {
            break;
        }

        let mut chunk = [0u8; READ_CHUNK];
        let read = timeout_at(deadline, stream.read(&mut chunk))
            .await
            .map_err(|_| ReceiveError::Timeout)??;
        if read == 0 {
            return Err(ReceiveError::Closed);
        }
        buf.extend_from_slice(&chunk[..read]);

        if head.is_none() {
            head = parse_head(&buf, limits).map_err(|source| ReceiveError::Parse {
                source,
                received: buf.len(),
            })?;
        }
    }

    let received = buf.len();
    match head {
        Some(head) => Ok((head.into_request(&buf), received)),
        None => Err(ReceiveError::Closed),
    }
}
