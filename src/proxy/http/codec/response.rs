use http::StatusCode;

/// Complete error response with a small HTML body. The connection is always
/// closed afterwards, which the headers announce.
pub fn error_response(status: StatusCode) -> Vec<u8> {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or("Unknown Error");
    let body = format!("<html><body><h1>{code} {reason}</h1></body></html>");
    let head = format!(
        "HTTP/1.1 {code} {reason}\r\nContent-Type: text/html\r\nConnection: close\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    let mut response = Vec::with_capacity(head.len() + body.len());
    response.extend_from_slice(head.as_bytes());
    response.extend_from_slice(body.as_bytes());
    response
}

/// Status code from the first line of a raw response, for logging only. The
/// bytes are relayed untouched whether or not this succeeds.
pub fn response_status(raw: &[u8]) -> Option<u16> {
    let line_end = raw.iter().position(|byte| *byte == b'\n').unwrap_or(raw.len());
    let line = std::str::from_utf8(&raw[..line_end]).ok()?;
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    code.parse().ok()
}
