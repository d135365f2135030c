mod codec;
mod forward;
mod handler;

pub use codec::{
    HeaderLine, ParseStatus, RequestHead, RequestHeaders, RequestLimits, error_response,
    parse_head, parse_request, read_request, response_status,
};
pub use forward::{ForwardResponse, Forwarder, OriginTarget, build_upstream_request};
pub use handler::{handle_http, serve_connection};

#[cfg(feature = "fuzzing")]
pub mod fuzzing {
    use super::{ParseStatus, RequestLimits};

    /// Runs the request parser over arbitrary bytes and exercises the derived
    /// request the way the connection handler would.
    pub fn parse_request_bytes(data: &[u8]) {
        let limits = RequestLimits {
            max_header_bytes: 64 * 1024,
            max_body_bytes: 64 * 1024,
        };
        if let Ok(ParseStatus::Complete(request)) = super::parse_request(data, &limits) {
            let _ = crate::proxy::cache::CacheKey::for_url(&request.target_url);
            if let Ok(target) = super::OriginTarget::parse(&request.target_url) {
                let _ = super::build_upstream_request(&request, &target);
            }
            let _ = request.headers.to_map();
        }
    }
}
