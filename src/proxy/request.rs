use bytes::Bytes;
use http::Method;

use crate::proxy::http::RequestHeaders;

/// One client request after parsing, owned by its connection.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: Method,
    /// Absolute URL; doubles as the cache key source.
    pub target_url: String,
    pub headers: RequestHeaders,
    pub body: Bytes,
}

impl ParsedRequest {
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }
}

/// Turns a request-line target into an absolute URL. Targets that already
/// carry a scheme are kept verbatim; anything else is assumed to be plain
/// HTTP, addressed through the Host header when one was sent.
pub fn normalize_target(target: &str, host: Option<&str>) -> String {
    if has_scheme(target) {
        return target.to_string();
    }
    match host {
        Some(host) if target.starts_with('/') => format!("http://{host}{target}"),
        Some(host) => format!("http://{host}/{target}"),
        None => format!("http://{}", target.trim_start_matches('/')),
    }
}

fn has_scheme(target: &str) -> bool {
    let Some((scheme, _)) = target.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_targets_are_kept() {
        assert_eq!(
            normalize_target("http://example.test/a?b=1", Some("other.test")),
            "http://example.test/a?b=1"
        );
        assert_eq!(
            normalize_target("https://example.test/", None),
            "https://example.test/"
        );
    }

    #[test]
    fn origin_form_uses_host_header() {
        assert_eq!(
            normalize_target("/widget.html", Some("example.test")),
            "http://example.test/widget.html"
        );
        assert_eq!(
            normalize_target("/", Some("example.test:8080")),
            "http://example.test:8080/"
        );
    }

    #[test]
    fn missing_host_treats_path_as_authority() {
        assert_eq!(
            normalize_target("/example.test/page", None),
            "http://example.test/page"
        );
    }

    #[test]
    fn scheme_detection_requires_alpha_prefix() {
        assert!(has_scheme("http://x"));
        assert!(has_scheme("svn+ssh://x"));
        assert!(!has_scheme("/path?next=http://x"));
        assert!(!has_scheme("1http://x"));
    }

    #[test]
    fn only_get_is_cacheable() {
        let request = |method: Method| ParsedRequest {
            method,
            target_url: "http://example.test/".into(),
            headers: RequestHeaders::new(),
            body: Bytes::new(),
        };
        assert!(request(Method::GET).is_cacheable());
        assert!(!request(Method::POST).is_cacheable());
        assert!(!request(Method::HEAD).is_cacheable());
    }
}
