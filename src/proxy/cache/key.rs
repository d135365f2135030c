use std::fmt;

/// Hex characters kept from the BLAKE3 digest (128 bits).
pub(super) const KEY_HEX_LEN: usize = 32;

/// Storage name for a cached URL: the first 128 bits of the BLAKE3 hash of
/// the raw URL, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_url(url: &str) -> Self {
        let digest = blake3::hash(url.as_bytes()).to_hex();
        Self(digest.as_str()[..KEY_HEX_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_fixed_width_hex() {
        let key = CacheKey::for_url("http://example.test/widget.html");
        assert_eq!(key.as_str().len(), KEY_HEX_LEN);
        assert!(
            key.as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    #[test]
    fn key_is_deterministic() {
        let a = CacheKey::for_url("http://example.test/a");
        let b = CacheKey::for_url("http://example.test/a");
        assert_eq!(a, b);
    }

    #[test]
    fn query_string_participates_in_key() {
        let plain = CacheKey::for_url("http://example.test/search");
        let query = CacheKey::for_url("http://example.test/search?q=rust");
        assert_ne!(plain, query);
    }

    #[test]
    fn no_normalization_is_applied() {
        let lower = CacheKey::for_url("http://example.test/Path");
        let upper = CacheKey::for_url("http://EXAMPLE.test/Path");
        assert_ne!(lower, upper);
    }
}
