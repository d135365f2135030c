use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Index metadata for one cached response. The URL is the index key and the
/// body location is derived from it, so neither is stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Seconds since the Unix epoch when the response was stored.
    #[serde(rename = "time")]
    pub stored_at: f64,
    /// Client request headers captured at store time.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl CacheEntry {
    pub fn new(stored_at: f64, headers: BTreeMap<String, String>) -> Self {
        Self { stored_at, headers }
    }

    pub fn is_fresh(&self, now: f64, ttl: Duration) -> bool {
        now - self.stored_at < ttl.as_secs_f64()
    }
}
