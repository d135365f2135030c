mod support;

use std::time::Duration as StdDuration;

use anyhow::Result;
use tokio::time::sleep;

use cacheproxy::proxy::cache::CacheKey;

use support::proxy_client::round_trip;
use support::upstream::ok_response;
use support::*;

#[tokio::test]
async fn cache_survives_restart() -> Result<()> {
    let upstream = TestUpstream::http_ok("persistent").await?;
    let url = format!("http://{}/persist", upstream.addr());
    let request = format!("GET {url} HTTP/1.1\r\n\r\n");

    let harness = ProxyHarnessBuilder::new().spawn().await?;
    round_trip(harness.addr, &request).await?;
    assert_eq!(upstream.request_count(), 1);
    let cache_root = harness.shutdown().await;

    let harness = ProxyHarnessBuilder::new()
        .with_cache_root(cache_root)
        .spawn()
        .await?;
    assert_eq!(harness.cache.len(), 1);
    let response = round_trip(harness.addr, &request).await?;
    assert_eq!(response, ok_response("persistent"));
    assert_eq!(upstream.request_count(), 1, "restart must keep the entry");

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn restart_drops_entries_whose_blob_vanished() -> Result<()> {
    let upstream = TestUpstream::http_ok("fragile").await?;
    let url = format!("http://{}/fragile", upstream.addr());
    let request = format!("GET {url} HTTP/1.1\r\n\r\n");

    let harness = ProxyHarnessBuilder::new().spawn().await?;
    round_trip(harness.addr, &request).await?;
    let blob = harness.cache_dir().join(CacheKey::for_url(&url).as_str());
    let cache_root = harness.shutdown().await;
    std::fs::remove_file(&blob)?;

    let harness = ProxyHarnessBuilder::new()
        .with_cache_root(cache_root)
        .spawn()
        .await?;
    assert!(harness.cache.is_empty());
    round_trip(harness.addr, &request).await?;
    assert_eq!(upstream.request_count(), 2);
    assert!(blob.is_file(), "blob rewritten after refetch");

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn expired_entry_is_refetched_and_blob_replaced() -> Result<()> {
    let upstream = TestUpstream::http_ok("short-lived").await?;
    let url = format!("http://{}/ttl", upstream.addr());
    let request = format!("GET {url} HTTP/1.1\r\n\r\n");

    let harness = ProxyHarnessBuilder::new()
        .with_settings(|settings| settings.cache_ttl = 1)
        .spawn()
        .await?;

    round_trip(harness.addr, &request).await?;
    round_trip(harness.addr, &request).await?;
    assert_eq!(upstream.request_count(), 1);

    sleep(StdDuration::from_millis(1_100)).await;
    let response = round_trip(harness.addr, &request).await?;
    assert_eq!(response, ok_response("short-lived"));
    assert_eq!(upstream.request_count(), 2, "expired entry must be refetched");
    assert_eq!(harness.cache.len(), 1);

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn oversized_responses_are_served_but_not_stored() -> Result<()> {
    let body = "x".repeat(2048);
    let upstream = TestUpstream::http_ok(&body).await?;
    let url = format!("http://{}/large", upstream.addr());
    let request = format!("GET {url} HTTP/1.1\r\n\r\n");

    let harness = ProxyHarnessBuilder::new()
        .with_settings(|settings| settings.cache_max_entry_size = 1024)
        .spawn()
        .await?;

    let response = round_trip(harness.addr, &request).await?;
    assert_eq!(response, ok_response(&body));
    round_trip(harness.addr, &request).await?;
    assert_eq!(upstream.request_count(), 2);
    assert!(harness.cache.is_empty());

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn query_strings_are_distinct_entries() -> Result<()> {
    let upstream = TestUpstream::http_ok("q").await?;
    let base = format!("http://{}/search", upstream.addr());

    let harness = ProxyHarnessBuilder::new().spawn().await?;
    round_trip(harness.addr, format!("GET {base}?q=1 HTTP/1.1\r\n\r\n")).await?;
    round_trip(harness.addr, format!("GET {base}?q=2 HTTP/1.1\r\n\r\n")).await?;
    round_trip(harness.addr, format!("GET {base}?q=1 HTTP/1.1\r\n\r\n")).await?;

    assert_eq!(upstream.request_count(), 2);
    assert_eq!(harness.cache.len(), 2);

    harness.shutdown().await;
    Ok(())
}
