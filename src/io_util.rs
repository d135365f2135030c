use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::util::timeout_with_context;

/// Writes the whole buffer, failing if it does not complete within `timeout_dur`.
pub async fn write_all_with_timeout<S>(
    stream: &mut S,
    buf: &[u8],
    timeout_dur: Duration,
    context: &str,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    timeout_with_context(timeout_dur, stream.write_all(buf), context).await
}
