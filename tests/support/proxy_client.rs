use std::net::SocketAddr;
use std::time::Duration as StdDuration;

use anyhow::{Result, anyhow};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::read_http_response;

const RESPONSE_TIMEOUT: StdDuration = StdDuration::from_secs(5);

pub struct ProxyClient {
    stream: TcpStream,
}

impl ProxyClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Ok(Self {
            stream: TcpStream::connect(addr).await?,
        })
    }

    pub async fn send(&mut self, request: impl AsRef<[u8]>) -> Result<()> {
        self.stream.write_all(request.as_ref()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads until the proxy closes the connection.
    pub async fn read_response(&mut self) -> Result<String> {
        timeout(RESPONSE_TIMEOUT, read_http_response(&mut self.stream))
            .await
            .map_err(|_| anyhow!("proxy did not close the connection"))?
    }
}

/// One request on a fresh connection, returning everything the proxy sent.
pub async fn round_trip(addr: SocketAddr, request: impl AsRef<[u8]>) -> Result<String> {
    let mut client = ProxyClient::connect(addr).await?;
    client.send(request).await?;
    client.read_response().await
}
