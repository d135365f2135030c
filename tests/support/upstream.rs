use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Barrier;
use tokio::task::JoinHandle;

use super::read_until_double_crlf;

#[derive(Clone)]
enum UpstreamBehavior {
    Close,
    HttpResponse { response: Arc<Vec<u8>> },
    /// Holds every response until `barrier` has seen all expected requests.
    HttpResponseTogether {
        response: Arc<Vec<u8>>,
        barrier: Arc<Barrier>,
    },
}

/// Origin server that counts requests and remembers what it was sent.
pub struct TestUpstream {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl TestUpstream {
    pub async fn close() -> Result<Self> {
        Self::spawn(UpstreamBehavior::Close).await
    }

    pub async fn http_response(response: impl Into<Vec<u8>>) -> Result<Self> {
        Self::spawn(UpstreamBehavior::HttpResponse {
            response: Arc::new(response.into()),
        })
        .await
    }

    pub async fn http_ok(body: &str) -> Result<Self> {
        Self::http_response(ok_response(body)).await
    }

    /// Answers only once `expected` requests are in flight at the same time.
    pub async fn http_ok_together(body: &str, expected: usize) -> Result<Self> {
        Self::spawn(UpstreamBehavior::HttpResponseTogether {
            response: Arc::new(ok_response(body).into_bytes()),
            barrier: Arc::new(Barrier::new(expected)),
        })
        .await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Request heads and bodies in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    async fn spawn(behavior: UpstreamBehavior) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let requests = requests.clone();
            let received = received.clone();
            tokio::spawn(async move {
                loop {
                    let (mut stream, _) = match listener.accept().await {
                        Ok(conn) => conn,
                        Err(_) => break,
                    };
                    let behavior = behavior.clone();
                    let requests = requests.clone();
                    let received = received.clone();
                    tokio::spawn(async move {
                        let _ =
                            handle_connection(&mut stream, behavior, &requests, &received).await;
                    });
                }
            })
        };
        Ok(Self {
            addr,
            requests,
            received,
            handle,
        })
    }
}

impl Drop for TestUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn ok_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

async fn handle_connection(
    stream: &mut TcpStream,
    behavior: UpstreamBehavior,
    requests: &AtomicUsize,
    received: &Mutex<Vec<String>>,
) -> Result<()> {
    let mut request = read_until_double_crlf(stream).await?;
    if request.is_empty() {
        return Ok(());
    }
    requests.fetch_add(1, Ordering::SeqCst);

    let content_length = request
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > 0 {
        let mut body = vec![0u8; content_length];
        stream.read_exact(&mut body).await?;
        request.push_str(&String::from_utf8_lossy(&body));
    }
    received.lock().push(request);

    match behavior {
        UpstreamBehavior::Close => {}
        UpstreamBehavior::HttpResponse { response } => {
            stream.write_all(&response).await?;
        }
        UpstreamBehavior::HttpResponseTogether { response, barrier } => {
            barrier.wait().await;
            stream.write_all(&response).await?;
        }
    }
    stream.shutdown().await.ok();
    Ok(())
}
