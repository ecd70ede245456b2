//! Scripted local HTTP upstream for provider tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::config::HttpConfig;
use crate::gateway::RateLimiter;
use crate::provider::http::HttpSource;

/// One request as seen by the server
pub struct Request {
    /// Zero-based arrival order
    pub index: usize,
    /// Request line, e.g. `GET /api?module=account HTTP/1.1`
    pub line: String,
    /// Parsed JSON body, `Null` for GETs
    pub body: serde_json::Value,
}

impl Request {
    pub fn method(&self) -> &str {
        self.body["method"].as_str().unwrap_or_default()
    }
}

pub struct TestServer {
    pub url: String,
    requests: Arc<AtomicUsize>,
}

impl TestServer {
    /// Answer each connection with `respond(request) -> (status, body)`
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&Request) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let raw = read_request(&mut socket).await;
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw.as_str(), ""));
                let request = Request {
                    index,
                    line: head.lines().next().unwrap_or_default().to_string(),
                    body: serde_json::from_str(body).unwrap_or(serde_json::Value::Null),
                };

                let (status, body) = respond(&request);
                let response = format!(
                    "HTTP/1.1 {} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self { url, requests }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Unthrottled transport with a short retry budget
pub fn http_source(max_retry_elapsed_ms: u64) -> HttpSource {
    HttpSource::new(
        Arc::new(RateLimiter::unlimited()),
        HttpConfig {
            timeout_ms: 2_000,
            max_retry_elapsed_ms,
            retry_base_delay_ms: 10,
        },
    )
    .unwrap()
}
