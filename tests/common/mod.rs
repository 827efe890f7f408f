//! A tiny HTTP stub standing in for the remote services.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub delay: Duration,
}

pub fn json(body: &str) -> Reply {
    Reply {
        status: 200,
        content_type: "application/json",
        body: body.to_string(),
        delay: Duration::ZERO,
    }
}

pub fn html(body: &str) -> Reply {
    Reply {
        status: 200,
        content_type: "text/html; charset=utf-8",
        body: body.to_string(),
        delay: Duration::ZERO,
    }
}

pub fn status(code: u16) -> Reply {
    Reply {
        status: code,
        content_type: "text/plain",
        body: "stub".to_string(),
        delay: Duration::ZERO,
    }
}

/// Answer with `reply` only after `ms` milliseconds.
pub fn slow(reply: Reply, ms: u64) -> Reply {
    Reply {
        delay: Duration::from_millis(ms),
        ..reply
    }
}

/// Requests seen by the stub as `"METHOD target body"`.
pub type Seen = Arc<Mutex<Vec<String>>>;

/// Serve `routes` on an ephemeral port and return its base URL.
///
/// A route key matches the exact request target first, then the target
/// without its query string. Anything else gets a 404.
pub async fn serve(routes: Vec<(&'static str, Reply)>) -> (String, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes: Arc<HashMap<&'static str, Reply>> = Arc::new(routes.into_iter().collect());
    let seen: Seen = Arc::default();
    let log = seen.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let routes = routes.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let raw = read_all(&mut stream).await;
                let text = String::from_utf8_lossy(&raw).to_string();
                let mut line = text.lines().next().unwrap_or("").split_whitespace();
                let method = line.next().unwrap_or("").to_string();
                let target = line.next().unwrap_or("/").to_string();
                let body = text.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("");
                log.lock().unwrap().push(format!("{method} {target} {body}"));

                let path = target.split('?').next().unwrap_or("/");
                let reply = routes
                    .get(target.as_str())
                    .or_else(|| routes.get(path))
                    .cloned()
                    .unwrap_or_else(|| status(404));
                tokio::time::sleep(reply.delay).await;
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    reply.status,
                    reply.content_type,
                    reply.body.len(),
                    reply.body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), seen)
}

async fn read_all(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            break;
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                break;
            }
        }
    }
    buf
}
