//! In-process stand-in for the chat gateway.
//!
//! Accepts one request per connection, records it, and answers with
//! whatever the route closure returns.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use twinchat::Client;

/// A request as the gateway saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub target: String,
    /// Lowercased names.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    /// `Content-Length` framed body.
    Text { status: u16, body: String },
    /// Body delimited by closing the connection.
    UntilClose(String),
    /// Chunked event stream, one chunk per piece.
    Events(Vec<Vec<u8>>),
    /// Chunked event stream that sends its pieces and then stays open.
    Stall(Vec<Vec<u8>>),
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self::Text {
            status,
            body: body.to_owned(),
        }
    }

    /// One event per payload followed by the `[DONE]` sentinel.
    pub fn events(payloads: &[&str]) -> Self {
        let mut pieces: Vec<Vec<u8>> = payloads
            .iter()
            .map(|p| format!("data: {p}\n\n").into_bytes())
            .collect();
        pieces.push(b"data: [DONE]\n\n".to_vec());
        Self::Events(pieces)
    }

    pub fn raw(pieces: &[&[u8]]) -> Self {
        Self::Events(pieces.iter().map(|p| p.to_vec()).collect())
    }

    pub fn stall(payloads: &[&str]) -> Self {
        Self::Stall(
            payloads
                .iter()
                .map(|p| format!("data: {p}\n\n").into_bytes())
                .collect(),
        )
    }
}

type Route = Arc<dyn Fn(&Recorded) -> Reply + Send + Sync>;

pub struct Gateway {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
    task: JoinHandle<()>,
}

impl Gateway {
    pub async fn start<F>(route: F) -> Self
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests: Arc<Mutex<Vec<Recorded>>> = Arc::default();
        let route: Route = Arc::new(route);

        let task = tokio::spawn({
            let requests = Arc::clone(&requests);
            async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let route = Arc::clone(&route);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        let _ = serve(socket, route, requests).await;
                    });
                }
            }
        });

        Self {
            addr,
            requests,
            task,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> Client {
        Client::new(self.base_url().parse().unwrap())
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// An address nothing listens on.
pub async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn serve(
    mut socket: TcpStream,
    route: Route,
    requests: Arc<Mutex<Vec<Recorded>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let (mut recorded, body_start, content_length) = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut req = httparse::Request::new(&mut headers);
        if let Ok(httparse::Status::Complete(offset)) = req.parse(&buf) {
            let headers: Vec<(String, String)> = req
                .headers
                .iter()
                .map(|h| {
                    (
                        h.name.to_ascii_lowercase(),
                        String::from_utf8_lossy(h.value).into_owned(),
                    )
                })
                .collect();
            let length = headers
                .iter()
                .find(|(n, _)| n == "content-length")
                .and_then(|(_, v)| v.parse::<usize>().ok())
                .unwrap_or(0);
            let recorded = Recorded {
                method: req.method.unwrap_or_default().to_owned(),
                target: req.path.unwrap_or_default().to_owned(),
                headers,
                body: Vec::new(),
            };
            break (recorded, offset, length);
        }
    };

    while buf.len() < body_start + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let end = buf.len().min(body_start + content_length);
    recorded.body = buf[body_start..end].to_vec();

    let reply = route(&recorded);
    requests.lock().unwrap().push(recorded);

    match reply {
        Reply::Text { status, body } => {
            let head = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                if status < 400 { "OK" } else { "Error" },
                body.len()
            );
            socket.write_all(head.as_bytes()).await?;
            socket.write_all(body.as_bytes()).await?;
        }
        Reply::UntilClose(body) => {
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n")
                .await?;
            socket.write_all(body.as_bytes()).await?;
        }
        Reply::Events(pieces) => {
            write_events(&mut socket, &pieces).await?;
            socket.write_all(b"0\r\n\r\n").await?;
        }
        Reply::Stall(pieces) => {
            write_events(&mut socket, &pieces).await?;
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
    socket.shutdown().await
}

async fn write_events(socket: &mut TcpStream, pieces: &[Vec<u8>]) -> std::io::Result<()> {
    socket
        .write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\n\r\n",
        )
        .await?;
    for piece in pieces {
        socket
            .write_all(format!("{:x}\r\n", piece.len()).as_bytes())
            .await?;
        socket.write_all(piece).await?;
        socket.write_all(b"\r\n").await?;
        socket.flush().await?;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    Ok(())
}
