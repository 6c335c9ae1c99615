//! スクリプト化したテスト用 HTTP サーバー

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// サーバーが受け取ったリクエスト
#[derive(Debug, Clone)]
pub struct Recorded {
    /// 接続番号 (accept 順)
    pub conn: usize,
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// リクエストへの応答
pub enum Action {
    /// 応答して接続を維持
    Respond(Vec<u8>),
    /// 応答して接続を閉じる
    RespondAndClose(Vec<u8>),
    /// 応答せずに待ち続ける
    Hang,
}

pub struct TestServer {
    pub port: u16,
    pub requests: mpsc::UnboundedReceiver<Recorded>,
    pub accepted: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub async fn next_request(&mut self) -> Recorded {
        self.requests.recv().await.expect("server stopped")
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// ハンドラーで応答するサーバーを起動
pub async fn serve<F>(handler: F) -> TestServer
where
    F: Fn(&Recorded) -> Action + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();
    let accepted = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(handler);

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let conn = counter.fetch_add(1, Ordering::SeqCst);
            let handler = Arc::clone(&handler);
            let tx = tx.clone();
            tokio::spawn(async move {
                handle_connection(socket, conn, handler, tx).await;
            });
        }
    });

    TestServer {
        port,
        requests: rx,
        accepted,
    }
}

/// すべてのリクエストに同じバイト列を返すサーバー
pub async fn serve_bytes(response: &'static [u8]) -> TestServer {
    serve(move |_| Action::Respond(response.to_vec())).await
}

async fn handle_connection<F>(
    mut socket: TcpStream,
    conn: usize,
    handler: Arc<F>,
    tx: mpsc::UnboundedSender<Recorded>,
) where
    F: Fn(&Recorded) -> Action + Send + Sync + 'static,
{
    let mut buf = Vec::new();
    loop {
        let Some(request) = read_request(&mut socket, &mut buf, conn).await else {
            return;
        };
        let action = handler(&request);
        let _ = tx.send(request);
        match action {
            Action::Respond(bytes) => {
                if socket.write_all(&bytes).await.is_err() {
                    return;
                }
            }
            Action::RespondAndClose(bytes) => {
                let _ = socket.write_all(&bytes).await;
                let _ = socket.shutdown().await;
                return;
            }
            Action::Hang => {
                std::future::pending::<()>().await;
            }
        }
    }
}

async fn read_request(socket: &mut TcpStream, buf: &mut Vec<u8>, conn: usize) -> Option<Recorded> {
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let mut chunk = [0u8; 1024];
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end - 4]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?;
    let mut parts = request_line.split(' ');
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect::<Vec<_>>();

    let content_length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + content_length {
        let mut chunk = [0u8; 1024];
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = buf[head_end..head_end + content_length].to_vec();
    buf.drain(..head_end + content_length);

    Some(Recorded {
        conn,
        method,
        target,
        headers,
        body,
    })
}
