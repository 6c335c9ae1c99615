//! 接続チャネル
//!
//! 1 本の TCP (または TLS) 接続と、プールから借りた読み取りバッファ・I/O 記述子をまとめる。
//! 読み書きは記述子の完了スロットを経由して呼び出し側に戻る。

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use h11wire::ParseError;
use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, trace};

use crate::destination::{DestinationKey, unbracket};
use crate::error::{Error, Result};
use crate::pool::{IoDescriptor, OpKind, Pooled, PooledBuffer};

/// graceful shutdown を待つ上限
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// OS のルート証明書ストアを使用するデフォルトの TLS 設定
pub(crate) fn default_tls_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            Arc::new(
                ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(
                        rustls_platform_verifier::Verifier::new(),
                    ))
                    .with_no_client_auth(),
            )
        })
        .clone()
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Stream {
    fn tcp(&self) -> &TcpStream {
        match self {
            Stream::Plain(s) => s,
            Stream::Tls(s) => s.get_ref().0,
        }
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// チャネルの接続設定
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// TCP 接続の期限
    pub connect_timeout: Duration,
    /// 読み取りウィンドウの最大長 (ヘッダー 1 行がここに収まる必要がある)
    pub max_window: usize,
    /// TLS 設定 (None ならデフォルト)
    pub tls_config: Option<Arc<ClientConfig>>,
}

/// 接続チャネル
///
/// 同時に進行できる操作は 1 つだけ (`&mut self` で保証)。
pub struct Channel {
    key: DestinationKey,
    stream: Option<Stream>,
    authenticated: bool,
    tls_config: Option<Arc<ClientConfig>>,
    buffer: PooledBuffer,
    /// 1 フィールドがプール領域に収まらない場合のヒープ領域
    spill: Option<Vec<u8>>,
    /// 未消費データの範囲
    start: usize,
    end: usize,
    max_window: usize,
    descriptor: Pooled<IoDescriptor>,
    idle_since: Instant,
    requests: u64,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("key", &self.key)
            .field("connected", &self.stream.is_some())
            .field("authenticated", &self.authenticated)
            .field("window", &(self.end - self.start))
            .field("spilled", &self.spill.is_some())
            .field("requests", &self.requests)
            .finish()
    }
}

impl Channel {
    /// 接続先に TCP 接続する
    ///
    /// TLS ハンドシェイクは `authenticate()` で行う。
    pub async fn connect(
        key: DestinationKey,
        buffer: PooledBuffer,
        descriptor: Pooled<IoDescriptor>,
        options: &ChannelOptions,
    ) -> Result<Self> {
        let (host, port) = key.connect_authority();
        let host = unbracket(host).to_string();

        let addrs = tokio::time::timeout(
            options.connect_timeout,
            tokio::net::lookup_host((host.as_str(), port)),
        )
        .await?
        .map_err(|e| Error::DnsResolution(format!("{}: {}", host, e)))?
        .collect::<Vec<_>>();
        if addrs.is_empty() {
            return Err(Error::DnsResolution(format!("{}: no addresses", host)));
        }

        let mut last_error = None;
        let mut connected = None;
        for addr in addrs {
            match tokio::time::timeout(options.connect_timeout, TcpStream::connect(addr)).await? {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(e) => {
                    debug!(%addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }
        let stream = match (connected, last_error) {
            (Some(stream), _) => stream,
            (None, Some(e)) => return Err(Error::Io(e)),
            (None, None) => return Err(Error::ConnectionClosed),
        };
        stream.set_nodelay(true)?;
        debug!(destination = %key, "channel connected");

        Ok(Self {
            key,
            stream: Some(Stream::Plain(stream)),
            authenticated: false,
            tls_config: options.tls_config.clone(),
            buffer,
            spill: None,
            start: 0,
            end: 0,
            max_window: options.max_window,
            descriptor,
            idle_since: Instant::now(),
            requests: 0,
        })
    }

    /// 接続先キー
    pub fn key(&self) -> &DestinationKey {
        &self.key
    }

    /// TLS ハンドシェイクを行う
    ///
    /// http の接続や、すでにハンドシェイク済みなら何もしない。
    pub async fn authenticate(&mut self) -> Result<()> {
        if self.authenticated || !self.key.is_secure() {
            return Ok(());
        }
        let tcp = match self.stream.take() {
            Some(Stream::Plain(tcp)) => tcp,
            Some(other) => {
                self.stream = Some(other);
                self.authenticated = true;
                return Ok(());
            }
            None => return Err(not_connected().into()),
        };

        let config = self.tls_config.clone().unwrap_or_else(default_tls_config);
        let connector = TlsConnector::from(config);
        let server_name = ServerName::try_from(unbracket(self.key.host()).to_string())?;
        let tls_stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::Tls(e.to_string()))?;

        self.stream = Some(Stream::Tls(Box::new(tls_stream)));
        self.authenticated = true;
        debug!(destination = %self.key, "TLS handshake completed");
        Ok(())
    }

    /// ハンドシェイク済みか (http なら常に true)
    pub fn is_authenticated(&self) -> bool {
        self.authenticated || !self.key.is_secure()
    }

    /// 未消費の受信データ
    pub fn window(&self) -> &[u8] {
        &self.storage()[self.start..self.end]
    }

    /// 受信データの先頭 `n` バイトを消費済みにする
    pub fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.end);
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
            if self.spill.take().is_some() {
                trace!("window returned to pooled buffer");
            }
        }
    }

    /// 受信してウィンドウの末尾に追加する
    ///
    /// 0 を返した場合は相手が接続を閉じた。
    pub async fn read(&mut self) -> Result<usize> {
        self.reserve()?;
        let offset = self.end;
        let count = self.storage().len() - offset;
        let n = self.io(OpKind::Read, offset, count).await?;
        self.end += n;
        trace!(n, window = self.end - self.start, "read");
        Ok(n)
    }

    /// バッファの `offset..offset + count` を送信する
    pub async fn write(&mut self, offset: usize, count: usize) -> Result<usize> {
        if offset.saturating_add(count) > self.storage().len() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "write outside buffer").into());
        }
        Ok(self.io(OpKind::Write, offset, count).await?)
    }

    /// データ全体を送信する
    ///
    /// プール領域に収まる単位でコピーしてから `write()` する。
    /// 未消費の受信データがある場合は送信しない。
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.start != self.end {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "unread data on channel").into());
        }
        self.start = 0;
        self.end = 0;
        self.spill = None;

        let capacity = self.buffer.len();
        for chunk in data.chunks(capacity) {
            self.buffer[..chunk.len()].copy_from_slice(chunk);
            let mut written = 0;
            while written < chunk.len() {
                let n = self.write(written, chunk.len() - written).await?;
                if n == 0 {
                    return Err(io::Error::from(io::ErrorKind::WriteZero).into());
                }
                written += n;
            }
        }

        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.flush().await?;
        self.requests += 1;
        trace!(bytes = data.len(), "request sent");
        Ok(())
    }

    /// 再利用できる状態か
    ///
    /// 長くアイドルだった接続、相手が閉じた接続、余分なデータが届いている接続は再利用しない。
    /// TLS の場合は届いているレコードの中身がわからないため余分なデータとしては扱わない。
    pub fn is_reusable(&self, idle_timeout: Duration) -> bool {
        if self.idle_since.elapsed() > idle_timeout {
            debug!(destination = %self.key, "idle timeout exceeded");
            return false;
        }
        if self.start != self.end {
            debug!(destination = %self.key, "unread data on idle channel");
            return false;
        }
        let Some(stream) = &self.stream else {
            return false;
        };

        let mut probe = [0u8; 1];
        let mut buf = ReadBuf::new(&mut probe);
        let mut cx = Context::from_waker(Waker::noop());
        match stream.tcp().poll_peek(&mut cx, &mut buf) {
            Poll::Pending => true,
            Poll::Ready(Ok(0)) => {
                debug!(destination = %self.key, "peer closed idle channel");
                false
            }
            Poll::Ready(Ok(_)) => {
                if self.key.is_secure() {
                    return true;
                }
                debug!(destination = %self.key, "stray bytes on idle channel");
                false
            }
            Poll::Ready(Err(e)) => {
                debug!(destination = %self.key, error = %e, "idle channel failed");
                false
            }
        }
    }

    /// アイドル状態に入った時刻を記録する
    pub fn mark_idle(&mut self) {
        self.idle_since = Instant::now();
    }

    /// アイドル状態に入った時刻
    pub fn idle_since(&self) -> Instant {
        self.idle_since
    }

    /// この接続で送信したリクエスト数
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// 接続を閉じる
    ///
    /// エラーは呼び出し側に返さない。
    pub async fn close(mut self) {
        if let Some(mut stream) = self.stream.take() {
            match tokio::time::timeout(CLOSE_TIMEOUT, stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(destination = %self.key, error = %e, "shutdown failed"),
                Err(_) => debug!(destination = %self.key, "shutdown timed out"),
            }
        }
        debug!(destination = %self.key, "channel closed");
    }

    fn storage(&self) -> &[u8] {
        match &self.spill {
            Some(spill) => spill,
            None => &self.buffer,
        }
    }

    /// 読み取り用の空き領域を確保する
    ///
    /// 消費済みの先頭を詰め、それでも空きがなければヒープ領域に広げる。
    fn reserve(&mut self) -> Result<()> {
        let len = self.storage().len();
        if self.end < len {
            return Ok(());
        }
        if self.start > 0 {
            let (start, end) = (self.start, self.end);
            match &mut self.spill {
                Some(spill) => spill.copy_within(start..end, 0),
                None => self.buffer.copy_within(start..end, 0),
            }
            self.end -= start;
            self.start = 0;
            trace!(window = self.end, "window compacted");
            return Ok(());
        }
        if len >= self.max_window {
            return Err(Error::Parse(ParseError::DataTooBig {
                size: len,
                limit: self.max_window,
            }));
        }

        let new_len = len.saturating_mul(2).min(self.max_window);
        let mut spill = vec![0u8; new_len];
        spill[..self.end].copy_from_slice(&self.storage()[..self.end]);
        self.spill = Some(spill);
        trace!(len = new_len, "window spilled to heap");
        Ok(())
    }

    async fn io(&mut self, kind: OpKind, offset: usize, count: usize) -> io::Result<usize> {
        let Channel {
            stream,
            buffer,
            spill,
            descriptor,
            ..
        } = self;
        let stream = stream.as_mut().ok_or_else(not_connected)?;
        let storage: &mut [u8] = match spill {
            Some(spill) => spill,
            None => buffer,
        };
        let range = descriptor.bind(kind, offset, count);

        poll_fn(move |cx| {
            if !descriptor.is_complete() {
                let polled = match kind {
                    OpKind::Read => {
                        let mut buf = ReadBuf::new(&mut storage[range.clone()]);
                        match Pin::new(&mut *stream).poll_read(cx, &mut buf) {
                            Poll::Ready(Ok(())) => Poll::Ready(Ok(buf.filled().len())),
                            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                            Poll::Pending => Poll::Pending,
                        }
                    }
                    OpKind::Write => Pin::new(&mut *stream).poll_write(cx, &storage[range.clone()]),
                };
                if let Poll::Ready(result) = polled {
                    descriptor.complete(result);
                }
            }
            descriptor.poll_complete(cx)
        })
        .await
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel is not connected")
}
