//! HTTP/HTTPS クライアント
//!
//! コネクションプールから接続を借りてリクエストを送り、レスポンスを読む。
//! リダイレクトの追従、リクエスト全体のタイムアウト、キャンセルを扱う。
//!
//! ## 使い方
//!
//! ```ignore
//! use tokio_h11wire::Client;
//!
//! // GET
//! let client = Client::new();
//! let response = client.get("http://example.com/path").await?;
//!
//! // ヘッダーとクエリパラメーター
//! let response = client.get("http://example.com/search")
//!     .header("User-Agent", "my-app")
//!     .query([("q", "rust"), ("page", "2")])
//!     .await?;
//!
//! // POST with body
//! let response = client.post("http://example.com/api")
//!     .header("Content-Type", "application/json")
//!     .body(b"{\"key\": \"value\"}")
//!     .await?;
//!
//! // ボディをストリームで読む
//! let mut response = client.get("http://example.com/large").stream().await?;
//! while let Some(chunk) = response.body_mut().chunk().await? {
//!     // ...
//! }
//! ```

use std::future::IntoFuture;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use h11wire::uri::Uri;
use h11wire::{
    BodyDecoder, DecoderLimits, Progress, Request, Response, ResponseHead, ResponseHeadParser,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::body::{BodyStream, StreamingResponse};
use crate::channel::Channel;
use crate::config::ClientConfig;
use crate::connection_pool::{ConnectionPool, Lease};
use crate::deadline::Deadline;
use crate::destination::DestinationKey;
use crate::error::{Error, Result};

/// HTTP クライアント
///
/// `Client::new()` はプロセス全体で共有するプールを使う。
/// `Client::with_config()` は専用のプールを持つ。
#[derive(Debug, Clone)]
pub struct Client {
    pool: Arc<ConnectionPool>,
    config: Arc<ClientConfig>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// 共有プールとデフォルト設定でクライアントを作成
    pub fn new() -> Self {
        Self {
            pool: ConnectionPool::global(),
            config: Arc::new(ClientConfig::default()),
        }
    }

    /// 設定を指定してクライアントを作成 (専用のプールを持つ)
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            pool: ConnectionPool::new(&config),
            config: Arc::new(config),
        }
    }

    /// 既存のプールを共有するクライアントを作成
    ///
    /// プールの設定 (バッファサイズ、上限、接続タイムアウト) はプール作成時のものが使われる。
    /// `limits.max_header_bytes` はプールの受信ウィンドウに収まる値
    /// ([`ConnectionPool::max_header_bytes`]) まで切り詰める。
    pub fn with_pool(pool: Arc<ConnectionPool>, mut config: ClientConfig) -> Self {
        let capacity = pool.max_header_bytes();
        if config.limits.max_header_bytes > capacity {
            debug!(
                requested = config.limits.max_header_bytes,
                capacity, "header limit clamped to pool window"
            );
            config.limits.max_header_bytes = capacity;
        }
        Self {
            pool,
            config: Arc::new(config),
        }
    }

    /// 設定
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// コネクションプール
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// GET リクエストを作成
    pub fn get(&self, url: &str) -> RequestBuilder<'_> {
        self.request("GET", url)
    }

    /// POST リクエストを作成
    pub fn post(&self, url: &str) -> RequestBuilder<'_> {
        self.request("POST", url)
    }

    /// PUT リクエストを作成
    pub fn put(&self, url: &str) -> RequestBuilder<'_> {
        self.request("PUT", url)
    }

    /// DELETE リクエストを作成
    pub fn delete(&self, url: &str) -> RequestBuilder<'_> {
        self.request("DELETE", url)
    }

    /// HEAD リクエストを作成
    pub fn head(&self, url: &str) -> RequestBuilder<'_> {
        self.request("HEAD", url)
    }

    /// PATCH リクエストを作成
    pub fn patch(&self, url: &str) -> RequestBuilder<'_> {
        self.request("PATCH", url)
    }

    /// 任意のメソッドでリクエストを作成
    pub fn request(&self, method: &str, url: &str) -> RequestBuilder<'_> {
        RequestBuilder {
            client: self,
            method: method.to_string(),
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
            query_params: Vec::new(),
            timeout: None,
            cancel: None,
        }
    }

    fn destination(&self, uri: &Uri) -> Result<DestinationKey> {
        let key = DestinationKey::from_uri(uri)?;
        let Some(proxy) = &self.config.proxy else {
            return Ok(key);
        };
        let host = proxy
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidUrl(format!("invalid proxy: {}", proxy)))?;
        let port = proxy
            .port_or_default()
            .ok_or_else(|| Error::InvalidUrl(format!("invalid proxy: {}", proxy)))?;
        Ok(key.with_proxy(host, port))
    }

    /// リダイレクトを追従しながらレスポンスヘッドまで読む
    async fn execute(&self, mut exchange: Exchange, deadline: Deadline) -> Result<StreamingResponse> {
        let config = &self.config;
        let mut redirects = 0;
        let mut carried: Option<Lease> = None;

        loop {
            let key = self.destination(&exchange.uri)?;
            let mut lease = match carried.take() {
                Some(lease) if lease.key() == &key => {
                    debug!(destination = %key, "reusing channel for redirect");
                    lease
                }
                Some(lease) => {
                    lease.release(true).await;
                    deadline.run(self.pool.acquire(&key)).await?
                }
                None => deadline.run(self.pool.acquire(&key)).await?,
            };

            let request = exchange.encode(&key, config.keep_alive);
            let expect_no_body = exchange.method.eq_ignore_ascii_case("HEAD");
            let head = match send_and_read_head(
                lease.channel_mut(),
                &request,
                &config.limits,
                expect_no_body,
                &deadline,
            )
            .await
            {
                Ok(head) => head,
                Err(e) => {
                    debug!(destination = %key, error = %e, "exchange failed");
                    lease.discard();
                    return Err(e);
                }
            };

            let keep_alive = config.keep_alive && head.is_keep_alive() && head.status_code() != 101;
            let decoder = BodyDecoder::new(head.framing, config.limits.clone());
            let body = BodyStream::new(lease, decoder, keep_alive, deadline.clone());

            if !head.is_redirect() {
                return Ok(StreamingResponse::new(head, body));
            }

            let status = head.status_code();
            redirects += 1;
            let target = redirect_target(config, &exchange.uri, status, head.location(), redirects)?;
            carried = body.drain().await?;
            debug!(status, from = %exchange.uri, to = %target, "following redirect");
            exchange.redirect(status, target);
        }
    }
}

/// リダイレクト先を解決し、ポリシーに反していないか確認する
///
/// `redirects` はこのリダイレクトを含めた回数。
fn redirect_target(
    config: &ClientConfig,
    current: &Uri,
    status: u16,
    location: Option<&str>,
    redirects: usize,
) -> Result<Uri> {
    let location = location.ok_or(Error::MissingLocation { status })?;
    let target = current.resolve(location)?;
    if !config.follow_redirects {
        return Err(Error::RedirectNotFollowed {
            status,
            location: target.to_string(),
        });
    }
    if current.is_secure() && !target.is_secure() {
        warn!(from = %current, to = %target, "refusing insecure redirect");
        return Err(Error::InsecureRedirect {
            location: target.to_string(),
        });
    }
    if redirects > config.max_redirects {
        return Err(Error::TooManyRedirects {
            limit: config.max_redirects,
        });
    }
    Ok(target)
}

/// 送信するリクエストの内容
///
/// リダイレクトのたびに書き換える。
#[derive(Debug, Clone)]
struct Exchange {
    method: String,
    uri: Uri,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl Exchange {
    fn encode(&self, key: &DestinationKey, keep_alive: bool) -> Vec<u8> {
        let target = if key.proxy().is_some() {
            self.uri.absolute_form()
        } else {
            self.uri.origin_form()
        };
        let mut request = Request::new(&self.method, &target);

        // Host ヘッダーを最初に設定（ユーザーが上書き可能）
        let has_header = |name: &str| {
            self.headers
                .iter()
                .any(|(n, _)| n.eq_ignore_ascii_case(name))
        };
        if !has_header("Host") {
            if let Some(host) = self.uri.host_header() {
                request = request.header("Host", &host);
            }
        }
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        if !keep_alive && !has_header("Connection") {
            request = request.header("Connection", "close");
        }
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }
        request.encode()
    }

    fn redirect(&mut self, status: u16, target: Uri) {
        if matches!(status, 301..=303) && !self.method.eq_ignore_ascii_case("HEAD") {
            self.method = "GET".to_string();
            self.body = None;
            self.headers.retain(|(name, _)| {
                !name.eq_ignore_ascii_case("Content-Length")
                    && !name.eq_ignore_ascii_case("Content-Type")
                    && !name.eq_ignore_ascii_case("Transfer-Encoding")
            });
        }
        let same_origin = self.uri.scheme() == target.scheme()
            && self.uri.host() == target.host()
            && self.uri.port_or_default() == target.port_or_default();
        if !same_origin {
            self.headers.retain(|(name, _)| {
                !name.eq_ignore_ascii_case("Host") && !name.eq_ignore_ascii_case("Authorization")
            });
        }
        self.uri = target;
    }
}

/// リクエストを送信し、最終レスポンスのヘッドを読む
///
/// 101 以外の 1xx は読み飛ばす。
async fn send_and_read_head(
    channel: &mut Channel,
    request: &[u8],
    limits: &DecoderLimits,
    expect_no_body: bool,
    deadline: &Deadline,
) -> Result<ResponseHead> {
    deadline.run(channel.authenticate()).await?;
    deadline.run(channel.send(request)).await?;

    let mut parser = ResponseHeadParser::new(limits.clone());
    parser.set_expect_no_body(expect_no_body);
    loop {
        let mut cursor = 0;
        let progress = parser.advance(channel.window(), &mut cursor);
        channel.consume(cursor);
        match progress? {
            Progress::ContinueParsing => continue,
            Progress::Done => {
                let head = parser
                    .take_head()
                    .ok_or(Error::Parse(h11wire::ParseError::Invalid("missing head")))?;
                if head.is_interim() {
                    trace!(status = head.status_code(), "skipping interim response");
                    parser.reset();
                    continue;
                }
                return Ok(head);
            }
            Progress::NeedMoreData => {
                if deadline.run(channel.read()).await? == 0 {
                    return Err(Error::ConnectionClosed);
                }
            }
        }
    }
}

/// リクエストビルダー
///
/// Client のメソッド (get, post など) から取得し、ヘッダーやボディを追加してから
/// `.await` でリクエストを送信する。ボディをストリームで読む場合は `stream()` を使う。
pub struct RequestBuilder<'a> {
    client: &'a Client,
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    query_params: Vec<(String, String)>,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl<'a> RequestBuilder<'a> {
    /// ヘッダーを追加
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// クエリパラメータを追加
    ///
    /// 複数回呼び出すと追加される。URL に既存のクエリパラメータがある場合は
    /// それに追加される。
    ///
    /// ```ignore
    /// let response = client.get("https://api.example.com/users")
    ///     .query([("page", "1"), ("limit", "10")])
    ///     .await?;
    /// // -> GET /users?page=1&limit=10
    /// ```
    pub fn query<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in params {
            self.query_params
                .push((key.as_ref().to_string(), value.as_ref().to_string()));
        }
        self
    }

    /// ボディを設定
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// このリクエストだけタイムアウトを変更
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// キャンセルトークンを設定
    ///
    /// キャンセルされると待機中の処理を打ち切り、`Error::Cancelled` を返す。
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// レスポンスヘッドまで読み、ボディはストリームで返す
    pub async fn stream(self) -> Result<StreamingResponse> {
        let timeout = self.timeout.unwrap_or(self.client.config.request_timeout);
        let deadline = Deadline::new(Some(timeout), self.cancel);

        let mut uri = Uri::parse(&self.url)?;
        if !uri.is_absolute() {
            return Err(Error::InvalidUrl(format!("not an absolute URL: {}", self.url)));
        }
        for (key, value) in &self.query_params {
            uri.append_query_pair(key, value);
        }

        let exchange = Exchange {
            method: self.method,
            uri,
            headers: self.headers,
            body: self.body,
        };
        self.client.execute(exchange, deadline).await
    }

    /// リクエストを送信し、ボディまで読む
    async fn send(self) -> Result<Response> {
        let response = self.stream().await?;
        response.into_response().await
    }
}

impl<'a> IntoFuture for RequestBuilder<'a> {
    type Output = Result<Response>;
    type IntoFuture = Pin<Box<dyn std::future::Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(method: &str, url: &str) -> Exchange {
        Exchange {
            method: method.to_string(),
            uri: Uri::parse(url).unwrap(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[test]
    fn test_encode_sets_host_and_origin_form() {
        let ex = exchange("GET", "http://example.com:8080/a?b=c#frag");
        let key = DestinationKey::from_uri(&ex.uri).unwrap();
        let bytes = ex.encode(&key, true);
        assert_eq!(
            bytes,
            b"GET /a?b=c HTTP/1.1\r\nHost: example.com:8080\r\n\r\n".to_vec()
        );
    }

    #[test]
    fn test_encode_proxy_uses_absolute_form() {
        let ex = exchange("GET", "http://example.com/a");
        let key = DestinationKey::from_uri(&ex.uri)
            .unwrap()
            .with_proxy("proxy.test", 3128);
        let bytes = ex.encode(&key, false);
        assert_eq!(
            bytes,
            b"GET http://example.com/a HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n"
                .to_vec()
        );
    }

    #[test]
    fn test_redirect_rewrites_method() {
        let mut ex = exchange("POST", "http://a.test/form");
        ex.body = Some(b"x=1".to_vec());
        ex.headers
            .push(("Content-Type".to_string(), "text/plain".to_string()));
        ex.headers
            .push(("Authorization".to_string(), "secret".to_string()));

        ex.redirect(303, Uri::parse("http://a.test/done").unwrap());
        assert_eq!(ex.method, "GET");
        assert!(ex.body.is_none());
        assert_eq!(ex.headers.len(), 1);

        // 別オリジンへは Authorization を送らない
        ex.redirect(302, Uri::parse("http://b.test/").unwrap());
        assert!(ex.headers.is_empty());
    }

    #[test]
    fn test_redirect_keeps_method_for_307_and_head() {
        let mut ex = exchange("PUT", "http://a.test/");
        ex.body = Some(b"data".to_vec());
        ex.redirect(307, Uri::parse("http://a.test/other").unwrap());
        assert_eq!(ex.method, "PUT");
        assert_eq!(ex.body.as_deref(), Some(&b"data"[..]));

        let mut ex = exchange("HEAD", "http://a.test/");
        ex.redirect(301, Uri::parse("http://a.test/moved").unwrap());
        assert_eq!(ex.method, "HEAD");
    }

    #[test]
    fn test_redirect_policy() {
        let config = ClientConfig::default();
        let current = Uri::parse("https://a.test/x/y").unwrap();

        let target = redirect_target(&config, &current, 302, Some("../z"), 1).unwrap();
        assert_eq!(target.to_string(), "https://a.test/z");

        assert!(matches!(
            redirect_target(&config, &current, 301, None, 1),
            Err(Error::MissingLocation { status: 301 })
        ));
        assert!(matches!(
            redirect_target(&config, &current, 302, Some("http://a.test/"), 1),
            Err(Error::InsecureRedirect { .. })
        ));
        assert!(matches!(
            redirect_target(&config, &current, 302, Some("/again"), 51),
            Err(Error::TooManyRedirects { limit: 50 })
        ));

        let config = ClientConfig::default().follow_redirects(false);
        match redirect_target(&config, &current, 308, Some("/next"), 1) {
            Err(Error::RedirectNotFollowed { status, location }) => {
                assert_eq!(status, 308);
                assert_eq!(location, "https://a.test/next");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
