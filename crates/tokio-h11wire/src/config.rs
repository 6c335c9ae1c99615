//! クライアント設定

use std::sync::Arc;
use std::time::Duration;

use h11wire::DecoderLimits;
use h11wire::uri::Uri;

/// デフォルトの I/O バッファサイズ
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
/// 1 つの確保領域から切り出すバッファ数
pub const DEFAULT_BUFFERS_PER_BACKING: usize = 64;
/// 接続先ごとの同時接続数の上限
pub const DEFAULT_MAX_CONNECTIONS_PER_DESTINATION: usize = 10;
/// デフォルトのリクエストタイムアウト
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(100_000);
/// デフォルトの接続タイムアウト
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// アイドル接続を再利用する期限
pub const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
/// リダイレクト回数の上限
pub const DEFAULT_MAX_REDIRECTS: usize = 50;

/// クライアント設定
///
/// すべての項目にデフォルト値があり、ビルダー形式で上書きする。
///
/// ```
/// use std::time::Duration;
/// use tokio_h11wire::ClientConfig;
///
/// let config = ClientConfig::default()
///     .request_timeout(Duration::from_secs(5))
///     .max_connections_per_destination(2)
///     .follow_redirects(false);
/// assert_eq!(config.max_redirects, 50);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// プールするバッファ 1 つのサイズ (デフォルト: 4096)
    pub buffer_size: usize,
    /// 1 つの確保領域から切り出すバッファ数 (デフォルト: 64)
    pub buffers_per_backing: usize,
    /// 接続先ごとに同時に使用中にできる接続数 (デフォルト: 10)
    pub max_connections_per_destination: usize,
    /// リクエスト全体の期限 (デフォルト: 100 秒)
    pub request_timeout: Duration,
    /// TCP 接続の期限 (デフォルト: 30 秒)
    pub connect_timeout: Duration,
    /// これより長くアイドルだった接続は再利用しない (デフォルト: 90 秒)
    pub pool_idle_timeout: Duration,
    /// リダイレクト回数の上限 (デフォルト: 50)
    pub max_redirects: usize,
    /// リダイレクトを自動で追従するか (デフォルト: true)
    pub follow_redirects: bool,
    /// 接続を再利用するか (デフォルト: true)
    pub keep_alive: bool,
    /// パーサーの制限
    pub limits: DecoderLimits,
    /// HTTPS 用の TLS 設定 (None なら OS のルート証明書ストアを使う)
    pub tls_config: Option<Arc<rustls::ClientConfig>>,
    /// http 宛てリクエストを中継する HTTP プロキシ
    pub proxy: Option<Uri>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            buffers_per_backing: DEFAULT_BUFFERS_PER_BACKING,
            max_connections_per_destination: DEFAULT_MAX_CONNECTIONS_PER_DESTINATION,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            follow_redirects: true,
            keep_alive: true,
            limits: DecoderLimits::default(),
            tls_config: None,
            proxy: None,
        }
    }
}

impl ClientConfig {
    /// バッファサイズを設定
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// 1 つの確保領域から切り出すバッファ数を設定
    pub fn buffers_per_backing(mut self, count: usize) -> Self {
        self.buffers_per_backing = count.max(1);
        self
    }

    /// 接続先ごとの同時接続数の上限を設定
    pub fn max_connections_per_destination(mut self, max: usize) -> Self {
        self.max_connections_per_destination = max.max(1);
        self
    }

    /// リクエストタイムアウトを設定
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 接続タイムアウトを設定
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// アイドル接続の再利用期限を設定
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// リダイレクト回数の上限を設定
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// リダイレクトの自動追従を設定
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// 接続の再利用を設定
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// パーサーの制限を設定
    pub fn limits(mut self, limits: DecoderLimits) -> Self {
        self.limits = limits;
        self
    }

    /// TLS 設定を指定 (HTTPS 用)
    pub fn tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// HTTP プロキシを指定
    ///
    /// http 宛てのリクエストだけがプロキシを経由する (absolute-form で送信)。
    pub fn proxy(mut self, proxy: Uri) -> Self {
        self.proxy = Some(proxy);
        self
    }
}
