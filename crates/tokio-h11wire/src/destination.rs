//! 接続先キー

use std::fmt;

use h11wire::uri::Uri;

use crate::error::{Error, Result};

/// 接続先 (scheme, host, port) とプロキシ
///
/// 同じキーのリクエストは接続を共有する。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationKey {
    scheme: String,
    host: String,
    port: u16,
    proxy: Option<(String, u16)>,
}

impl DestinationKey {
    /// 接続先キーを作成
    pub fn new(scheme: &str, host: &str, port: u16) -> Self {
        Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port,
            proxy: None,
        }
    }

    /// 絶対 URI から接続先キーを作成
    pub fn from_uri(uri: &Uri) -> Result<Self> {
        let scheme = uri
            .scheme()
            .ok_or_else(|| Error::InvalidUrl(format!("missing scheme: {}", uri)))?;
        if scheme != "http" && scheme != "https" {
            return Err(Error::InvalidUrl(format!("unsupported scheme: {}", scheme)));
        }
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidUrl(format!("missing host: {}", uri)))?;
        let port = uri
            .port_or_default()
            .ok_or_else(|| Error::InvalidUrl(format!("missing port: {}", uri)))?;
        Ok(Self::new(scheme, host, port))
    }

    /// プロキシ経由の接続先にする
    ///
    /// https はトンネルを張らないためプロキシを使わない。
    pub fn with_proxy(mut self, host: &str, port: u16) -> Self {
        if !self.is_secure() {
            self.proxy = Some((host.to_ascii_lowercase(), port));
        }
        self
    }

    /// スキーム
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// ホスト
    pub fn host(&self) -> &str {
        &self.host
    }

    /// ポート
    pub fn port(&self) -> u16 {
        self.port
    }

    /// TLS で接続するか
    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// プロキシ
    pub fn proxy(&self) -> Option<(&str, u16)> {
        self.proxy.as_ref().map(|(h, p)| (h.as_str(), *p))
    }

    /// 実際に TCP 接続するホストとポート
    pub fn connect_authority(&self) -> (&str, u16) {
        self.proxy().unwrap_or((&self.host, self.port))
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)?;
        if let Some((host, port)) = &self.proxy {
            write!(f, " via {}:{}", host, port)?;
        }
        Ok(())
    }
}

/// IPv6 リテラルの角括弧を外す
pub(crate) fn unbracket(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}
