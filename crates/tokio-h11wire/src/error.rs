//! tokio-h11wire エラー型

use std::fmt;

use crate::response_ext::DecodeError;

/// tokio-h11wire エラー
#[derive(Debug)]
pub enum Error {
    /// I/O エラー
    Io(std::io::Error),
    /// レスポンスのパースエラー (不正データ / 上限超過)
    Parse(h11wire::ParseError),
    /// TLS エラー
    Tls(String),
    /// リクエストタイムアウト
    Timeout,
    /// 呼び出し側によるキャンセル
    Cancelled,
    /// レスポンスの途中で接続が閉じられた
    ConnectionClosed,
    /// 不正な URL
    InvalidUrl(String),
    /// DNS 解決エラー
    DnsResolution(String),
    /// リダイレクトレスポンスに Location ヘッダーがない
    MissingLocation { status: u16 },
    /// リダイレクト回数が上限を超えた
    TooManyRedirects { limit: usize },
    /// リダイレクトの自動追従が無効
    RedirectNotFollowed { status: u16, location: String },
    /// https から http へのリダイレクト
    InsecureRedirect { location: String },
    /// コネクションプールが閉じられている
    PoolClosed,
    /// ボディの文字列 / JSON 変換エラー
    Decode(DecodeError),
}

impl Error {
    /// プロトコル違反によるエラーか
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::MissingLocation { .. })
    }

    /// リダイレクトポリシーによるエラーか
    pub fn is_redirect_error(&self) -> bool {
        matches!(
            self,
            Error::MissingLocation { .. }
                | Error::TooManyRedirects { .. }
                | Error::RedirectNotFollowed { .. }
                | Error::InsecureRedirect { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Parse(e) => write!(f, "protocol error: {}", e),
            Error::Tls(e) => write!(f, "TLS error: {}", e),
            Error::Timeout => write!(f, "request timeout"),
            Error::Cancelled => write!(f, "request cancelled"),
            Error::ConnectionClosed => write!(f, "connection closed"),
            Error::InvalidUrl(msg) => write!(f, "invalid URL: {}", msg),
            Error::DnsResolution(msg) => write!(f, "DNS resolution error: {}", msg),
            Error::MissingLocation { status } => {
                write!(f, "redirect response {} without Location header", status)
            }
            Error::TooManyRedirects { limit } => {
                write!(f, "too many redirects (limit {})", limit)
            }
            Error::RedirectNotFollowed { status, location } => {
                write!(f, "redirect {} to {} not followed", status, location)
            }
            Error::InsecureRedirect { location } => {
                write!(f, "refused redirect from https to {}", location)
            }
            Error::PoolClosed => write!(f, "connection pool closed"),
            Error::Decode(e) => write!(f, "body decode error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Parse(e) => Some(e),
            Error::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<h11wire::ParseError> for Error {
    fn from(e: h11wire::ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

impl From<h11wire::uri::UriError> for Error {
    fn from(e: h11wire::uri::UriError) -> Self {
        Error::InvalidUrl(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Error::Tls(e.to_string())
    }
}

impl From<rustls_pki_types::InvalidDnsNameError> for Error {
    fn from(e: rustls_pki_types::InvalidDnsNameError) -> Self {
        Error::Tls(e.to_string())
    }
}

/// Result 型エイリアス
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let e = Error::from(h11wire::ParseError::Invalid("bad"));
        assert!(e.is_protocol_error());
        assert!(!e.is_redirect_error());
        assert_eq!(e.to_string(), "protocol error: invalid data: bad");

        let e = Error::TooManyRedirects { limit: 50 };
        assert!(e.is_redirect_error());
        assert_eq!(e.to_string(), "too many redirects (limit 50)");
    }
}
