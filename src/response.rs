use crate::headers::HeaderSet;
use crate::parser::ResponseHead;

/// HTTP レスポンス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP バージョン (HTTP/1.1 等)
    pub version: String,
    /// ステータスコード (200, 404, etc.)
    pub status_code: u16,
    /// ステータスフレーズ (OK, Not Found, etc.)
    pub reason_phrase: String,
    /// ヘッダー
    pub headers: HeaderSet,
    /// ボディ
    pub body: Vec<u8>,
    /// chunked ボディのトレーラー
    pub trailers: HeaderSet,
}

impl Response {
    /// 新しいレスポンスを作成 (HTTP/1.1)
    pub fn new(status_code: u16, reason_phrase: &str) -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status_code,
            reason_phrase: reason_phrase.to_string(),
            headers: HeaderSet::new(),
            body: Vec::new(),
            trailers: HeaderSet::new(),
        }
    }

    /// パース済みヘッドとボディからレスポンスを組み立てる
    pub fn from_head(head: ResponseHead, body: Vec<u8>) -> Self {
        Self {
            version: head.status.version(),
            status_code: head.status.code,
            reason_phrase: head.status.reason,
            headers: head.headers,
            body,
            trailers: HeaderSet::new(),
        }
    }

    /// ヘッダーを追加 (ビルダーパターン)
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    /// ボディを設定 (ビルダーパターン)
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// ヘッダーを取得 (大文字小文字を区別しない)
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// ヘッダーが存在するか確認
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    /// ステータスコードが成功 (2xx) か確認
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// ステータスコードがリダイレクト (3xx) か確認
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    /// ステータスコードがクライアントエラー (4xx) か確認
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    /// ステータスコードがサーバーエラー (5xx) か確認
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code)
    }

    /// ステータスコードが情報レスポンス (1xx) か確認
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status_code)
    }

    /// キープアライブ接続かどうかを判定
    ///
    /// HTTP/1.1 ではデフォルトでキープアライブ
    /// HTTP/1.0 では Connection: keep-alive が必要
    pub fn is_keep_alive(&self) -> bool {
        if self.headers.has_token("Connection", "close") {
            return false;
        }
        self.version.ends_with("/1.1") || self.headers.has_token("Connection", "keep-alive")
    }

    /// Content-Length ヘッダーの値を取得
    pub fn content_length(&self) -> Option<u64> {
        self.get_header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
    }

    /// Transfer-Encoding の最後が chunked か
    pub fn is_chunked(&self) -> bool {
        self.headers
            .tokens("Transfer-Encoding")
            .last()
            .is_some_and(|t| t.eq_ignore_ascii_case("chunked"))
    }

    /// Content-Encoding (圧縮方式) を取得
    ///
    /// ボディは変換しない。`identity` は `None` として扱う。
    pub fn content_encoding(&self) -> Option<&str> {
        self.headers
            .tokens("Content-Encoding")
            .last()
            .filter(|t| !t.eq_ignore_ascii_case("identity"))
    }

    /// Location ヘッダーを取得
    pub fn location(&self) -> Option<&str> {
        self.get_header("Location")
    }
}
