//! レスポンスボディのテキスト / JSON 変換
//!
//! Content-Type の charset パラメーターに従ってボディを文字列にする。
//! 対応する charset は UTF-8 (既定)、US-ASCII、ISO-8859-1。
//! Content-Encoding による変換はしない。

use h11wire::{HeaderSet, Response};

use crate::body::StreamingResponse;
use crate::error::Result;

/// ボディの文字コード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// UTF-8
    Utf8,
    /// US-ASCII
    Ascii,
    /// ISO-8859-1
    Latin1,
}

impl Charset {
    /// Content-Type ヘッダーの charset パラメーターを取得
    ///
    /// ヘッダーやパラメーターがなければ UTF-8。
    pub fn from_headers(headers: &HeaderSet) -> std::result::Result<Self, DecodeError> {
        let Some(content_type) = headers.get("Content-Type") else {
            return Ok(Charset::Utf8);
        };
        for param in content_type.split(';').skip(1) {
            let Some((name, value)) = param.split_once('=') else {
                continue;
            };
            if !name.trim().eq_ignore_ascii_case("charset") {
                continue;
            }
            let label = value.trim().trim_matches('"');
            return Self::from_label(label)
                .ok_or_else(|| DecodeError::UnsupportedCharset(label.to_string()));
        }
        Ok(Charset::Utf8)
    }

    fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "us-ascii" | "ascii" => Some(Charset::Ascii),
            "iso-8859-1" | "iso8859-1" | "latin1" | "l1" => Some(Charset::Latin1),
            _ => None,
        }
    }

    /// バイト列を文字列にする
    pub fn decode(self, body: &[u8]) -> std::result::Result<String, DecodeError> {
        match self {
            Charset::Utf8 => std::str::from_utf8(body)
                .map(str::to_owned)
                .map_err(DecodeError::Utf8),
            Charset::Ascii => match body.iter().position(|b| !b.is_ascii()) {
                Some(position) => Err(DecodeError::NonAscii { position }),
                None => Ok(body.iter().map(|&b| char::from(b)).collect()),
            },
            Charset::Latin1 => Ok(body.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// バッファ済みレスポンスの拡張トレイト
pub trait ResponseExt {
    /// 宣言された charset でボディを文字列にする
    fn text(&self) -> std::result::Result<String, DecodeError>;

    /// ボディを JSON としてパースして型 T に変換
    fn json<T>(&self) -> std::result::Result<T, DecodeError>
    where
        for<'text, 'raw> T:
            TryFrom<nojson::RawJsonValue<'text, 'raw>, Error = nojson::JsonParseError>;
}

impl ResponseExt for Response {
    fn text(&self) -> std::result::Result<String, DecodeError> {
        Charset::from_headers(&self.headers)?.decode(&self.body)
    }

    fn json<T>(&self) -> std::result::Result<T, DecodeError>
    where
        for<'text, 'raw> T:
            TryFrom<nojson::RawJsonValue<'text, 'raw>, Error = nojson::JsonParseError>,
    {
        parse_json(&self.text()?)
    }
}

impl StreamingResponse {
    /// ボディを終端まで読み、宣言された charset で文字列にする
    ///
    /// 読み終えた接続はプールに返る。
    pub async fn text(self) -> Result<String> {
        let charset = Charset::from_headers(&self.headers)?;
        let body = self.into_body().collect().await?;
        Ok(charset.decode(&body)?)
    }

    /// ボディを終端まで読み、JSON としてパースする
    pub async fn json<T>(self) -> Result<T>
    where
        for<'text, 'raw> T:
            TryFrom<nojson::RawJsonValue<'text, 'raw>, Error = nojson::JsonParseError>,
    {
        let text = self.text().await?;
        Ok(parse_json(&text)?)
    }
}

fn parse_json<T>(text: &str) -> std::result::Result<T, DecodeError>
where
    for<'text, 'raw> T: TryFrom<nojson::RawJsonValue<'text, 'raw>, Error = nojson::JsonParseError>,
{
    let raw = nojson::RawJson::parse(text).map_err(DecodeError::Json)?;
    raw.value().try_into().map_err(DecodeError::Json)
}

/// ボディの変換エラー
#[derive(Debug)]
pub enum DecodeError {
    /// 対応していない charset
    UnsupportedCharset(String),
    /// UTF-8 として不正
    Utf8(std::str::Utf8Error),
    /// US-ASCII 以外のバイト
    NonAscii { position: usize },
    /// JSON パースエラー
    Json(nojson::JsonParseError),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnsupportedCharset(label) => write!(f, "unsupported charset: {}", label),
            DecodeError::Utf8(e) => write!(f, "UTF-8 decode error: {}", e),
            DecodeError::NonAscii { position } => {
                write!(f, "non-ASCII byte at offset {}", position)
            }
            DecodeError::Json(e) => write!(f, "JSON parse error: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Utf8(e) => Some(e),
            DecodeError::Json(e) => Some(e),
            _ => None,
        }
    }
}
