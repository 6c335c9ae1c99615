//! レスポンスボディのフレーミング決定

use crate::error::ParseError;
use crate::headers::HeaderSet;

/// ボディの終わりを知るための規則
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// ボディなし (HEAD へのレスポンス、1xx / 204 / 304)
    None,
    /// Content-Length で指定された固定長
    ContentLength(u64),
    /// Transfer-Encoding: chunked
    Chunked,
    /// 接続が閉じるまでがボディ
    ///
    /// この場合の接続は再利用できない。
    CloseDelimited,
}

impl Framing {
    /// ボディを持つか
    pub fn has_body(&self) -> bool {
        !matches!(self, Framing::None | Framing::ContentLength(0))
    }
}

/// ステータスコードとヘッダーからフレーミングを決定
///
/// RFC 9112 Section 6.3 の優先順位:
/// 1. HEAD へのレスポンス、1xx / 204 / 304 はボディなし
/// 2. Transfer-Encoding の最後が chunked なら Chunked (Content-Length は無視する)
/// 3. chunked で終わらない Transfer-Encoding は close-delimited
/// 4. Content-Length があれば固定長。解析できない値、負の値、食い違う重複値は不正
/// 5. それ以外は close-delimited
pub fn resolve_framing(
    status_code: u16,
    headers: &HeaderSet,
    expect_no_body: bool,
) -> Result<Framing, ParseError> {
    if expect_no_body
        || (100..200).contains(&status_code)
        || status_code == 204
        || status_code == 304
    {
        return Ok(Framing::None);
    }

    if headers.contains("Transfer-Encoding") {
        let last = headers.tokens("Transfer-Encoding").last();
        return Ok(match last {
            Some(token) if token.eq_ignore_ascii_case("chunked") => Framing::Chunked,
            _ => Framing::CloseDelimited,
        });
    }

    if let Some(value) = headers.get("Content-Length") {
        return parse_content_length(value).map(Framing::ContentLength);
    }

    Ok(Framing::CloseDelimited)
}

/// Content-Length の値を解析
///
/// 重複ヘッダーは `,` で結合されているので、すべて同じ値であることを確認する。
fn parse_content_length(value: &str) -> Result<u64, ParseError> {
    let mut length: Option<u64> = None;
    for token in value.split(',') {
        let token = token.trim();
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::Invalid("invalid Content-Length"));
        }
        let parsed: u64 = token
            .parse()
            .map_err(|_| ParseError::Invalid("Content-Length overflow"))?;
        match length {
            Some(prev) if prev != parsed => {
                return Err(ParseError::Invalid("conflicting Content-Length values"));
            }
            _ => length = Some(parsed),
        }
    }
    length.ok_or(ParseError::Invalid("invalid Content-Length"))
}
