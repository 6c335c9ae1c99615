//! レスポンスヘッド (ステータス行 + ヘッダーブロック) パーサー

use crate::error::ParseError;
use crate::headers::HeaderSet;
use crate::limits::DecoderLimits;

use super::Progress;
use super::framing::{Framing, resolve_framing};
use super::header::HeaderParser;
use super::status::{StatusLine, StatusLineParser, StatusLineState};

/// パーサー全体の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// ステータス行を読み取り中
    AwaitingStatusLine(StatusLineState),
    /// ヘッダーブロックを読み取り中
    AwaitingHeaders,
    /// ヘッドは完了し、ボディが続く
    AwaitingBody,
    /// ボディのないレスポンスのヘッドが完了
    Done,
    /// エラー (以後の入力はすべて拒否)
    Error,
}

/// パース済みレスポンスヘッド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// ステータス行
    pub status: StatusLine,
    /// ヘッダー
    pub headers: HeaderSet,
    /// ボディのフレーミング
    pub framing: Framing,
}

impl ResponseHead {
    /// ステータスコード
    pub fn status_code(&self) -> u16 {
        self.status.code
    }

    /// 中間レスポンス (101 を除く 1xx) か
    pub fn is_interim(&self) -> bool {
        (100..200).contains(&self.status.code) && self.status.code != 101
    }

    /// リダイレクトとして扱うステータスか
    pub fn is_redirect(&self) -> bool {
        matches!(self.status.code, 300 | 301 | 302 | 303 | 307 | 308)
    }

    /// Location ヘッダー
    pub fn location(&self) -> Option<&str> {
        self.headers.get("Location")
    }

    /// サーバーが接続の維持を許可しているか
    ///
    /// `Connection: close` があれば false。HTTP/1.0 は `keep-alive` トークンが必要。
    /// close-delimited ボディの接続は再利用できない。
    pub fn is_keep_alive(&self) -> bool {
        if self.framing == Framing::CloseDelimited || self.headers.has_token("Connection", "close")
        {
            return false;
        }
        self.status.is_http11_or_later() || self.headers.has_token("Connection", "keep-alive")
    }
}

/// レスポンスヘッドパーサー
///
/// ステータス行が完了した時点で一度 `ContinueParsing` を返し、
/// 空行まで読み終えると `Done` を返す。ボディは扱わない。
#[derive(Debug, Clone)]
pub struct ResponseHeadParser {
    state: ParserState,
    limits: DecoderLimits,
    status_parser: StatusLineParser,
    /// ステータス行で消費したバイト数
    status_bytes: usize,
    status: Option<StatusLine>,
    header_parser: HeaderParser,
    headers: HeaderSet,
    expect_no_body: bool,
    head: Option<ResponseHead>,
}

impl ResponseHeadParser {
    /// 新しいパーサーを作成
    pub fn new(limits: DecoderLimits) -> Self {
        Self {
            state: ParserState::AwaitingStatusLine(StatusLineState::Literal),
            status_parser: StatusLineParser::new(),
            status_bytes: 0,
            status: None,
            header_parser: HeaderParser::new(limits.max_header_bytes),
            headers: HeaderSet::new(),
            expect_no_body: false,
            head: None,
            limits,
        }
    }

    /// 現在の状態
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// 制限設定
    pub fn limits(&self) -> &DecoderLimits {
        &self.limits
    }

    /// HEAD リクエストへのレスポンスとして扱う (ボディなし)
    pub fn set_expect_no_body(&mut self, expect_no_body: bool) {
        self.expect_no_body = expect_no_body;
    }

    /// 次のレスポンスのために状態を初期化
    ///
    /// 制限設定と `expect_no_body` は維持する。
    pub fn reset(&mut self) {
        let expect_no_body = self.expect_no_body;
        *self = Self::new(self.limits.clone());
        self.expect_no_body = expect_no_body;
    }

    /// 完了したヘッドを取り出す
    pub fn take_head(&mut self) -> Option<ResponseHead> {
        self.head.take()
    }

    /// 状態機械を進める
    pub fn advance(&mut self, window: &[u8], cursor: &mut usize) -> Result<Progress, ParseError> {
        let result = match self.state {
            ParserState::AwaitingStatusLine(_) => self.advance_status_line(window, cursor),
            ParserState::AwaitingHeaders => self.advance_headers(window, cursor),
            ParserState::AwaitingBody | ParserState::Done => Ok(Progress::Done),
            ParserState::Error => Err(ParseError::Invalid("parser already failed")),
        };
        if result.is_err() {
            self.state = ParserState::Error;
        }
        result
    }

    fn advance_status_line(
        &mut self,
        window: &[u8],
        cursor: &mut usize,
    ) -> Result<Progress, ParseError> {
        let start = *cursor;
        let progress = self.status_parser.advance(window, cursor)?;
        self.status_bytes += *cursor - start;

        let pending = if progress == Progress::NeedMoreData {
            window.len() - *cursor
        } else {
            0
        };
        let size = self.status_bytes + pending;
        if size > self.limits.max_header_bytes {
            return Err(ParseError::DataTooBig {
                size,
                limit: self.limits.max_header_bytes,
            });
        }

        if progress == Progress::NeedMoreData {
            self.state = ParserState::AwaitingStatusLine(self.status_parser.state());
            return Ok(Progress::NeedMoreData);
        }

        self.status = self.status_parser.take();
        self.header_parser =
            HeaderParser::with_consumed(self.limits.max_header_bytes, self.status_bytes);
        self.state = ParserState::AwaitingHeaders;
        Ok(Progress::ContinueParsing)
    }

    fn advance_headers(
        &mut self,
        window: &[u8],
        cursor: &mut usize,
    ) -> Result<Progress, ParseError> {
        let progress = self
            .header_parser
            .advance(window, cursor, &mut self.headers)?;
        if progress != Progress::Done {
            return Ok(progress);
        }

        let status = self
            .status
            .take()
            .ok_or(ParseError::Invalid("missing status line"))?;
        let framing = resolve_framing(status.code, &self.headers, self.expect_no_body)?;
        self.state = if framing.has_body() {
            ParserState::AwaitingBody
        } else {
            ParserState::Done
        };
        self.head = Some(ResponseHead {
            status,
            headers: std::mem::take(&mut self.headers),
            framing,
        });
        Ok(Progress::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(parser: &mut ResponseHeadParser, window: &[u8], cursor: &mut usize) -> Progress {
        loop {
            match parser.advance(window, cursor).unwrap() {
                Progress::ContinueParsing => continue,
                other => return other,
            }
        }
    }

    #[test]
    fn test_parse_head() {
        let mut parser = ResponseHeadParser::new(DecoderLimits::default());
        let window = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        let mut cursor = 0;

        assert_eq!(
            parser.advance(window, &mut cursor).unwrap(),
            Progress::ContinueParsing
        );
        assert_eq!(parser.state(), ParserState::AwaitingHeaders);
        assert_eq!(parser.advance(window, &mut cursor).unwrap(), Progress::Done);
        assert_eq!(parser.state(), ParserState::AwaitingBody);

        let head = parser.take_head().unwrap();
        assert_eq!(head.status_code(), 200);
        assert_eq!(head.headers.get("Content-Length"), Some("5"));
        assert_eq!(head.framing, Framing::ContentLength(5));
        assert!(head.is_keep_alive());
        assert_eq!(&window[cursor..], b"hello");
    }

    #[test]
    fn test_head_without_body_is_done() {
        let mut parser = ResponseHeadParser::new(DecoderLimits::default());
        let window = b"HTTP/1.1 204 No Content\r\n\r\n";
        let mut cursor = 0;
        assert_eq!(drive(&mut parser, window, &mut cursor), Progress::Done);
        assert_eq!(parser.state(), ParserState::Done);
        assert_eq!(parser.take_head().unwrap().framing, Framing::None);
    }

    #[test]
    fn test_limit_includes_status_line() {
        let limits = DecoderLimits::default().max_header_bytes(24);
        let mut parser = ResponseHeadParser::new(limits);
        let window = b"HTTP/1.1 200 OK\r\nX-A: 1\r\n\r\n";
        let mut cursor = 0;
        let result = loop {
            match parser.advance(window, &mut cursor) {
                Ok(Progress::ContinueParsing) => continue,
                other => break other,
            }
        };
        assert!(matches!(result, Err(ParseError::DataTooBig { limit: 24, .. })));
        assert_eq!(parser.state(), ParserState::Error);
    }

    #[test]
    fn test_long_status_line_is_too_big() {
        let limits = DecoderLimits::default().max_header_bytes(16);
        let mut parser = ResponseHeadParser::new(limits);
        let mut cursor = 0;
        let result = parser.advance(b"HTTP/1.1 200 A very long reason", &mut cursor);
        assert!(matches!(result, Err(ParseError::DataTooBig { .. })));
    }

    #[test]
    fn test_error_state_is_sticky() {
        let mut parser = ResponseHeadParser::new(DecoderLimits::default());
        let mut cursor = 0;
        assert!(parser.advance(b"HTTP/1.1TWO00 OK\r\n", &mut cursor).is_err());
        let mut cursor = 0;
        assert!(
            parser
                .advance(b"HTTP/1.1 200 OK\r\n\r\n", &mut cursor)
                .is_err()
        );
    }

    #[test]
    fn test_reset_keeps_expect_no_body() {
        let mut parser = ResponseHeadParser::new(DecoderLimits::default());
        parser.set_expect_no_body(true);
        let mut cursor = 0;
        let window = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\n";
        assert_eq!(drive(&mut parser, window, &mut cursor), Progress::Done);
        assert!(parser.take_head().unwrap().is_interim());

        parser.reset();
        assert_eq!(drive(&mut parser, window, &mut cursor), Progress::Done);
        let head = parser.take_head().unwrap();
        assert_eq!(head.status_code(), 200);
        assert_eq!(head.framing, Framing::None);
        assert_eq!(cursor, window.len());
    }

    #[test]
    fn test_http10_needs_keep_alive_token() {
        let mut parser = ResponseHeadParser::new(DecoderLimits::default());
        let mut cursor = 0;
        let window = b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\n\r\n";
        drive(&mut parser, window, &mut cursor);
        assert!(!parser.take_head().unwrap().is_keep_alive());

        let mut parser = ResponseHeadParser::new(DecoderLimits::default());
        let mut cursor = 0;
        let window = b"HTTP/1.0 200 OK\r\nConnection: Keep-Alive\r\nContent-Length: 0\r\n\r\n";
        drive(&mut parser, window, &mut cursor);
        assert!(parser.take_head().unwrap().is_keep_alive());
    }

    #[test]
    fn test_connection_close_disables_reuse() {
        let mut parser = ResponseHeadParser::new(DecoderLimits::default());
        let mut cursor = 0;
        let window = b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";
        drive(&mut parser, window, &mut cursor);
        assert!(!parser.take_head().unwrap().is_keep_alive());
    }
}
