//! ステータス行パーサー
//!
//! `HTTP/major.minor SP status SP reason CRLF`

use crate::error::ParseError;

use super::{Progress, is_field_value_byte, latin1};

const LITERAL: &[u8] = b"HTTP/";

/// バージョン番号の最大桁数
const MAX_VERSION_DIGITS: usize = 3;

/// パース済みステータス行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// メジャーバージョン
    pub major: u16,
    /// マイナーバージョン
    pub minor: u16,
    /// ステータスコード (100-999)
    pub code: u16,
    /// 理由句
    pub reason: String,
}

impl StatusLine {
    /// `HTTP/1.1` 形式のバージョン文字列
    pub fn version(&self) -> String {
        format!("HTTP/{}.{}", self.major, self.minor)
    }

    /// HTTP/1.1 以降か
    pub fn is_http11_or_later(&self) -> bool {
        (self.major, self.minor) >= (1, 1)
    }
}

/// ステータス行のサブ状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLineState {
    /// `HTTP/` 待ち
    Literal,
    /// メジャーバージョンの数字と `.`
    MajorVersion,
    /// マイナーバージョンの数字と SP
    MinorVersion,
    /// 3 桁のステータスコードと区切り
    StatusCode,
    /// CR までの理由句
    ReasonPhrase,
    /// CR の後の LF
    LineFeed,
    /// 完了
    Done,
}

/// ステータス行パーサー
///
/// フィールド単位で再開可能。フィールドの途中でウィンドウが終わった場合は
/// カーソルをそのフィールドの先頭に残して `NeedMoreData` を返す。
#[derive(Debug, Clone)]
pub struct StatusLineParser {
    state: StatusLineState,
    major: u16,
    minor: u16,
    code: u16,
    reason: String,
}

impl Default for StatusLineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusLineParser {
    /// 新しいパーサーを作成
    pub fn new() -> Self {
        Self {
            state: StatusLineState::Literal,
            major: 0,
            minor: 0,
            code: 0,
            reason: String::new(),
        }
    }

    /// 現在のサブ状態
    pub fn state(&self) -> StatusLineState {
        self.state
    }

    /// リセット
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// 完了したステータス行を取り出す
    pub fn take(&mut self) -> Option<StatusLine> {
        if self.state != StatusLineState::Done {
            return None;
        }
        let line = StatusLine {
            major: self.major,
            minor: self.minor,
            code: self.code,
            reason: std::mem::take(&mut self.reason),
        };
        self.reset();
        Some(line)
    }

    /// 状態機械を進める
    ///
    /// ステータス行が完了すると `Done` を返す。
    pub fn advance(&mut self, window: &[u8], cursor: &mut usize) -> Result<Progress, ParseError> {
        loop {
            let progress = match self.state {
                StatusLineState::Literal => self.literal(window, cursor)?,
                StatusLineState::MajorVersion => self.major_version(window, cursor)?,
                StatusLineState::MinorVersion => self.minor_version(window, cursor)?,
                StatusLineState::StatusCode => self.status_code(window, cursor)?,
                StatusLineState::ReasonPhrase => self.reason_phrase(window, cursor)?,
                StatusLineState::LineFeed => self.line_feed(window, cursor)?,
                StatusLineState::Done => return Ok(Progress::Done),
            };
            if progress == Progress::NeedMoreData {
                return Ok(progress);
            }
        }
    }

    fn literal(&mut self, window: &[u8], cursor: &mut usize) -> Result<Progress, ParseError> {
        let available = &window[*cursor..];
        let len = available.len().min(LITERAL.len());
        if available[..len] != LITERAL[..len] {
            return Err(ParseError::Invalid("status line must start with HTTP/"));
        }
        if len < LITERAL.len() {
            return Ok(Progress::NeedMoreData);
        }
        *cursor += LITERAL.len();
        self.state = StatusLineState::MajorVersion;
        Ok(Progress::ContinueParsing)
    }

    fn major_version(&mut self, window: &[u8], cursor: &mut usize) -> Result<Progress, ParseError> {
        match scan_version(window, *cursor, b'.')? {
            Some((value, next)) => {
                self.major = value;
                *cursor = next;
                self.state = StatusLineState::MinorVersion;
                Ok(Progress::ContinueParsing)
            }
            None => Ok(Progress::NeedMoreData),
        }
    }

    fn minor_version(&mut self, window: &[u8], cursor: &mut usize) -> Result<Progress, ParseError> {
        match scan_version(window, *cursor, b' ')? {
            Some((value, next)) => {
                self.minor = value;
                *cursor = next;
                self.state = StatusLineState::StatusCode;
                Ok(Progress::ContinueParsing)
            }
            None => Ok(Progress::NeedMoreData),
        }
    }

    fn status_code(&mut self, window: &[u8], cursor: &mut usize) -> Result<Progress, ParseError> {
        let available = &window[*cursor..];
        let mut code: u16 = 0;
        for (i, &b) in available.iter().take(4).enumerate() {
            if i < 3 {
                if !b.is_ascii_digit() {
                    return Err(ParseError::Invalid("status code must be 3 digits"));
                }
                code = code * 10 + u16::from(b - b'0');
                continue;
            }
            if code < 100 {
                return Err(ParseError::Invalid("status code out of range"));
            }
            self.code = code;
            *cursor += 4;
            self.state = match b {
                b' ' => StatusLineState::ReasonPhrase,
                // 理由句なし (`HTTP/1.1 200\r\n`) は許容する
                b'\r' => StatusLineState::LineFeed,
                b if b.is_ascii_digit() => {
                    return Err(ParseError::Invalid("status code overflow"));
                }
                _ => return Err(ParseError::Invalid("expected SP after status code")),
            };
            return Ok(Progress::ContinueParsing);
        }
        Ok(Progress::NeedMoreData)
    }

    fn reason_phrase(&mut self, window: &[u8], cursor: &mut usize) -> Result<Progress, ParseError> {
        let available = &window[*cursor..];
        for (i, &b) in available.iter().enumerate() {
            if b == b'\r' {
                self.reason = latin1(&available[..i]);
                *cursor += i + 1;
                self.state = StatusLineState::LineFeed;
                return Ok(Progress::ContinueParsing);
            }
            if !is_field_value_byte(b) {
                return Err(ParseError::Invalid("control character in reason phrase"));
            }
        }
        Ok(Progress::NeedMoreData)
    }

    fn line_feed(&mut self, window: &[u8], cursor: &mut usize) -> Result<Progress, ParseError> {
        match window.get(*cursor) {
            None => Ok(Progress::NeedMoreData),
            Some(b'\n') => {
                *cursor += 1;
                self.state = StatusLineState::Done;
                Ok(Progress::Done)
            }
            Some(_) => Err(ParseError::Invalid("expected LF after status line")),
        }
    }
}

/// 数字列と終端文字を読む
///
/// 完了時は (値, 終端文字の次の位置) を返す。データ不足なら `None`。
fn scan_version(
    window: &[u8],
    start: usize,
    terminator: u8,
) -> Result<Option<(u16, usize)>, ParseError> {
    let mut value: u16 = 0;
    for (i, &b) in window[start..].iter().enumerate() {
        if b.is_ascii_digit() {
            if i >= MAX_VERSION_DIGITS {
                return Err(ParseError::Invalid("HTTP version number too long"));
            }
            value = value * 10 + u16::from(b - b'0');
            continue;
        }
        if i == 0 {
            return Err(ParseError::Invalid("expected digit in HTTP version"));
        }
        if b != terminator {
            return Err(ParseError::Invalid("malformed HTTP version"));
        }
        return Ok(Some((value, start + i + 1)));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> Result<(StatusLine, usize), ParseError> {
        let mut parser = StatusLineParser::new();
        let mut cursor = 0;
        match parser.advance(input, &mut cursor)? {
            Progress::Done => Ok((parser.take().unwrap(), cursor)),
            other => panic!("unexpected progress: {:?}", other),
        }
    }

    #[test]
    fn test_parse_basic_status_line() {
        let (line, cursor) = parse_all(b"HTTP/1.1 200 OK\r\nrest").unwrap();
        assert_eq!(line.major, 1);
        assert_eq!(line.minor, 1);
        assert_eq!(line.code, 200);
        assert_eq!(line.reason, "OK");
        assert_eq!(cursor, 17);
        assert_eq!(line.version(), "HTTP/1.1");
    }

    #[test]
    fn test_parse_reason_with_spaces() {
        let (line, _) = parse_all(b"HTTP/1.0 404 Not Found\r\n").unwrap();
        assert_eq!(line.reason, "Not Found");
        assert!(!line.is_http11_or_later());
    }

    #[test]
    fn test_parse_missing_reason() {
        let (line, _) = parse_all(b"HTTP/1.1 204\r\n").unwrap();
        assert_eq!(line.code, 204);
        assert_eq!(line.reason, "");

        let (line, _) = parse_all(b"HTTP/1.1 204 \r\n").unwrap();
        assert_eq!(line.reason, "");
    }

    #[test]
    fn test_reject_malformed_status_lines() {
        let cases: &[&[u8]] = &[
            b"HTTP/1.1TWO00 OK\r\n",
            b"HTTX/1.1 200 OK\r\n",
            b"http/1.1 200 OK\r\n",
            b"HTTP/.1 200 OK\r\n",
            b"HTTP/1. 200 OK\r\n",
            b"HTTP/1.1 20 OK\r\n",
            b"HTTP/1.1 2000 OK\r\n",
            b"HTTP/1.1 099 OK\r\n",
            b"HTTP/1.1 abc OK\r\n",
            b"HTTP/1.1 200 O\x01K\r\n",
            b"HTTP/1.1 200 OK\x7f\r\n",
            b"HTTP/1.1 200 OK\rX",
            b"HTTP/1234.1 200 OK\r\n",
        ];
        for case in cases {
            let mut parser = StatusLineParser::new();
            let mut cursor = 0;
            let result = parser.advance(case, &mut cursor);
            assert!(
                matches!(result, Err(ParseError::Invalid(_))),
                "{:?} should be invalid, got {:?}",
                String::from_utf8_lossy(case),
                result
            );
        }
    }

    #[test]
    fn test_early_invalid_on_partial_literal() {
        let mut parser = StatusLineParser::new();
        let mut cursor = 0;
        assert!(parser.advance(b"HTX", &mut cursor).is_err());
    }

    #[test]
    fn test_need_more_data_keeps_field_start() {
        let mut parser = StatusLineParser::new();
        let mut cursor = 0;

        assert_eq!(
            parser.advance(b"HTTP/1.1 2", &mut cursor).unwrap(),
            Progress::NeedMoreData
        );
        // バージョンまでは確定、ステータスコードは未確定
        assert_eq!(cursor, 9);
        assert_eq!(parser.state(), StatusLineState::StatusCode);

        // 呼び出し側は未消費部分を先頭に詰めたウィンドウを渡す
        let mut cursor = 0;
        assert_eq!(
            parser.advance(b"200 OK\r", &mut cursor).unwrap(),
            Progress::NeedMoreData
        );
        assert_eq!(parser.state(), StatusLineState::LineFeed);
        assert_eq!(cursor, 7);

        let mut cursor = 0;
        assert_eq!(parser.advance(b"\n", &mut cursor).unwrap(), Progress::Done);
        assert_eq!(parser.take().unwrap().code, 200);
    }

    #[test]
    fn test_obs_text_in_reason_is_preserved() {
        let (line, _) = parse_all(b"HTTP/1.1 200 caf\xe9\r\n").unwrap();
        assert_eq!(line.reason, "caf\u{e9}");
    }
}
