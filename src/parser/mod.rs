//! インクリメンタルパーサー
//!
//! 呼び出し側が所有するバイト列のウィンドウと、その中のカーソル位置を受け取って
//! 状態機械を進める。パーサーはバイト列をコピーせず、整数のカーソルと
//! 小さな累積値だけを状態として持つ。
//!
//! すべての `advance` / `read` は次の 5 種類の結果のいずれかを返す。
//!
//! | 結果 | 型 |
//! |---|---|
//! | データ不足 | `Ok(Progress::NeedMoreData)` |
//! | 区切りまで進んだので続けて呼ぶ | `Ok(Progress::ContinueParsing)` |
//! | 完了 | `Ok(Progress::Done)` |
//! | 不正データ | `Err(ParseError::Invalid(_))` |
//! | 上限超過 | `Err(ParseError::DataTooBig { .. })` |
//!
//! `NeedMoreData` を返した場合、カーソルは未完成のフィールドの先頭に置かれている。
//! 呼び出し側はカーソル以降のバイトを保持したままウィンドウをずらす (または広げる) し、
//! 新しいウィンドウと新しいカーソルで再度呼び出す。
//!
//! ```rust
//! use h11wire::{DecoderLimits, Progress, ResponseHeadParser};
//!
//! let mut parser = ResponseHeadParser::new(DecoderLimits::default());
//! let window = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
//! let mut cursor = 0;
//! loop {
//!     match parser.advance(window, &mut cursor).unwrap() {
//!         Progress::Done => break,
//!         Progress::ContinueParsing => continue,
//!         Progress::NeedMoreData => unreachable!(),
//!     }
//! }
//! let head = parser.take_head().unwrap();
//! assert_eq!(head.status.code, 200);
//! assert_eq!(&window[cursor..], b"hello");
//! ```

mod body;
mod chunked;
mod framing;
mod head;
mod header;
mod status;

pub use body::{BodyDecoder, FixedLengthDecoder};
pub use chunked::{ChunkDecoderState, ChunkedDecoder};
pub use framing::{Framing, resolve_framing};
pub use head::{ParserState, ResponseHead, ResponseHeadParser};
pub use header::HeaderParser;
pub use status::{StatusLine, StatusLineParser, StatusLineState};

/// パーサーの進捗
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// ウィンドウの途中でフィールドが終わっていない
    NeedMoreData,
    /// 区切りに到達した。続けて呼び出す
    ContinueParsing,
    /// 完了
    Done,
}

/// バイト列を ISO-8859-1 として文字列化する
///
/// ヘッダー値の obs-text を失わずに保持するため UTF-8 としては解釈しない。
pub(crate) fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// RFC 9110 の token 文字か
pub(crate) fn is_token_char(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'0'..=b'9' | b'A'..=b'Z' | b'^' | b'_' | b'`' | b'a'..=b'z' | b'|' | b'~'
    )
}

/// フィールド値として許可されるバイトか (HTAB, SP, VCHAR, obs-text)
pub(crate) fn is_field_value_byte(b: u8) -> bool {
    b == b'\t' || (b >= 0x20 && b != 0x7f)
}
