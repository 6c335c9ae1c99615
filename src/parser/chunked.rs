//! chunked ボディデコーダー
//!
//! ```text
//! chunked-body = *chunk last-chunk trailer-section CRLF
//! chunk        = chunk-size [ chunk-ext ] CRLF chunk-data CRLF
//! last-chunk   = 1*("0") [ chunk-ext ] CRLF
//! ```

use crate::error::ParseError;
use crate::headers::HeaderSet;
use crate::limits::{DecoderLimits, MAX_CHUNK_SIZE};

use super::header::HeaderParser;
use super::{Progress, is_field_value_byte};

/// chunked デコーダーの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkDecoderState {
    /// チャンクサイズの 16 進数字 (と後続の空白)
    ChunkSize { digits: usize, whitespace: bool },
    /// `;name=value` 拡張 (解釈せず読み飛ばす)
    Extension { quoted: bool, escaped: bool },
    /// チャンクサイズ行の CR の後の LF
    ChunkSizeLineFeed,
    /// チャンクデータ
    Payload,
    /// チャンクデータ後の CRLF
    PayloadTrailingCrlf { cr_seen: bool },
    /// トレーラーヘッダー
    TrailerHeaders,
    /// 完了
    Done,
    /// エラー
    Error,
}

/// chunked ボディデコーダー
///
/// バイト単位の状態機械なので、ウィンドウがどこで切れていても
/// カーソルは常に消費したバイトの直後を指す。トレーラーのみ
/// ヘッダーブロックパーサーを使うため行単位で再開する。
#[derive(Debug, Clone)]
pub struct ChunkedDecoder {
    state: ChunkDecoderState,
    /// 読み取り中のチャンクサイズ
    size: u64,
    /// 現在のチャンクの残りバイト数
    remaining: u64,
    /// 現在のチャンクサイズ行の長さ
    line_len: usize,
    trailer_parser: HeaderParser,
    trailers: HeaderSet,
    limits: DecoderLimits,
    /// デコード済みボディの合計
    decoded: u64,
}

impl ChunkedDecoder {
    /// 新しいデコーダーを作成
    pub fn new(limits: DecoderLimits) -> Self {
        Self {
            state: ChunkDecoderState::ChunkSize {
                digits: 0,
                whitespace: false,
            },
            size: 0,
            remaining: 0,
            line_len: 0,
            trailer_parser: HeaderParser::new(limits.max_header_bytes),
            trailers: HeaderSet::new(),
            limits,
            decoded: 0,
        }
    }

    /// 現在の状態
    pub fn state(&self) -> ChunkDecoderState {
        self.state
    }

    /// 終端チャンクとトレーラーまで読み終えたか
    pub fn is_done(&self) -> bool {
        self.state == ChunkDecoderState::Done
    }

    /// 現在のチャンクの残りバイト数
    pub fn remaining_in_chunk(&self) -> u64 {
        self.remaining
    }

    /// デコード済みボディの合計バイト数
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// トレーラーヘッダー
    pub fn trailers(&self) -> &HeaderSet {
        &self.trailers
    }

    /// トレーラーヘッダーを取り出す
    pub fn take_trailers(&mut self) -> HeaderSet {
        std::mem::take(&mut self.trailers)
    }

    /// ウィンドウからボディを読み取る
    ///
    /// 戻り値の 2 番目は `out` にコピーしたバイト数。
    ///
    /// - チャンクデータをコピーした: `(ContinueParsing, n)`
    /// - 終端まで読み終えた: `(Done, 0)`
    /// - ウィンドウを使い切った: `(NeedMoreData, 0)`
    ///
    /// `out` が空の場合はフレーミングだけを進め、チャンクデータの手前で
    /// `(ContinueParsing, 0)` を返す。
    pub fn read(
        &mut self,
        window: &[u8],
        cursor: &mut usize,
        out: &mut [u8],
    ) -> Result<(Progress, usize), ParseError> {
        loop {
            match self.state {
                ChunkDecoderState::Done => return Ok((Progress::Done, 0)),
                ChunkDecoderState::Error => {
                    return Err(ParseError::Invalid("chunked decoder already failed"));
                }
                ChunkDecoderState::Payload => {
                    if out.is_empty() {
                        return Ok((Progress::ContinueParsing, 0));
                    }
                    let available = window.len() - *cursor;
                    if available == 0 {
                        return Ok((Progress::NeedMoreData, 0));
                    }
                    let n = out
                        .len()
                        .min(available)
                        .min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
                    out[..n].copy_from_slice(&window[*cursor..*cursor + n]);
                    *cursor += n;
                    self.remaining -= n as u64;
                    self.decoded += n as u64;
                    if self.remaining == 0 {
                        self.state = ChunkDecoderState::PayloadTrailingCrlf { cr_seen: false };
                    }
                    return Ok((Progress::ContinueParsing, n));
                }
                ChunkDecoderState::TrailerHeaders => {
                    let result = self
                        .trailer_parser
                        .advance(window, cursor, &mut self.trailers);
                    match result {
                        Ok(Progress::Done) => {
                            self.state = ChunkDecoderState::Done;
                            return Ok((Progress::Done, 0));
                        }
                        Ok(progress) => return Ok((progress, 0)),
                        Err(e) => {
                            self.state = ChunkDecoderState::Error;
                            return Err(e);
                        }
                    }
                }
                _ => {
                    let Some(&b) = window.get(*cursor) else {
                        return Ok((Progress::NeedMoreData, 0));
                    };
                    if let Err(e) = self.step(b) {
                        self.state = ChunkDecoderState::Error;
                        return Err(e);
                    }
                    *cursor += 1;
                }
            }
        }
    }

    /// フレーミング用の 1 バイトを処理
    fn step(&mut self, b: u8) -> Result<(), ParseError> {
        match self.state {
            ChunkDecoderState::ChunkSize { digits, whitespace } => {
                self.count_line_byte()?;
                if let Some(d) = hex_value(b) {
                    if whitespace {
                        return Err(ParseError::Invalid("whitespace inside chunk size"));
                    }
                    self.size = self.size * 16 + u64::from(d);
                    if self.size > self.limits.max_chunk_size.min(MAX_CHUNK_SIZE) {
                        return Err(ParseError::Invalid("chunk size too large"));
                    }
                    self.state = ChunkDecoderState::ChunkSize {
                        digits: digits + 1,
                        whitespace,
                    };
                    return Ok(());
                }
                if digits == 0 {
                    return Err(ParseError::Invalid("missing chunk size"));
                }
                self.state = match b {
                    b' ' | b'\t' => ChunkDecoderState::ChunkSize {
                        digits,
                        whitespace: true,
                    },
                    b';' => ChunkDecoderState::Extension {
                        quoted: false,
                        escaped: false,
                    },
                    b'\r' => ChunkDecoderState::ChunkSizeLineFeed,
                    _ => return Err(ParseError::Invalid("invalid chunk size")),
                };
            }
            ChunkDecoderState::Extension { quoted, escaped } => {
                self.count_line_byte()?;
                if b == b'\n' || (b == b'\r' && quoted) {
                    return Err(ParseError::Invalid("line break inside chunk extension"));
                }
                if !is_field_value_byte(b) && b != b'\r' {
                    return Err(ParseError::Invalid("control character in chunk extension"));
                }
                self.state = match (quoted, escaped, b) {
                    (true, true, _) => ChunkDecoderState::Extension {
                        quoted: true,
                        escaped: false,
                    },
                    (true, false, b'\\') => ChunkDecoderState::Extension {
                        quoted: true,
                        escaped: true,
                    },
                    (true, false, b'"') | (false, _, b'"') => ChunkDecoderState::Extension {
                        quoted: !quoted,
                        escaped: false,
                    },
                    (false, _, b'\r') => ChunkDecoderState::ChunkSizeLineFeed,
                    _ => self.state,
                };
            }
            ChunkDecoderState::ChunkSizeLineFeed => {
                if b != b'\n' {
                    return Err(ParseError::Invalid("expected LF after chunk size"));
                }
                self.line_len = 0;
                if self.size == 0 {
                    self.state = ChunkDecoderState::TrailerHeaders;
                } else {
                    self.remaining = self.size;
                    self.size = 0;
                    self.state = ChunkDecoderState::Payload;
                }
            }
            ChunkDecoderState::PayloadTrailingCrlf { cr_seen: false } => {
                if b != b'\r' {
                    return Err(ParseError::Invalid("expected CRLF after chunk data"));
                }
                self.state = ChunkDecoderState::PayloadTrailingCrlf { cr_seen: true };
            }
            ChunkDecoderState::PayloadTrailingCrlf { cr_seen: true } => {
                if b != b'\n' {
                    return Err(ParseError::Invalid("expected CRLF after chunk data"));
                }
                self.state = ChunkDecoderState::ChunkSize {
                    digits: 0,
                    whitespace: false,
                };
            }
            ChunkDecoderState::Payload
            | ChunkDecoderState::TrailerHeaders
            | ChunkDecoderState::Done
            | ChunkDecoderState::Error => {
                return Err(ParseError::Invalid("unexpected chunked decoder state"));
            }
        }
        Ok(())
    }

    fn count_line_byte(&mut self) -> Result<(), ParseError> {
        self.line_len += 1;
        if self.line_len > self.limits.max_header_bytes {
            return Err(ParseError::DataTooBig {
                size: self.line_len,
                limit: self.limits.max_header_bytes,
            });
        }
        Ok(())
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ウィンドウを `step` バイトずつ広げながら全体をデコードする
    fn decode_fragmented(input: &[u8], step: usize, out_len: usize) -> Result<Vec<u8>, ParseError> {
        let mut decoder = ChunkedDecoder::new(DecoderLimits::default());
        let mut body = Vec::new();
        let mut out = vec![0u8; out_len];
        let mut cursor = 0;
        let mut filled = step.min(input.len());
        loop {
            let (progress, n) = decoder.read(&input[..filled], &mut cursor, &mut out)?;
            body.extend_from_slice(&out[..n]);
            match progress {
                Progress::Done => return Ok(body),
                Progress::ContinueParsing => {}
                Progress::NeedMoreData => {
                    assert!(filled < input.len(), "ran out of input");
                    filled = (filled + step).min(input.len());
                }
            }
        }
    }

    #[test]
    fn test_decode_single_chunk() {
        let body = decode_fragmented(b"5\r\nhello\r\n0\r\n\r\n", 64, 64).unwrap();
        assert_eq!(body, b"hello");
    }

    #[test]
    fn test_decode_every_split() {
        let input = b"3\r\nabc\r\nA;name=value;q=\"x;\\\"y\"\r\n0123456789\r\n0\r\nX-Trailer: yes\r\n\r\n";
        for step in 1..input.len() {
            for out_len in [1, 2, 7, 64] {
                let body = decode_fragmented(input, step, out_len).unwrap();
                assert_eq!(body, b"abc0123456789", "step={} out_len={}", step, out_len);
            }
        }
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(decode_fragmented(b"0\r\n\r\n", 1, 8).unwrap(), b"");
    }

    #[test]
    fn test_trailers_are_kept() {
        let mut decoder = ChunkedDecoder::new(DecoderLimits::default());
        let input = b"0\r\nExpires: never\r\nX-Sum: 1\r\n\r\n";
        let mut cursor = 0;
        let (progress, n) = decoder.read(input, &mut cursor, &mut [0u8; 8]).unwrap();
        assert_eq!((progress, n), (Progress::Done, 0));
        assert_eq!(cursor, input.len());
        assert_eq!(decoder.trailers().get("x-sum"), Some("1"));
    }

    #[test]
    fn test_empty_out_advances_framing_only() {
        let mut decoder = ChunkedDecoder::new(DecoderLimits::default());
        let input = b"2\r\nok\r\n0\r\n\r\n";
        let mut cursor = 0;
        assert_eq!(
            decoder.read(input, &mut cursor, &mut []).unwrap(),
            (Progress::ContinueParsing, 0)
        );
        assert_eq!(cursor, 3);
        assert_eq!(decoder.state(), ChunkDecoderState::Payload);

        let mut out = [0u8; 2];
        assert_eq!(
            decoder.read(input, &mut cursor, &mut out).unwrap(),
            (Progress::ContinueParsing, 2)
        );
        assert_eq!(&out, b"ok");
        assert_eq!(
            decoder.read(input, &mut cursor, &mut []).unwrap(),
            (Progress::Done, 0)
        );
    }

    #[test]
    fn test_missing_crlf_after_data() {
        let mut decoder = ChunkedDecoder::new(DecoderLimits::default());
        let mut cursor = 0;
        let mut out = [0u8; 16];
        let input = b"3\r\nabcX\r\n0\r\n\r\n";
        let (_, n) = decoder.read(input, &mut cursor, &mut out).unwrap();
        assert_eq!(n, 3);
        assert!(matches!(
            decoder.read(input, &mut cursor, &mut out),
            Err(ParseError::Invalid(_))
        ));
        assert_eq!(decoder.state(), ChunkDecoderState::Error);
        assert!(decoder.read(input, &mut cursor, &mut out).is_err());
    }

    #[test]
    fn test_reject_bad_sizes() {
        let cases: &[&[u8]] = &[
            b"\r\n",
            b"g\r\n",
            b"-1\r\n",
            b"+5\r\n",
            b"80000000\r\n",
            b"ffffffffffffffffff\r\n",
            b"5 5\r\n",
            b"5\rx",
            b"5;a\nb\r\n",
        ];
        for case in cases {
            let mut decoder = ChunkedDecoder::new(DecoderLimits::default());
            let mut cursor = 0;
            let result = decoder.read(case, &mut cursor, &mut [0u8; 8]);
            assert!(
                matches!(result, Err(ParseError::Invalid(_))),
                "{:?} should be invalid, got {:?}",
                String::from_utf8_lossy(case),
                result
            );
        }
    }

    #[test]
    fn test_max_chunk_size_is_accepted() {
        let mut decoder = ChunkedDecoder::new(DecoderLimits::default());
        let mut cursor = 0;
        let input = b"7fffffff\r\n";
        let (progress, _) = decoder.read(input, &mut cursor, &mut []).unwrap();
        assert_eq!(progress, Progress::ContinueParsing);
        assert_eq!(decoder.remaining_in_chunk(), 0x7fff_ffff);
    }

    #[test]
    fn test_long_extension_is_too_big() {
        let limits = DecoderLimits::default().max_header_bytes(16);
        let mut decoder = ChunkedDecoder::new(limits);
        let mut cursor = 0;
        let input = b"1;aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n";
        assert!(matches!(
            decoder.read(input, &mut cursor, &mut [0u8; 1]),
            Err(ParseError::DataTooBig { .. })
        ));
    }
}
