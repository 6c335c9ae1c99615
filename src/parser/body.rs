//! ボディデコーダー

use crate::error::ParseError;
use crate::headers::HeaderSet;
use crate::limits::DecoderLimits;

use super::Progress;
use super::chunked::ChunkedDecoder;
use super::framing::Framing;

/// Content-Length の固定長ボディデコーダー
#[derive(Debug, Clone)]
pub struct FixedLengthDecoder {
    remaining: u64,
}

impl FixedLengthDecoder {
    /// 新しいデコーダーを作成
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    /// 残りバイト数
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// 読み終えたか
    pub fn is_done(&self) -> bool {
        self.remaining == 0
    }

    /// ウィンドウからボディを読み取る
    ///
    /// 残りが 0 になった時点で `Done` を返す。
    pub fn read(
        &mut self,
        window: &[u8],
        cursor: &mut usize,
        out: &mut [u8],
    ) -> Result<(Progress, usize), ParseError> {
        if self.remaining == 0 {
            return Ok((Progress::Done, 0));
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
        let progress = if self.remaining == 0 {
            Progress::Done
        } else {
            Progress::ContinueParsing
        };
        Ok((progress, n))
    }
}

/// フレーミングごとのボディデコーダー
#[derive(Debug, Clone)]
pub enum BodyDecoder {
    /// ボディなし
    Empty,
    /// 固定長
    Fixed(FixedLengthDecoder),
    /// chunked
    Chunked(ChunkedDecoder),
    /// 接続が閉じるまで
    UntilClose { eof: bool },
}

impl BodyDecoder {
    /// フレーミングからデコーダーを作成
    pub fn new(framing: Framing, limits: DecoderLimits) -> Self {
        match framing {
            Framing::None | Framing::ContentLength(0) => BodyDecoder::Empty,
            Framing::ContentLength(n) => BodyDecoder::Fixed(FixedLengthDecoder::new(n)),
            Framing::Chunked => BodyDecoder::Chunked(ChunkedDecoder::new(limits)),
            Framing::CloseDelimited => BodyDecoder::UntilClose { eof: false },
        }
    }

    /// ボディを読み終えたか
    pub fn is_done(&self) -> bool {
        match self {
            BodyDecoder::Empty => true,
            BodyDecoder::Fixed(d) => d.is_done(),
            BodyDecoder::Chunked(d) => d.is_done(),
            BodyDecoder::UntilClose { eof } => *eof,
        }
    }

    /// ボディ完了後に接続を再利用できるフレーミングか
    pub fn is_reusable_framing(&self) -> bool {
        !matches!(self, BodyDecoder::UntilClose { .. })
    }

    /// chunked のトレーラー
    pub fn trailers(&self) -> Option<&HeaderSet> {
        match self {
            BodyDecoder::Chunked(d) if d.is_done() => Some(d.trailers()),
            _ => None,
        }
    }

    /// ウィンドウからボディを読み取る
    pub fn read(
        &mut self,
        window: &[u8],
        cursor: &mut usize,
        out: &mut [u8],
    ) -> Result<(Progress, usize), ParseError> {
        match self {
            BodyDecoder::Empty => Ok((Progress::Done, 0)),
            BodyDecoder::Fixed(d) => d.read(window, cursor, out),
            BodyDecoder::Chunked(d) => d.read(window, cursor, out),
            BodyDecoder::UntilClose { eof } => {
                let available = window.len() - *cursor;
                if available == 0 {
                    let progress = if *eof {
                        Progress::Done
                    } else {
                        Progress::NeedMoreData
                    };
                    return Ok((progress, 0));
                }
                let n = out.len().min(available);
                out[..n].copy_from_slice(&window[*cursor..*cursor + n]);
                *cursor += n;
                Ok((Progress::ContinueParsing, n))
            }
        }
    }

    /// 接続が閉じたことを通知
    ///
    /// close-delimited ならボディが確定する。それ以外で途中ならボディが途切れている。
    pub fn on_eof(&mut self) -> Result<(), ParseError> {
        if let BodyDecoder::UntilClose { eof } = self {
            *eof = true;
            return Ok(());
        }
        if self.is_done() {
            Ok(())
        } else {
            Err(ParseError::Invalid("connection closed before end of body"))
        }
    }
}
