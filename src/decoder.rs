//! バッファ付きレスポンスデコーダー (Sans I/O)
//!
//! 受信したバイト列を `feed` で渡し、`decode_head` / `read_body` で取り出す。
//! パーサーはウィンドウを借りるだけなので、このデコーダーが受信バッファを
//! 所有してカーソルの管理と詰め直しを行う。

use crate::error::ParseError;
use crate::headers::HeaderSet;
use crate::limits::DecoderLimits;
use crate::parser::{BodyDecoder, Progress, ResponseHead, ResponseHeadParser};
use crate::response::Response;

/// `decode()` が 1 回の呼び出しで本文を取り出す単位
const BODY_READ_CHUNK: usize = 4096;

/// HTTP レスポンスデコーダー
#[derive(Debug)]
pub struct ResponseDecoder {
    buf: Vec<u8>,
    /// `buf` 内の未消費データの先頭
    pos: usize,
    parser: ResponseHeadParser,
    body: Option<BodyDecoder>,
    limits: DecoderLimits,
    /// decode() 用: デコード済みヘッド
    decoded_head: Option<ResponseHead>,
    /// decode() 用: デコード済みボディ
    decoded_body: Vec<u8>,
    /// 直前に完了した chunked ボディのトレーラー
    trailers: HeaderSet,
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseDecoder {
    /// 新しいデコーダーを作成
    pub fn new() -> Self {
        Self::with_limits(DecoderLimits::default())
    }

    /// 制限付きでデコーダーを作成
    pub fn with_limits(limits: DecoderLimits) -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            parser: ResponseHeadParser::new(limits.clone()),
            body: None,
            limits,
            decoded_head: None,
            decoded_body: Vec::new(),
            trailers: HeaderSet::new(),
        }
    }

    /// HEAD リクエストへのレスポンスとしてデコード (ボディなし)
    pub fn set_expect_no_body(&mut self, expect_no_body: bool) {
        self.parser.set_expect_no_body(expect_no_body);
    }

    /// 制限設定を取得
    pub fn limits(&self) -> &DecoderLimits {
        &self.limits
    }

    /// バッファにデータを追加
    pub fn feed(&mut self, data: &[u8]) {
        if self.pos > 0 && self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        } else if self.pos > self.buf.len() / 2 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(data);
    }

    /// バッファの未消費データを取得
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// ボディを読み取り中か
    pub fn is_reading_body(&self) -> bool {
        self.body.is_some()
    }

    /// デコーダーをリセット
    ///
    /// バッファに残ったデータは破棄する。
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.parser.reset();
        self.body = None;
        self.decoded_head = None;
        self.decoded_body.clear();
        self.trailers.clear();
    }

    /// レスポンスヘッドをデコード
    ///
    /// ヘッドが揃っていなければ `None` を返す。中間レスポンス (1xx) も
    /// そのまま返し、デコーダーは次のヘッドの待ち受けに戻る。
    pub fn decode_head(&mut self) -> Result<Option<ResponseHead>, ParseError> {
        if self.body.is_some() {
            return Ok(None);
        }
        loop {
            match self.parser.advance(&self.buf, &mut self.pos)? {
                Progress::NeedMoreData => return Ok(None),
                Progress::ContinueParsing => continue,
                Progress::Done => break,
            }
        }
        let head = self
            .parser
            .take_head()
            .ok_or(ParseError::Invalid("missing response head"))?;
        if head.is_interim() {
            self.parser.reset();
        } else {
            self.body = Some(BodyDecoder::new(head.framing, self.limits.clone()));
        }
        Ok(Some(head))
    }

    /// ボディを `out` に読み取る
    ///
    /// ボディの終端に達すると `(Done, n)` を返し、次のレスポンスを待ち受ける。
    pub fn read_body(&mut self, out: &mut [u8]) -> Result<(Progress, usize), ParseError> {
        let Some(body) = self.body.as_mut() else {
            return Err(ParseError::Invalid("response head not decoded"));
        };
        let (progress, n) = body.read(&self.buf, &mut self.pos, out)?;
        if progress == Progress::Done {
            if let Some(BodyDecoder::Chunked(mut decoder)) = self.body.take() {
                self.trailers = decoder.take_trailers();
            }
            self.body = None;
            self.parser.reset();
        }
        Ok((progress, n))
    }

    /// 直前に完了したボディのトレーラーを取り出す
    pub fn take_trailers(&mut self) -> HeaderSet {
        std::mem::take(&mut self.trailers)
    }

    /// 接続終了を通知
    ///
    /// close-delimited ボディはここで確定する。それ以外のボディの途中なら
    /// 途切れたレスポンスとしてエラーを返す。
    pub fn mark_eof(&mut self) -> Result<(), ParseError> {
        let drained = self.remaining().is_empty();
        match self.body.as_mut() {
            Some(body) => body.on_eof(),
            None if drained => Ok(()),
            None => Err(ParseError::Invalid("connection closed before end of head")),
        }
    }

    /// レスポンス全体をデコード
    ///
    /// 中間レスポンスは読み飛ばす。レスポンスが揃っていなければ `None` を返す。
    pub fn decode(&mut self) -> Result<Option<Response>, ParseError> {
        while self.decoded_head.is_none() {
            match self.decode_head()? {
                None => return Ok(None),
                Some(head) if head.is_interim() => continue,
                Some(head) => self.decoded_head = Some(head),
            }
        }

        let mut chunk = [0u8; BODY_READ_CHUNK];
        loop {
            let (progress, n) = self.read_body(&mut chunk)?;
            self.decoded_body.extend_from_slice(&chunk[..n]);
            match progress {
                Progress::Done => break,
                Progress::ContinueParsing => continue,
                Progress::NeedMoreData => return Ok(None),
            }
        }

        let trailers = self.take_trailers();
        let Some(head) = self.decoded_head.take() else {
            return Ok(None);
        };
        let mut response = Response::from_head(head, std::mem::take(&mut self.decoded_body));
        response.trailers = trailers;
        Ok(Some(response))
    }
}
