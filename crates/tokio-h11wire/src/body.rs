//! レスポンスボディのストリーム

use h11wire::{BodyDecoder, HeaderSet, Progress, Response, ResponseHead};
use tracing::trace;

use crate::connection_pool::Lease;
use crate::deadline::Deadline;
use crate::error::{Error, Result};

const CHUNK_SIZE: usize = 8192;

/// レスポンスボディのストリーム
///
/// ボディの終端まで読むと接続をプールに返す。
/// 途中で drop した場合、接続は閉じられる。
#[derive(Debug)]
pub struct BodyStream {
    lease: Option<Lease>,
    decoder: BodyDecoder,
    keep_alive: bool,
    deadline: Deadline,
    finished: bool,
    trailers: HeaderSet,
}

impl BodyStream {
    pub(crate) fn new(
        lease: Lease,
        decoder: BodyDecoder,
        keep_alive: bool,
        deadline: Deadline,
    ) -> Self {
        Self {
            lease: Some(lease),
            decoder,
            keep_alive,
            deadline,
            finished: false,
            trailers: HeaderSet::new(),
        }
    }

    /// ボディの終端まで読んだか
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// chunked ボディのトレーラー (終端まで読んだ後に有効)
    pub fn trailers(&self) -> &HeaderSet {
        &self.trailers
    }

    /// ボディを `out` に読み込む
    ///
    /// 0 を返したらボディの終端 (`out` が空の場合も 0)。
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() || self.finished {
            return Ok(0);
        }
        let (n, done) = self.read_inner(out).await?;
        if done {
            self.finish().await;
        }
        Ok(n)
    }

    /// 次のチャンクを読む
    pub async fn chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = self.read(&mut buf).await?;
            if n > 0 {
                buf.truncate(n);
                return Ok(Some(buf));
            }
            if self.finished {
                return Ok(None);
            }
        }
    }

    /// 残りのボディをすべて読む
    pub async fn collect(mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        while let Some(chunk) = self.chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    /// ボディを読み捨て、再利用できる接続を返す
    pub(crate) async fn drain(mut self) -> Result<Option<Lease>> {
        let mut scratch = vec![0u8; CHUNK_SIZE];
        loop {
            let (_, done) = self.read_inner(&mut scratch).await?;
            if done {
                break;
            }
        }
        self.finished = true;
        self.take_trailers();
        let Some(lease) = self.lease.take() else {
            return Ok(None);
        };
        if self.is_reusable(&lease) {
            Ok(Some(lease))
        } else {
            lease.release(false).await;
            Ok(None)
        }
    }

    async fn read_inner(&mut self, out: &mut [u8]) -> Result<(usize, bool)> {
        loop {
            let step = match self.step(out) {
                Ok(step) => step,
                Err(e) => {
                    self.abort();
                    return Err(e);
                }
            };
            match step {
                (Progress::Done, n) => return Ok((n, true)),
                (Progress::ContinueParsing, 0) => continue,
                (Progress::ContinueParsing, n) => return Ok((n, false)),
                (Progress::NeedMoreData, _) => {
                    let Some(lease) = self.lease.as_mut() else {
                        return Err(Error::ConnectionClosed);
                    };
                    let read = self.deadline.run(lease.channel_mut().read()).await;
                    match read {
                        Ok(0) => {
                            trace!("connection closed while reading body");
                            if let Err(e) = self.decoder.on_eof() {
                                self.abort();
                                return Err(e.into());
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            self.abort();
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    fn step(&mut self, out: &mut [u8]) -> Result<(Progress, usize)> {
        let Some(lease) = self.lease.as_mut() else {
            return Err(Error::ConnectionClosed);
        };
        let channel = lease.channel_mut();
        let mut cursor = 0;
        let result = self.decoder.read(channel.window(), &mut cursor, out);
        channel.consume(cursor);
        Ok(result?)
    }

    fn take_trailers(&mut self) {
        if let BodyDecoder::Chunked(decoder) = &mut self.decoder {
            self.trailers = decoder.take_trailers();
        }
    }

    fn is_reusable(&self, lease: &Lease) -> bool {
        self.keep_alive
            && self.decoder.is_reusable_framing()
            && lease.channel().window().is_empty()
    }

    async fn finish(&mut self) {
        self.finished = true;
        self.take_trailers();
        if let Some(lease) = self.lease.take() {
            let reusable = self.is_reusable(&lease);
            trace!(reusable, "body finished");
            lease.release(reusable).await;
        }
    }

    fn abort(&mut self) {
        self.finished = true;
        if let Some(lease) = self.lease.take() {
            lease.discard();
        }
    }
}

impl Drop for BodyStream {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            trace!("body stream dropped before end of body");
            lease.discard();
        }
    }
}

/// ボディをストリームで受け取るレスポンス
#[derive(Debug)]
pub struct StreamingResponse {
    /// HTTP バージョン (HTTP/1.1 等)
    pub version: String,
    /// ステータスコード
    pub status_code: u16,
    /// ステータスフレーズ
    pub reason_phrase: String,
    /// ヘッダー
    pub headers: HeaderSet,
    body: BodyStream,
}

impl StreamingResponse {
    pub(crate) fn new(head: ResponseHead, body: BodyStream) -> Self {
        Self {
            version: head.status.version(),
            status_code: head.status.code,
            reason_phrase: head.status.reason,
            headers: head.headers,
            body,
        }
    }

    /// ヘッダーを取得 (大文字小文字を区別しない)
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// ボディストリーム
    pub fn body_mut(&mut self) -> &mut BodyStream {
        &mut self.body
    }

    /// ボディストリームを取り出す
    pub fn into_body(self) -> BodyStream {
        self.body
    }

    /// ボディをすべて読み、バッファ済みのレスポンスにする
    pub async fn into_response(self) -> Result<Response> {
        let StreamingResponse {
            version,
            status_code,
            reason_phrase,
            headers,
            mut body,
        } = self;
        let mut data = Vec::new();
        while let Some(chunk) = body.chunk().await? {
            data.extend_from_slice(&chunk);
        }
        Ok(Response {
            version,
            status_code,
            reason_phrase,
            headers,
            body: data,
            trailers: std::mem::take(&mut body.trailers),
        })
    }
}
