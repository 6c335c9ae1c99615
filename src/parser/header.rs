//! ヘッダーブロックパーサー
//!
//! 空行までのヘッダー行を読み、`HeaderSet` に追加する。
//! chunked のトレーラーでも同じ状態機械を使う。

use crate::error::ParseError;
use crate::headers::HeaderSet;

use super::{Progress, is_field_value_byte, is_token_char, latin1};

/// ヘッダーブロックパーサー
///
/// 1 行 (継続行を含む論理行) が完成するまでカーソルを進めない。
/// 継続行 (`CRLF SP` / `CRLF HTAB`) を判定するため、行末の CRLF の次の 1 バイトが
/// 見えるまで行は完成しない。
#[derive(Debug, Clone)]
pub struct HeaderParser {
    /// これまでに消費したバイト数
    consumed: usize,
    /// 上限
    limit: usize,
    done: bool,
}

impl HeaderParser {
    /// 新しいパーサーを作成
    pub fn new(limit: usize) -> Self {
        Self {
            consumed: 0,
            limit,
            done: false,
        }
    }

    /// 消費済みバイト数を引き継いで作成
    ///
    /// ステータス行のバイト数をヘッダーの上限に含めるために使う。
    pub fn with_consumed(limit: usize, consumed: usize) -> Self {
        Self {
            consumed,
            limit,
            done: false,
        }
    }

    /// これまでに消費したバイト数
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// 空行まで読み終えたか
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// 状態機械を進める
    ///
    /// 完成したヘッダー行ごとに `headers` に追加する。空行で `Done` を返す。
    pub fn advance(
        &mut self,
        window: &[u8],
        cursor: &mut usize,
        headers: &mut HeaderSet,
    ) -> Result<Progress, ParseError> {
        if self.done {
            return Ok(Progress::Done);
        }
        loop {
            let start = *cursor;
            let line = match scan_line(window, start)? {
                Some(line) => line,
                None => {
                    self.check_limit(window.len() - start)?;
                    return Ok(Progress::NeedMoreData);
                }
            };
            self.check_limit(line.next - start)?;

            if line.end == start {
                // 空行: ヘッダーブロック終端
                self.consumed += line.next - start;
                *cursor = line.next;
                self.done = true;
                return Ok(Progress::Done);
            }

            let (name, value) = split_field(&window[start..line.end])?;
            headers.append(&name, &value);
            self.consumed += line.next - start;
            *cursor = line.next;
        }
    }

    fn check_limit(&self, pending: usize) -> Result<(), ParseError> {
        let size = self.consumed.saturating_add(pending);
        if size > self.limit {
            return Err(ParseError::DataTooBig {
                size,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

/// 論理行の位置
struct Line {
    /// 最後の CR の位置 (値の終端)
    end: usize,
    /// 次の行の先頭
    next: usize,
}

/// `start` から始まる論理行を探す
///
/// 空行は次のバイトを待たずに確定する。
fn scan_line(window: &[u8], start: usize) -> Result<Option<Line>, ParseError> {
    let mut pos = start;
    loop {
        let Some(offset) = window[pos..].iter().position(|&b| b == b'\r') else {
            return Ok(None);
        };
        let cr = pos + offset;
        match window.get(cr + 1) {
            None => return Ok(None),
            Some(b'\n') => {}
            Some(_) => return Err(ParseError::Invalid("bare CR in header block")),
        }
        if cr == start {
            return Ok(Some(Line {
                end: cr,
                next: cr + 2,
            }));
        }
        match window.get(cr + 2) {
            None => return Ok(None),
            // 継続行
            Some(b' ' | b'\t') => pos = cr + 3,
            Some(_) => {
                return Ok(Some(Line {
                    end: cr,
                    next: cr + 2,
                }));
            }
        }
    }
}

/// `name: value` に分割する
///
/// 継続行は 1 つの SP で連結する。
fn split_field(line: &[u8]) -> Result<(String, String), ParseError> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or(ParseError::Invalid("header line without colon"))?;
    let name = &line[..colon];
    if name.is_empty() {
        return Err(ParseError::Invalid("empty header name"));
    }
    if !name.iter().all(|&b| is_token_char(b)) {
        return Err(ParseError::Invalid("invalid header name"));
    }

    let mut value = Vec::with_capacity(line.len() - colon);
    let mut segments = line[colon + 1..].split(|&b| b == b'\n').peekable();
    while let Some(segment) = segments.next() {
        // 最後以外のセグメントは継続行の CRLF で終わっている
        let segment = if segments.peek().is_some() {
            segment
                .strip_suffix(b"\r")
                .ok_or(ParseError::Invalid("bare LF in header value"))?
        } else {
            segment
        };
        if let Some(&b) = segment.iter().find(|&&b| !is_field_value_byte(b)) {
            return Err(if b == b'\r' || b == b'\n' {
                ParseError::Invalid("bare CR or LF in header value")
            } else {
                ParseError::Invalid("control character in header value")
            });
        }
        let trimmed = trim_ows(segment);
        if trimmed.is_empty() {
            continue;
        }
        if !value.is_empty() {
            value.push(b' ');
        }
        value.extend_from_slice(trimmed);
    }
    Ok((latin1(name), latin1(&value)))
}

fn trim_ows(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}
