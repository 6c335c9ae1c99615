use crate::request::Request;
use crate::response::Response;

/// リクエストをエンコード
///
/// ボディがあるか、ボディを持つのが通常のメソッドで Content-Length も
/// Transfer-Encoding も指定されていない場合は Content-Length を付与する。
pub fn encode_request(request: &Request) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + request.body.len());

    // Request line: METHOD SP target SP VERSION CRLF
    buf.extend_from_slice(request.method.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(request.target.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(request.version.as_bytes());
    buf.extend_from_slice(b"\r\n");

    for (name, value) in &request.headers {
        push_header(&mut buf, name, value);
    }

    if (!request.body.is_empty() || request.expects_body())
        && !request.has_header("Content-Length")
        && !request.has_header("Transfer-Encoding")
    {
        push_header(&mut buf, "Content-Length", &request.body.len().to_string());
    }

    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(&request.body);
    buf
}

/// レスポンスをエンコード
///
/// 主にテスト用サーバーで使う。
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + response.body.len());

    // Status line: VERSION SP STATUS-CODE SP REASON-PHRASE CRLF
    buf.extend_from_slice(response.version.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(response.status_code.to_string().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(response.reason_phrase.as_bytes());
    buf.extend_from_slice(b"\r\n");

    for (name, value) in &response.headers {
        push_header(&mut buf, name, value);
    }

    if !response.has_header("Content-Length") && !response.has_header("Transfer-Encoding") {
        push_header(&mut buf, "Content-Length", &response.body.len().to_string());
    }

    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(&response.body);
    buf
}

fn push_header(buf: &mut Vec<u8>, name: &str, value: &str) {
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    // ヘッダー値は ISO-8859-1 として書き出す
    buf.extend(value.chars().map(|c| u8::try_from(c).unwrap_or(b'?')));
    buf.extend_from_slice(b"\r\n");
}

impl Request {
    /// リクエストをバイト列にエンコード
    pub fn encode(&self) -> Vec<u8> {
        encode_request(self)
    }
}

impl Response {
    /// レスポンスをバイト列にエンコード
    pub fn encode(&self) -> Vec<u8> {
        encode_response(self)
    }
}

/// Chunked Transfer Encoding 用のチャンクをエンコード
///
/// 空のデータを渡すと終端チャンク (0\r\n\r\n) を生成します。
pub fn encode_chunk(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return b"0\r\n\r\n".to_vec();
    }
    let mut buf = Vec::with_capacity(data.len() + 12);
    buf.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
    buf
}

/// 複数のデータを chunked 形式でエンコード
///
/// 空のデータは飛ばし、最後に終端チャンクを追加します。
pub fn encode_chunks(chunks: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::new();
    for chunk in chunks.iter().filter(|c| !c.is_empty()) {
        buf.extend_from_slice(&encode_chunk(chunk));
    }
    buf.extend_from_slice(b"0\r\n\r\n");
    buf
}
