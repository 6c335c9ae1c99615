//! # h11wire
//!
//! 依存なしの HTTP/1.1 レスポンスパーサーとリクエストエンコーダー (Sans I/O)
//!
//! ## 特徴
//!
//! - **依存なし**: 標準ライブラリのみ使用
//! - **Sans I/O**: I/O を完全に分離した設計
//! - **再開可能**: 任意のバイト境界で分断された入力を、入力をコピーせずに解析する
//!
//! ## 使い方
//!
//! ```rust
//! use h11wire::{Request, ResponseDecoder};
//!
//! // リクエストを作成してエンコード
//! let request = Request::new("GET", "/")
//!     .header("Host", "example.com")
//!     .header("Connection", "close");
//! let bytes = request.encode();
//! assert!(bytes.starts_with(b"GET / HTTP/1.1\r\n"));
//!
//! // 受信データを分割して与えてもよい
//! let mut decoder = ResponseDecoder::new();
//! decoder.feed(b"HTTP/1.1 200 OK\r\nContent-");
//! assert!(decoder.decode().unwrap().is_none());
//! decoder.feed(b"Length: 5\r\n\r\nhello");
//! let response = decoder.decode().unwrap().unwrap();
//! assert_eq!(response.status_code, 200);
//! assert_eq!(response.body, b"hello");
//! ```
//!
//! より低レベルな状態機械は [`parser`] モジュールを参照。

mod decoder;
mod encoder;
mod error;
mod headers;
mod limits;
pub mod parser;
mod request;
mod response;
pub mod uri;

pub use decoder::ResponseDecoder;
pub use encoder::{encode_chunk, encode_chunks, encode_request, encode_response};
pub use error::ParseError;
pub use headers::HeaderSet;
pub use limits::{DEFAULT_MAX_HEADER_BYTES, DecoderLimits, MAX_CHUNK_SIZE};
pub use parser::{
    BodyDecoder, ChunkedDecoder, Framing, ParserState, Progress, ResponseHead,
    ResponseHeadParser, StatusLine,
};
pub use request::Request;
pub use response::Response;
