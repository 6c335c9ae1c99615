//! tokio_h11wire - Tokio integration for h11wire
//!
//! tokio と tokio-rustls を使用した非同期 HTTP/1.1 クライアントトランスポート。
//!
//! ## 特徴
//!
//! - **h11wire ベース**: 再開可能な Sans I/O パーサーで受信ウィンドウを直接解析
//! - **コネクションプール**: 接続先ごとの上限と FIFO 待機、Keep-Alive 接続の再利用
//! - **リソースプール**: I/O バッファと I/O 記述子を lock-free なプールで使い回す
//! - **リダイレクト**: 自動追従 (上限 50 回)、https から http への降格は拒否
//! - **タイムアウトとキャンセル**: すべての待機点で期限と `CancellationToken` を確認
//! - **TLS 対応**: tokio-rustls による HTTPS 対応
//!
//! ## クライアント
//!
//! ```ignore
//! use tokio_h11wire::{Client, ClientConfig};
//!
//! // GET (プロセス共有のプールを使う)
//! let client = Client::new();
//! let response = client.get("http://example.com/path").await?;
//!
//! // 設定を変える場合は専用のプールを持つ
//! let client = Client::with_config(
//!     ClientConfig::default()
//!         .max_connections_per_destination(4)
//!         .request_timeout(std::time::Duration::from_secs(10)),
//! );
//!
//! // キャンセル
//! let token = tokio_util::sync::CancellationToken::new();
//! let response = client.get("https://example.com")
//!     .cancellation(token.clone())
//!     .await?;
//! ```

pub mod body;
pub mod channel;
pub mod client;
pub mod config;
pub mod connection_pool;
mod deadline;
pub mod destination;
pub mod error;
pub mod pool;
pub mod response_ext;

pub use body::{BodyStream, StreamingResponse};
pub use channel::{Channel, ChannelOptions};
pub use client::{Client, RequestBuilder};
pub use config::ClientConfig;
pub use connection_pool::{ConnectionPool, GroupStats, Lease};
pub use destination::DestinationKey;
pub use error::{Error, Result};
pub use pool::{BufferPool, IoDescriptor, Pool, Pooled, PooledBuffer};
pub use response_ext::{Charset, DecodeError, ResponseExt};

// h11wire の型を re-export
pub use h11wire::{HeaderSet, Request, Response};
pub use tokio_util::sync::CancellationToken;
