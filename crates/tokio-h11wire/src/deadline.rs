use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// リクエスト全体の期限とキャンセル
///
/// すべての待機点を `run()` で包む。
#[derive(Debug, Clone, Default)]
pub(crate) struct Deadline {
    at: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl Deadline {
    /// 期限が表現できないほど遠い場合は期限なしとして扱う
    pub(crate) fn new(timeout: Option<Duration>, cancel: Option<CancellationToken>) -> Self {
        Self {
            at: timeout.and_then(|t| Instant::now().checked_add(t)),
            cancel,
        }
    }

    pub(crate) async fn run<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timed = async {
            match self.at {
                Some(at) => tokio::time::timeout_at(at, future).await?,
                None => future.await,
            }
        };
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(Error::Cancelled),
                    result = timed => result,
                }
            }
            None => timed.await,
        }
    }
}
