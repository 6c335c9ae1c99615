use std::future::poll_fn;
use std::io;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};

use futures_util::task::AtomicWaker;
use parking_lot::Mutex;

const IDLE: u8 = 0;
const WAITING: u8 = 1;
const COMPLETE: u8 = 2;

/// 進行中の操作の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Read,
    Write,
}

/// 1 回分の完了通知スロット
///
/// 完了側は結果を書いてから状態を `COMPLETE` に swap する。
/// swap 前の状態が `WAITING` なら待機側を起こす。
/// 待機側は waker を登録してから `IDLE -> WAITING` を試み、失敗すれば完了済み。
#[derive(Debug)]
pub struct CompletionSlot {
    state: AtomicU8,
    waker: AtomicWaker,
    result: Mutex<Option<io::Result<usize>>>,
}

impl CompletionSlot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            waker: AtomicWaker::new(),
            result: Mutex::new(None),
        }
    }

    fn reset(&self) {
        self.result.lock().take();
        self.state.store(IDLE, Ordering::Release);
    }

    /// 完了を通知する
    ///
    /// すでに完了していれば何もせず false を返す。
    pub fn complete(&self, result: io::Result<usize>) -> bool {
        {
            let mut slot = self.result.lock();
            if slot.is_some() || self.state.load(Ordering::Acquire) == COMPLETE {
                return false;
            }
            *slot = Some(result);
        }
        if self.state.swap(COMPLETE, Ordering::AcqRel) == WAITING {
            self.waker.wake();
        }
        true
    }

    /// 完了済みか
    pub fn is_complete(&self) -> bool {
        self.state.load(Ordering::Acquire) == COMPLETE
    }

    fn poll_complete(&self, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        if self.state.load(Ordering::Acquire) != COMPLETE {
            self.waker.register(cx.waker());
            match self
                .state
                .compare_exchange(IDLE, WAITING, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) | Err(WAITING) => return Poll::Pending,
                Err(_) => {}
            }
        }
        let result = self
            .result
            .lock()
            .take()
            .unwrap_or_else(|| Err(io::Error::other("completion already consumed")));
        Poll::Ready(result)
    }
}

/// 非同期 I/O 記述子
///
/// バッファ上の操作ウィンドウ (offset / count) と完了スロットを束ねる。
/// 同時に進行できる操作は 1 つだけ。
#[derive(Debug)]
pub struct IoDescriptor {
    slot: Arc<CompletionSlot>,
    kind: Option<OpKind>,
    offset: usize,
    count: usize,
    operations: u64,
}

impl Default for IoDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl IoDescriptor {
    /// 新しい記述子を作成
    pub fn new() -> Self {
        Self {
            slot: Arc::new(CompletionSlot::new()),
            kind: None,
            offset: 0,
            count: 0,
            operations: 0,
        }
    }

    /// 操作ウィンドウを設定して完了スロットを初期化する
    pub fn bind(&mut self, kind: OpKind, offset: usize, count: usize) -> Range<usize> {
        // 古い完了ハンドルが残っていれば新しいスロットに切り替える
        if Arc::strong_count(&self.slot) > 1 {
            self.slot = Arc::new(CompletionSlot::new());
        } else {
            self.slot.reset();
        }
        self.kind = Some(kind);
        self.offset = offset;
        self.count = count;
        offset..offset + count
    }

    /// 進行中の操作の種類
    pub fn kind(&self) -> Option<OpKind> {
        self.kind
    }

    /// 操作ウィンドウ
    pub fn window(&self) -> Range<usize> {
        self.offset..self.offset + self.count
    }

    /// 完了した操作の累計
    pub fn operations(&self) -> u64 {
        self.operations
    }

    /// 別タスクから完了を通知するためのハンドル
    pub fn completer(&self) -> Arc<CompletionSlot> {
        Arc::clone(&self.slot)
    }

    /// 完了を通知する
    pub fn complete(&self, result: io::Result<usize>) -> bool {
        self.slot.complete(result)
    }

    /// 完了済みか
    pub fn is_complete(&self) -> bool {
        self.slot.is_complete()
    }

    /// 完了を待つ
    ///
    /// 完了が即時でも後からでも同じ経路で結果を受け取る。
    pub fn poll_complete(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        let result = std::task::ready!(self.slot.poll_complete(cx));
        self.kind = None;
        self.operations += 1;
        Poll::Ready(result)
    }

    /// 完了を待つ
    pub async fn wait(&mut self) -> io::Result<usize> {
        poll_fn(|cx| self.poll_complete(cx)).await
    }
}
