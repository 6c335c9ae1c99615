//! 接続先ごとのコネクションプール
//!
//! 接続先キーごとにグループを持ち、グループは接続のリストと上限 (ceiling) を管理する。
//! 上限に達した取得要求は FIFO で待機し、解放された接続 (または空いた枠) を先頭の待機者に直接渡す。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::channel::{Channel, ChannelOptions};
use crate::config::ClientConfig;
use crate::destination::DestinationKey;
use crate::error::{Error, Result};
use crate::pool::{BufferPool, IoDescriptor, Pool};

/// コネクションプール
pub struct ConnectionPool {
    groups: Mutex<HashMap<DestinationKey, Arc<Group>>>,
    max_header_bytes: usize,
    buffers: BufferPool,
    descriptors: Arc<Pool<IoDescriptor>>,
    options: ChannelOptions,
    default_ceiling: usize,
    idle_timeout: Duration,
    closed: AtomicBool,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("groups", &self.groups.lock().len())
            .field("buffers", &self.buffers)
            .field("descriptors", &self.descriptors)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl ConnectionPool {
    /// 設定からプールを作成
    pub fn new(config: &ClientConfig) -> Arc<Self> {
        let max_window = config
            .buffer_size
            .max(config.limits.max_header_bytes.saturating_add(config.buffer_size));
        Arc::new(Self {
            groups: Mutex::new(HashMap::new()),
            max_header_bytes: max_window.saturating_sub(config.buffer_size),
            buffers: BufferPool::new(config.buffer_size, config.buffers_per_backing),
            descriptors: Pool::new(config.buffers_per_backing, IoDescriptor::new),
            options: ChannelOptions {
                connect_timeout: config.connect_timeout,
                max_window,
                tls_config: config.tls_config.clone(),
            },
            default_ceiling: config.max_connections_per_destination.max(1),
            idle_timeout: config.pool_idle_timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// プロセス全体で共有するプール (デフォルト設定)
    ///
    /// 初回呼び出し時に作成され、破棄されない。
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<ConnectionPool>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| ConnectionPool::new(&ClientConfig::default()))
            .clone()
    }

    /// バッファプール
    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// 受信ウィンドウに収まるヘッダーの最大バイト数
    ///
    /// これより大きい `max_header_bytes` を使うと、パーサーより先に受信ウィンドウが上限に達する。
    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    /// I/O 記述子プール
    pub fn descriptors(&self) -> &Arc<Pool<IoDescriptor>> {
        &self.descriptors
    }

    /// 接続を借りる
    ///
    /// アイドル接続があれば再利用し、なければ上限の範囲で新しく接続する。
    /// 上限に達している場合は接続が返却されるまで待つ。
    pub async fn acquire(&self, key: &DestinationKey) -> Result<Lease> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::PoolClosed);
            }
            let group = self.group(key);
            let grant = match group.try_acquire() {
                Attempt::Granted(grant) => grant,
                Attempt::Wait(rx) => {
                    debug!(destination = %key, "waiting for a channel");
                    rx.await.map_err(|_| Error::PoolClosed)?
                }
                Attempt::Closed => return Err(Error::PoolClosed),
            };

            match grant {
                Grant::Channel(lease) => {
                    if lease.channel().is_reusable(self.idle_timeout) {
                        debug!(destination = %key, "reusing channel");
                        return Ok(lease);
                    }
                    // 枠を手放さずに接続し直す。待機列の順番はそのまま
                    let (reservation, stale) = lease.into_reservation();
                    debug!(destination = %key, "closing stale channel");
                    stale.close().await;
                    if let Some(reservation) = reservation {
                        return self.open(reservation).await;
                    }
                }
                Grant::Slot(reservation) => return self.open(reservation).await,
            }
        }
    }

    async fn open(&self, reservation: Reservation) -> Result<Lease> {
        let key = reservation.group.key.clone();
        let channel = Channel::connect(
            key,
            self.buffers.checkout(),
            self.descriptors.checkout(),
            &self.options,
        )
        .await?;
        Ok(reservation.attach(channel))
    }

    /// 接続先の上限を変更する
    ///
    /// 下げる場合は `min(接続数 - 新しい上限, アイドル数)` 本のアイドル接続を
    /// アイドルになった順に閉じる。使用中の接続は閉じない。上げる場合は待機者を起こす。
    pub async fn set_ceiling(&self, key: &DestinationKey, ceiling: usize) {
        let group = self.group(key);
        let closing = group.set_ceiling(ceiling);
        for channel in closing {
            channel.close().await;
        }
    }

    /// 接続先の統計
    pub fn stats(&self, key: &DestinationKey) -> Option<GroupStats> {
        let group = self.groups.lock().get(key).cloned()?;
        Some(group.stats())
    }

    /// プールを閉じる
    ///
    /// アイドル接続を閉じ、待機中の取得要求と以後の取得要求を `PoolClosed` で失敗させる。
    /// 使用中の接続は返却時に閉じる。
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let groups = self.groups.lock().values().cloned().collect::<Vec<_>>();
        for group in groups {
            for channel in group.close() {
                channel.close().await;
            }
        }
    }

    fn group(&self, key: &DestinationKey) -> Arc<Group> {
        let mut groups = self.groups.lock();
        groups
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Group::new(key.clone(), self.default_ceiling)))
            .clone()
    }
}

/// 接続先グループの統計
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupStats {
    /// 接続数 (接続中を含む)
    pub channels: usize,
    /// アイドル接続数
    pub idle: usize,
    /// 接続処理中の枠
    pub connecting: usize,
    /// 待機中の取得要求
    pub waiters: usize,
    /// 上限
    pub ceiling: usize,
}

struct Entry {
    id: u64,
    busy: AtomicBool,
    channel: Option<Channel>,
}

struct GroupState {
    entries: Vec<Entry>,
    connecting: usize,
    ceiling: usize,
    waiters: VecDeque<oneshot::Sender<Grant>>,
    next_id: u64,
    closed: bool,
}

impl GroupState {
    fn channels(&self) -> usize {
        self.entries.len() + self.connecting
    }

    fn pop_waiter(&mut self) -> Option<oneshot::Sender<Grant>> {
        while let Some(tx) = self.waiters.pop_front() {
            if !tx.is_closed() {
                return Some(tx);
            }
        }
        None
    }
}

struct Group {
    key: DestinationKey,
    state: Mutex<GroupState>,
}

enum Grant {
    Channel(Lease),
    Slot(Reservation),
}

enum Attempt {
    Granted(Grant),
    Wait(oneshot::Receiver<Grant>),
    Closed,
}

impl Group {
    fn new(key: DestinationKey, ceiling: usize) -> Self {
        Self {
            key,
            state: Mutex::new(GroupState {
                entries: Vec::new(),
                connecting: 0,
                ceiling,
                waiters: VecDeque::new(),
                next_id: 0,
                closed: false,
            }),
        }
    }

    fn try_acquire(self: &Arc<Self>) -> Attempt {
        let mut state = self.state.lock();
        if state.closed {
            return Attempt::Closed;
        }
        state.waiters.retain(|tx| !tx.is_closed());
        if state.waiters.is_empty() {
            if let Some(lease) = self.claim_idle(&mut state) {
                return Attempt::Granted(Grant::Channel(lease));
            }
            if state.channels() < state.ceiling {
                state.connecting += 1;
                return Attempt::Granted(Grant::Slot(Reservation::new(Arc::clone(self))));
            }
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        Attempt::Wait(rx)
    }

    /// リスト順に走査し、最初のアイドル接続を CAS で確保する
    fn claim_idle(self: &Arc<Self>, state: &mut GroupState) -> Option<Lease> {
        for entry in &mut state.entries {
            if entry
                .busy
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }
            match entry.channel.take() {
                Some(channel) => {
                    return Some(Lease::new(Arc::clone(self), entry.id, channel));
                }
                None => entry.busy.store(false, Ordering::Release),
            }
        }
        None
    }

    /// 待機者に接続か空き枠を渡す
    fn dispatch(self: &Arc<Self>, state: &mut GroupState) {
        while let Some(tx) = state.pop_waiter() {
            if let Some(lease) = self.claim_idle(state) {
                if let Err(Grant::Channel(lease)) = tx.send(Grant::Channel(lease)) {
                    let (id, channel) = lease.into_parts();
                    Self::restore_idle(state, id, channel);
                }
                continue;
            }
            if state.channels() < state.ceiling {
                state.connecting += 1;
                if let Err(Grant::Slot(reservation)) =
                    tx.send(Grant::Slot(Reservation::new(Arc::clone(self))))
                {
                    reservation.disarm();
                    state.connecting -= 1;
                }
                continue;
            }
            state.waiters.push_front(tx);
            break;
        }
    }

    fn restore_idle(state: &mut GroupState, id: u64, channel: Channel) {
        if let Some(entry) = state.entries.iter_mut().find(|e| e.id == id) {
            entry.channel = Some(channel);
            entry.busy.store(false, Ordering::Release);
        }
    }

    /// 使用後の接続をアイドルに戻す
    ///
    /// 戻せない場合は接続を返すので呼び出し側で閉じる。
    fn put_idle(self: &Arc<Self>, id: u64, mut channel: Channel) -> Option<Channel> {
        let mut state = self.state.lock();
        if state.closed || state.channels() > state.ceiling {
            state.entries.retain(|e| e.id != id);
            self.dispatch(&mut state);
            return Some(channel);
        }
        channel.mark_idle();
        Self::restore_idle(&mut state, id, channel);
        trace!(destination = %self.key, id, "channel returned to pool");
        self.dispatch(&mut state);
        None
    }

    fn remove(self: &Arc<Self>, id: u64) {
        let mut state = self.state.lock();
        state.entries.retain(|e| e.id != id);
        trace!(destination = %self.key, id, channels = state.channels(), "channel removed");
        self.dispatch(&mut state);
    }

    /// 使えなくなった接続の枠を、同じ取得要求のための新しい接続枠に置き換える
    ///
    /// 待機者には渡さない。閉じられたグループや上限を超えている場合は `None`。
    fn replace(self: &Arc<Self>, id: u64) -> Option<Reservation> {
        let mut state = self.state.lock();
        state.entries.retain(|e| e.id != id);
        if state.closed || state.channels() >= state.ceiling {
            self.dispatch(&mut state);
            return None;
        }
        state.connecting += 1;
        Some(Reservation::new(Arc::clone(self)))
    }

    fn attach(self: &Arc<Self>, channel: Channel) -> Lease {
        let mut state = self.state.lock();
        state.connecting -= 1;
        let id = state.next_id;
        state.next_id += 1;
        state.entries.push(Entry {
            id,
            busy: AtomicBool::new(true),
            channel: None,
        });
        Lease::new(Arc::clone(self), id, channel)
    }

    fn cancel_reservation(self: &Arc<Self>) {
        let mut state = self.state.lock();
        state.connecting -= 1;
        self.dispatch(&mut state);
    }

    fn set_ceiling(self: &Arc<Self>, ceiling: usize) -> Vec<Channel> {
        let ceiling = ceiling.max(1);
        let mut state = self.state.lock();
        let previous = state.ceiling;
        state.ceiling = ceiling;

        let mut closing = Vec::new();
        if ceiling < previous {
            let excess = state.channels().saturating_sub(ceiling);
            let mut idle = state
                .entries
                .iter()
                .filter_map(|e| e.channel.as_ref().map(|c| (c.idle_since(), e.id)))
                .collect::<Vec<_>>();
            idle.sort();
            let victims = idle
                .into_iter()
                .take(excess)
                .map(|(_, id)| id)
                .collect::<Vec<_>>();

            let mut kept = Vec::with_capacity(state.entries.len());
            for mut entry in state.entries.drain(..) {
                match entry.channel.take() {
                    Some(channel) if victims.contains(&entry.id) => closing.push(channel),
                    channel => {
                        entry.channel = channel;
                        kept.push(entry);
                    }
                }
            }
            state.entries = kept;
            debug!(destination = %self.key, ceiling, closed = closing.len(), "ceiling lowered");
        } else {
            self.dispatch(&mut state);
        }
        closing
    }

    fn close(&self) -> Vec<Channel> {
        let mut state = self.state.lock();
        state.closed = true;
        state.waiters.clear();
        let mut closing = Vec::new();
        state.entries.retain_mut(|entry| match entry.channel.take() {
            Some(channel) => {
                closing.push(channel);
                false
            }
            None => true,
        });
        closing
    }

    fn stats(&self) -> GroupStats {
        let state = self.state.lock();
        GroupStats {
            channels: state.channels(),
            idle: state
                .entries
                .iter()
                .filter(|e| !e.busy.load(Ordering::Acquire))
                .count(),
            connecting: state.connecting,
            waiters: state.waiters.iter().filter(|tx| !tx.is_closed()).count(),
            ceiling: state.ceiling,
        }
    }
}

/// 新しく接続するための枠
///
/// 接続せずに drop すると枠を返す。
struct Reservation {
    group: Arc<Group>,
    armed: bool,
}

impl Reservation {
    fn new(group: Arc<Group>) -> Self {
        Self { group, armed: true }
    }

    fn attach(mut self, channel: Channel) -> Lease {
        self.armed = false;
        self.group.attach(channel)
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            self.group.cancel_reservation();
        }
    }
}

/// プールから借りた接続
///
/// `release()` で返却する。返却せずに drop すると接続を閉じる。
pub struct Lease {
    group: Arc<Group>,
    id: u64,
    channel: Option<Channel>,
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish()
    }
}

impl Lease {
    fn new(group: Arc<Group>, id: u64, channel: Channel) -> Self {
        Self {
            group,
            id,
            channel: Some(channel),
        }
    }

    fn into_parts(mut self) -> (u64, Channel) {
        match self.channel.take() {
            Some(channel) => (self.id, channel),
            None => unreachable!("lease without channel"),
        }
    }

    /// 接続先キー
    pub fn key(&self) -> &DestinationKey {
        &self.group.key
    }

    /// 接続
    pub fn channel(&self) -> &Channel {
        match &self.channel {
            Some(channel) => channel,
            None => unreachable!("lease without channel"),
        }
    }

    /// 接続 (可変)
    pub fn channel_mut(&mut self) -> &mut Channel {
        match &mut self.channel {
            Some(channel) => channel,
            None => unreachable!("lease without channel"),
        }
    }

    /// 接続を返却する
    ///
    /// `reusable` が false の場合は接続を閉じてグループから取り除く。
    pub async fn release(self, reusable: bool) {
        let group = Arc::clone(&self.group);
        let (id, channel) = self.into_parts();
        let closing = if reusable {
            group.put_idle(id, channel)
        } else {
            group.remove(id);
            Some(channel)
        };
        if let Some(channel) = closing {
            channel.close().await;
        }
    }

    fn into_reservation(self) -> (Option<Reservation>, Channel) {
        let group = Arc::clone(&self.group);
        let (id, channel) = self.into_parts();
        (group.replace(id), channel)
    }

    /// 接続を即座に破棄する
    ///
    /// 同期的に閉じるため、TLS の close_notify は送らない。
    pub fn discard(self) {
        let group = Arc::clone(&self.group);
        let (id, channel) = self.into_parts();
        debug!(destination = %group.key, id, "discarding channel");
        group.remove(id);
        drop(channel);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            warn!(destination = %self.group.key, id = self.id, "lease dropped without release");
            self.group.remove(self.id);
            drop(channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, DestinationKey) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, DestinationKey::new("http", "127.0.0.1", port))
    }

    fn accept_all(listener: TcpListener) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        })
    }

    fn pool(ceiling: usize) -> Arc<ConnectionPool> {
        ConnectionPool::new(
            &ClientConfig::default()
                .max_connections_per_destination(ceiling)
                .buffers_per_backing(4),
        )
    }

    #[tokio::test]
    async fn test_release_reusable_returns_to_idle() {
        let (listener, key) = listener().await;
        let _server = accept_all(listener);
        let pool = pool(2);

        let lease = pool.acquire(&key).await.unwrap();
        lease.release(true).await;
        let stats = pool.stats(&key).unwrap();
        assert_eq!(stats.channels, 1);
        assert_eq!(stats.idle, 1);

        let lease = pool.acquire(&key).await.unwrap();
        assert_eq!(lease.channel().key(), &key);
        assert_eq!(pool.stats(&key).unwrap().idle, 0);
        lease.release(true).await;
    }

    #[tokio::test]
    async fn test_release_not_reusable_returns_resources() {
        let (listener, key) = listener().await;
        let _server = accept_all(listener);
        let pool = pool(2);

        let lease = pool.acquire(&key).await.unwrap();
        assert_eq!(pool.buffers().outstanding(), 1);
        assert_eq!(pool.descriptors().outstanding(), 1);

        lease.release(false).await;
        assert_eq!(pool.stats(&key).unwrap().channels, 0);
        assert_eq!(pool.buffers().outstanding(), 0);
        assert_eq!(pool.descriptors().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_waiters_are_served_in_order() {
        let (listener, key) = listener().await;
        let _server = accept_all(listener);
        let pool = pool(1);

        let lease = pool.acquire(&key).await.unwrap();

        let (order_tx, mut order_rx) = tokio::sync::mpsc::unbounded_channel();
        let mut tasks = Vec::new();
        for i in 0..3 {
            let task_pool = Arc::clone(&pool);
            let task_key = key.clone();
            let order_tx = order_tx.clone();
            tasks.push(tokio::spawn(async move {
                let lease = task_pool.acquire(&task_key).await.unwrap();
                order_tx.send(i).unwrap();
                lease.release(true).await;
            }));
            // 待機列に入るまで待つ
            while pool.stats(&key).unwrap().waiters < i + 1 {
                tokio::task::yield_now().await;
            }
        }

        lease.release(true).await;
        for task in tasks {
            task.await.unwrap();
        }
        let order = (0..3).map(|_| order_rx.try_recv().unwrap()).collect::<Vec<_>>();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(pool.stats(&key).unwrap().channels, 1);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_is_skipped() {
        let (listener, key) = listener().await;
        let _server = accept_all(listener);
        let pool = pool(1);

        let lease = pool.acquire(&key).await.unwrap();
        let waiting = tokio::time::timeout(Duration::from_millis(20), pool.acquire(&key)).await;
        assert!(waiting.is_err());

        lease.release(true).await;
        let stats = pool.stats(&key).unwrap();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.waiters, 0);
    }

    #[tokio::test]
    async fn test_lowering_ceiling_closes_oldest_idle() {
        let (listener, key) = listener().await;
        let _server = accept_all(listener);
        let pool = pool(4);

        let a = pool.acquire(&key).await.unwrap();
        let b = pool.acquire(&key).await.unwrap();
        let c = pool.acquire(&key).await.unwrap();
        a.release(true).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        b.release(true).await;

        // 3 本 (アイドル 2 本) から上限 1 へ: min(3 - 1, 2) = 2 本閉じる
        pool.set_ceiling(&key, 1).await;
        let stats = pool.stats(&key).unwrap();
        assert_eq!(stats.channels, 1);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.ceiling, 1);

        c.release(true).await;
        assert_eq!(pool.stats(&key).unwrap().channels, 1);
    }

    #[tokio::test]
    async fn test_raising_ceiling_wakes_waiter() {
        let (listener, key) = listener().await;
        let _server = accept_all(listener);
        let pool = pool(1);

        let lease = pool.acquire(&key).await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            let key = key.clone();
            tokio::spawn(async move { pool.acquire(&key).await })
        };
        while pool.stats(&key).unwrap().waiters < 1 {
            tokio::task::yield_now().await;
        }

        pool.set_ceiling(&key, 2).await;
        let second = waiter.await.unwrap().unwrap();
        assert_eq!(pool.stats(&key).unwrap().channels, 2);

        lease.release(false).await;
        second.release(false).await;
    }

    #[tokio::test]
    async fn test_dropped_lease_frees_slot() {
        let (listener, key) = listener().await;
        let _server = accept_all(listener);
        let pool = pool(1);

        let lease = pool.acquire(&key).await.unwrap();
        drop(lease);
        assert_eq!(pool.stats(&key).unwrap().channels, 0);

        let lease = pool.acquire(&key).await.unwrap();
        lease.release(false).await;
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_acquire() {
        let (listener, key) = listener().await;
        let _server = accept_all(listener);
        let pool = pool(1);

        let lease = pool.acquire(&key).await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            let key = key.clone();
            tokio::spawn(async move { pool.acquire(&key).await })
        };
        while pool.stats(&key).unwrap().waiters < 1 {
            tokio::task::yield_now().await;
        }

        pool.close().await;
        assert!(matches!(waiter.await.unwrap(), Err(Error::PoolClosed)));
        assert!(matches!(pool.acquire(&key).await, Err(Error::PoolClosed)));

        lease.release(true).await;
        assert_eq!(pool.stats(&key).unwrap().channels, 0);
    }

    #[tokio::test]
    async fn test_dead_idle_channel_is_replaced() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let key = DestinationKey::new("http", "127.0.0.1", port);
        let pool = pool(1);

        let (lease, accepted) = tokio::join!(pool.acquire(&key), listener.accept());
        let lease = lease.unwrap();
        lease.release(true).await;

        // サーバー側が閉じる
        drop(accepted.unwrap().0);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (lease, accepted) = tokio::join!(pool.acquire(&key), listener.accept());
        let lease = lease.unwrap();
        assert!(accepted.is_ok());
        assert_eq!(pool.stats(&key).unwrap().channels, 1);
        lease.release(false).await;
    }

    #[tokio::test]
    async fn test_waiter_given_dead_channel_keeps_its_turn() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let key = DestinationKey::new("http", "127.0.0.1", port);
        let pool = pool(1);

        let (lease, accepted) = tokio::join!(pool.acquire(&key), listener.accept());
        let lease = lease.unwrap();
        let first_socket = accepted.unwrap().0;
        let _server = accept_all(listener);

        let (order_tx, mut order_rx) = tokio::sync::mpsc::unbounded_channel();
        let mut tasks = Vec::new();
        for i in 0..2 {
            let task_pool = Arc::clone(&pool);
            let task_key = key.clone();
            let order_tx = order_tx.clone();
            tasks.push(tokio::spawn(async move {
                let lease = task_pool.acquire(&task_key).await.unwrap();
                order_tx.send(i).unwrap();
                lease.release(true).await;
            }));
            while pool.stats(&key).unwrap().waiters < i + 1 {
                tokio::task::yield_now().await;
            }
        }

        // 先頭の待機者には死んだ接続が渡る
        drop(first_socket);
        tokio::time::sleep(Duration::from_millis(50)).await;
        lease.release(true).await;

        for task in tasks {
            task.await.unwrap();
        }
        let order = (0..2).map(|_| order_rx.try_recv().unwrap()).collect::<Vec<_>>();
        assert_eq!(order, vec![0, 1]);

        let stats = pool.stats(&key).unwrap();
        assert_eq!(stats.channels, 1);
        assert_eq!(stats.idle, 1);
        assert_eq!(pool.buffers().outstanding(), 1);
        assert_eq!(pool.descriptors().outstanding(), 1);
    }
}
