//! 再利用可能なリソースのプール
//!
//! 空きリストは lock-free な固定長キュー。空のときは factory で新規作成し、
//! 返却時にキューが満杯ならそのリソースは破棄する。チェックアウトがブロックすることはない。

mod buffer;
mod descriptor;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::ArrayQueue;

pub use buffer::{BufferPool, PooledBuffer};
pub use descriptor::{CompletionSlot, IoDescriptor, OpKind};

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// リソースプール
pub struct Pool<T> {
    free: ArrayQueue<T>,
    factory: Factory<T>,
    /// これまでに作成したリソース数
    allocated: AtomicUsize,
    /// 貸し出し中のリソース数
    outstanding: AtomicUsize,
}

impl<T> Pool<T> {
    /// 空のプールを作成
    pub fn new<F>(capacity: usize, factory: F) -> Arc<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_resources(capacity, Vec::new(), factory)
    }

    /// 事前に用意したリソースを空きリストに入れてプールを作成
    ///
    /// `capacity` を超えた分は捨てる。
    pub fn with_resources<F>(capacity: usize, resources: Vec<T>, factory: F) -> Arc<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let free = ArrayQueue::new(capacity.max(1));
        let mut allocated = 0;
        for resource in resources {
            if free.push(resource).is_err() {
                break;
            }
            allocated += 1;
        }
        Arc::new(Self {
            free,
            factory: Box::new(factory),
            allocated: AtomicUsize::new(allocated),
            outstanding: AtomicUsize::new(0),
        })
    }

    /// リソースを借りる
    pub fn checkout(self: &Arc<Self>) -> Pooled<T> {
        let value = match self.free.pop() {
            Some(value) => value,
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                (self.factory)()
            }
        };
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Pooled {
            value: Some(value),
            pool: Arc::clone(self),
        }
    }

    /// リソースを返す
    ///
    /// `Pooled` の drop でも返却されるため、明示的に呼ぶ必要はない。
    pub fn checkin(&self, mut pooled: Pooled<T>) {
        if let Some(value) = pooled.value.take() {
            self.give_back(value);
        }
    }

    /// 空きリストにあるリソース数
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// 空きリストの容量
    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }

    /// これまでに作成したリソース数
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// 貸し出し中のリソース数
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    fn give_back(&self, value: T) {
        let previous = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "resource returned more often than checked out");
        if self.free.push(value).is_err() {
            tracing::trace!("pool full, dropping resource");
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("available", &self.available())
            .field("capacity", &self.capacity())
            .field("allocated", &self.allocated())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// プールから借りたリソース
///
/// drop 時にプールへ返却される。
pub struct Pooled<T> {
    value: Option<T>,
    pool: Arc<Pool<T>>,
}

impl<T> Pooled<T> {
    /// 借り元のプール
    pub fn pool(&self) -> &Arc<Pool<T>> {
        &self.pool
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("pooled resource accessed after check-in"),
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("pooled resource accessed after check-in"),
        }
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.give_back(value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.value).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_allocates_when_empty() {
        let pool = Pool::new(2, || 0u32);
        assert_eq!(pool.available(), 0);

        let a = pool.checkout();
        let b = pool.checkout();
        let c = pool.checkout();
        assert_eq!(pool.allocated(), 3);
        assert_eq!(pool.outstanding(), 3);

        drop(a);
        pool.checkin(b);
        // 容量 2 を超えた分は捨てられる
        drop(c);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_resources_are_reused() {
        let pool = Pool::with_resources(4, vec![Vec::<u8>::new()], Vec::new);
        assert_eq!(pool.allocated(), 1);

        let mut v = pool.checkout();
        v.push(7);
        drop(v);

        let v = pool.checkout();
        assert_eq!(&v[..], &[7]);
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn test_checkout_from_many_threads() {
        let pool = Pool::new(8, || 0usize);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut v = pool.checkout();
                        *v += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.outstanding(), 0);
        assert!(pool.available() <= 8);
        assert!(pool.allocated() <= 4 + 8);
    }
}
