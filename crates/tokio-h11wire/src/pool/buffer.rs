use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytes::BytesMut;

use super::{Pool, Pooled};

/// 固定長 I/O バッファのプール
///
/// 1 回の大きな確保を `buffers_per_backing` 個の領域に分割して空きリストに入れる。
/// 空きがなくなった後は 1 領域ずつ確保する。
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<Pool<BytesMut>>,
    buffer_size: usize,
}

impl BufferPool {
    /// バッファプールを作成
    pub fn new(buffer_size: usize, buffers_per_backing: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        let count = buffers_per_backing.max(1);

        let mut backing = BytesMut::zeroed(buffer_size * count);
        let regions = (0..count)
            .map(|_| backing.split_to(buffer_size))
            .collect::<Vec<_>>();

        let inner = Pool::with_resources(count, regions, move || BytesMut::zeroed(buffer_size));
        Self { inner, buffer_size }
    }

    /// バッファを借りる
    pub fn checkout(&self) -> PooledBuffer {
        PooledBuffer {
            inner: self.inner.checkout(),
        }
    }

    /// バッファを返す
    pub fn checkin(&self, buffer: PooledBuffer) {
        self.inner.checkin(buffer.inner);
    }

    /// バッファ 1 つのサイズ
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// 空きバッファ数
    pub fn available(&self) -> usize {
        self.inner.available()
    }

    /// 空きリストの容量
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// これまでに確保したバッファ数
    pub fn allocated(&self) -> usize {
        self.inner.allocated()
    }

    /// 貸し出し中のバッファ数
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding()
    }
}

/// プールから借りたバッファ
///
/// 領域はスライスとしてのみ公開する。
#[derive(Debug)]
pub struct PooledBuffer {
    inner: Pooled<BytesMut>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.inner[..]
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.inner[..]
    }
}
