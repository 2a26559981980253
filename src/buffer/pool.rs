use super::Buffer;
use crate::error::SpiderError;
use kanal::{AsyncReceiver, AsyncSender};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tracing::{debug, error, info, trace};

/// Point-in-time view of a pool's sizing, as reported in scheduler summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferPoolSummary {
    pub buffer_cap: u32,
    pub max_buffer_number: u32,
    pub buffer_number: u32,
    pub total: u64,
}

/// One logical FIFO built from a varying number of [`Buffer`]s.
///
/// The buffers circulate through a bounded channel. `put` and `get` take a
/// buffer out, operate on it, and send it back, so each buffer has a single
/// user at any moment. The pool grows by one buffer when `put` keeps meeting
/// full buffers and shrinks by one when `get` keeps meeting an empty buffer
/// while others remain. There is always at least one live buffer while the
/// pool is open and never more than `max_buffer_number`.
///
/// Neither `put` nor `get` holds a buffer across an await point, so dropping
/// either future never strands a buffer.
pub struct BufferPool<T> {
    name: String,
    buffer_cap: u32,
    max_buffer_number: u32,
    buffer_number: AtomicU32,
    total: AtomicU64,
    tx: AsyncSender<Buffer<T>>,
    rx: AsyncReceiver<Buffer<T>>,
    closed: AtomicBool,
    lock: RwLock<()>,
}

impl<T: Send + 'static> BufferPool<T> {
    /// Creates a pool holding a single buffer of `buffer_cap` slots.
    pub fn new(
        buffer_cap: u32,
        max_buffer_number: u32,
        name: impl Into<String>,
    ) -> Result<Self, SpiderError> {
        if buffer_cap == 0 {
            return Err(SpiderError::illegal(format!(
                "illegal buffer cap for buffer pool: {}",
                buffer_cap
            )));
        }
        if max_buffer_number == 0 {
            return Err(SpiderError::illegal(format!(
                "illegal max buffer number for buffer pool: {}",
                max_buffer_number
            )));
        }

        let (tx, rx) = kanal::bounded_async(max_buffer_number as usize);
        let first = Buffer::new(buffer_cap)?;
        if !tx.try_send(first).map_err(|_| SpiderError::ClosedPool)? {
            return Err(SpiderError::ClosedPool);
        }

        let name = name.into();
        trace!(
            "[BufferPool] --> {} pool created: bufferCap: {}, maxBufferNumber: {}",
            name,
            buffer_cap,
            max_buffer_number
        );
        Ok(Self {
            name,
            buffer_cap,
            max_buffer_number,
            buffer_number: AtomicU32::new(1),
            total: AtomicU64::new(0),
            tx,
            rx,
            closed: AtomicBool::new(false),
            lock: RwLock::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer_cap(&self) -> u32 {
        self.buffer_cap
    }

    pub fn max_buffer_number(&self) -> u32 {
        self.max_buffer_number
    }

    pub fn buffer_number(&self) -> u32 {
        self.buffer_number.load(Ordering::SeqCst)
    }

    /// Number of values currently held across all buffers.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn summary(&self) -> BufferPoolSummary {
        BufferPoolSummary {
            buffer_cap: self.buffer_cap,
            max_buffer_number: self.max_buffer_number,
            buffer_number: self.buffer_number(),
            total: self.total(),
        }
    }

    /// Stores `data`, waiting until some buffer accepts it.
    ///
    /// After `buffer_number * 5` consecutive full buffers the pool adds a new
    /// buffer (if below the ceiling) and places `data` straight into it.
    pub async fn put(&self, data: T) -> Result<(), SpiderError> {
        if self.closed() {
            return Err(SpiderError::ClosedPool);
        }

        let mut count = 0u32;
        let max_count = self.buffer_number().saturating_mul(5);
        let mut pending = data;
        loop {
            let buffer = self.rx.recv().await.map_err(|_| SpiderError::ClosedPool)?;
            match self.put_data(buffer, pending, &mut count, max_count)? {
                None => return Ok(()),
                Some(rejected) => pending = rejected,
            }
            tokio::task::yield_now().await;
        }
    }

    fn put_data(
        &self,
        buffer: Buffer<T>,
        data: T,
        count: &mut u32,
        max_count: u32,
    ) -> Result<Option<T>, SpiderError> {
        if self.closed() {
            self.retire(buffer);
            return Err(SpiderError::ClosedPool);
        }

        let rejected = match buffer.put(data) {
            Ok(None) => {
                self.total.fetch_add(1, Ordering::SeqCst);
                self.return_buffer(buffer)?;
                return Ok(None);
            }
            Ok(Some(rejected)) => rejected,
            Err(e) => {
                error!("[BufferPool] --> putting data into {} failed: {}", self.name, e);
                self.retire(buffer);
                return Err(e);
            }
        };

        *count += 1;
        let mut outcome = Some(rejected);
        if *count >= max_count && self.buffer_number() < self.max_buffer_number {
            if let Some(rejected) = outcome.take() {
                outcome = self.grow(rejected)?;
            }
            *count = 0;
        }
        self.return_buffer(buffer)?;
        Ok(outcome)
    }

    /// Adds one buffer holding `data`, re-checking the ceiling under the
    /// write lock. Hands `data` back if the pool cannot grow.
    fn grow(&self, data: T) -> Result<Option<T>, SpiderError> {
        let _guard = self.lock.write();
        if self.closed() || self.buffer_number() >= self.max_buffer_number {
            return Ok(Some(data));
        }

        let buffer = Buffer::new(self.buffer_cap)?;
        if let Some(data) = buffer.put(data)? {
            return Ok(Some(data));
        }
        // Counted before the buffer circulates, so a concurrent get never
        // takes the value out ahead of the increment.
        self.total.fetch_add(1, Ordering::SeqCst);
        match self.tx.try_send(buffer) {
            Ok(true) => {
                let number = self.buffer_number.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    "[BufferPool] --> {} pool grew to {} buffers",
                    self.name, number
                );
                Ok(None)
            }
            Ok(false) => {
                self.total.fetch_sub(1, Ordering::SeqCst);
                error!("[BufferPool] --> {} circulation is full, new buffer discarded", self.name);
                Err(SpiderError::ClosedPool)
            }
            Err(_) => {
                self.total.fetch_sub(1, Ordering::SeqCst);
                Err(SpiderError::ClosedPool)
            }
        }
    }

    /// Takes the next value, waiting until one is available.
    ///
    /// A buffer found empty `buffer_number * 10` times in a row is closed and
    /// dropped, as long as it is not the last one.
    pub async fn get(&self) -> Result<T, SpiderError> {
        if self.closed() {
            return Err(SpiderError::ClosedPool);
        }

        let mut count = 0u32;
        let max_count = self.buffer_number().saturating_mul(10);
        loop {
            let buffer = self.rx.recv().await.map_err(|_| SpiderError::ClosedPool)?;
            if let Some(data) = self.get_data(buffer, &mut count, max_count)? {
                return Ok(data);
            }
            tokio::task::yield_now().await;
        }
    }

    fn get_data(
        &self,
        buffer: Buffer<T>,
        count: &mut u32,
        max_count: u32,
    ) -> Result<Option<T>, SpiderError> {
        if self.closed() {
            self.retire(buffer);
            return Err(SpiderError::ClosedPool);
        }

        match buffer.get() {
            Ok(Some(data)) => {
                self.total.fetch_sub(1, Ordering::SeqCst);
                self.return_buffer(buffer)?;
                Ok(Some(data))
            }
            Ok(None) => {
                *count += 1;
                if *count >= max_count && buffer.is_empty() && self.try_shrink() {
                    buffer.close();
                    *count = 0;
                    debug!(
                        "[BufferPool] --> {} pool shrank to {} buffers",
                        self.name,
                        self.buffer_number()
                    );
                    return Ok(None);
                }
                self.return_buffer(buffer)?;
                Ok(None)
            }
            Err(e) => {
                self.retire(buffer);
                Err(e)
            }
        }
    }

    fn try_shrink(&self) -> bool {
        self.buffer_number
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 1 {
                    Some(n - 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    fn return_buffer(&self, buffer: Buffer<T>) -> Result<(), SpiderError> {
        let _guard = self.lock.read();
        if self.closed() {
            self.retire(buffer);
            return Err(SpiderError::ClosedPool);
        }
        match self.tx.try_send(buffer) {
            Ok(true) => Ok(()),
            Ok(false) => {
                error!("[BufferPool] --> {} circulation is full, buffer discarded", self.name);
                self.buffer_number.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
            Err(_) => {
                self.buffer_number.fetch_sub(1, Ordering::SeqCst);
                Err(SpiderError::ClosedPool)
            }
        }
    }

    /// Takes a buffer out of service for good.
    fn retire(&self, buffer: Buffer<T>) {
        let held = buffer.len() as u64;
        if held > 0 {
            self.total.fetch_sub(held, Ordering::SeqCst);
        }
        buffer.close();
        let _ = self
            .buffer_number
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Closes the pool and every buffer still in circulation. Returns `false`
    /// if the pool was already closed.
    pub fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let _guard = self.lock.write();
        while let Ok(Some(buffer)) = self.rx.try_recv() {
            self.retire(buffer);
        }
        let _ = self.tx.close();
        info!("[BufferPool] --> {} pool closed", self.name);
        true
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<T> fmt::Display for BufferPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pool (bufferCap: {}, maxBufferNumber: {}, bufferNumber: {}, total: {})",
            self.name,
            self.buffer_cap,
            self.max_buffer_number,
            self.buffer_number.load(Ordering::SeqCst),
            self.total.load(Ordering::SeqCst)
        )
    }
}

impl<T> fmt::Debug for BufferPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("name", &self.name)
            .field("buffer_cap", &self.buffer_cap)
            .field("max_buffer_number", &self.max_buffer_number)
            .field("buffer_number", &self.buffer_number)
            .field("total", &self.total)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn rejects_zero_sizes() {
        assert!(matches!(
            BufferPool::<u32>::new(0, 1, "t"),
            Err(SpiderError::IllegalParameter(_))
        ));
        assert!(matches!(
            BufferPool::<u32>::new(1, 0, "t"),
            Err(SpiderError::IllegalParameter(_))
        ));
    }

    #[tokio::test]
    async fn starts_with_one_buffer() {
        let pool = BufferPool::<u32>::new(4, 3, "t").unwrap();
        assert_eq!(pool.buffer_number(), 1);
        assert_eq!(pool.total(), 0);
        assert_eq!(
            pool.summary(),
            BufferPoolSummary {
                buffer_cap: 4,
                max_buffer_number: 3,
                buffer_number: 1,
                total: 0
            }
        );
    }

    #[tokio::test]
    async fn every_item_comes_back_exactly_once() {
        let pool = BufferPool::new(2, 4, "t").unwrap();
        for i in 0..8u32 {
            timeout(WAIT, pool.put(i)).await.unwrap().unwrap();
        }
        assert_eq!(pool.total(), 8);
        assert_eq!(pool.buffer_number(), 4);

        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(timeout(WAIT, pool.get()).await.unwrap().unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
        assert_eq!(pool.total(), 0);
    }

    #[tokio::test]
    async fn growth_stops_at_the_ceiling() {
        let pool = BufferPool::new(1, 3, "t").unwrap();
        for i in 0..3u32 {
            timeout(WAIT, pool.put(i)).await.unwrap().unwrap();
        }
        assert_eq!(pool.buffer_number(), 3);

        // every buffer is full and the pool cannot grow: put keeps waiting
        assert!(timeout(Duration::from_millis(50), pool.put(99)).await.is_err());
        assert_eq!(pool.buffer_number(), 3);
        assert_eq!(pool.total(), 3);
    }

    #[tokio::test]
    async fn idle_buffers_are_retired_down_to_one() {
        let pool = Arc::new(BufferPool::new(1, 3, "t").unwrap());
        for i in 0..3u32 {
            pool.put(i).await.unwrap();
        }
        for _ in 0..3 {
            pool.get().await.unwrap();
        }
        assert_eq!(pool.buffer_number(), 3);

        let getter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get().await })
        };
        timeout(WAIT, async {
            while pool.buffer_number() > 1 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        pool.put(42).await.unwrap();
        let value = timeout(WAIT, getter).await.unwrap().unwrap().unwrap();
        assert_eq!(value, 42);
        assert_eq!(pool.buffer_number(), 1);
    }

    #[tokio::test]
    async fn closing_twice_reports_false() {
        let pool = BufferPool::<u32>::new(2, 2, "t").unwrap();
        pool.put(1).await.unwrap();
        assert!(pool.close());
        assert!(!pool.close());
        assert!(pool.closed());
        assert!(matches!(pool.put(2).await, Err(SpiderError::ClosedPool)));
        assert!(matches!(pool.get().await, Err(SpiderError::ClosedPool)));
    }

    #[tokio::test]
    async fn close_releases_a_waiting_getter() {
        let pool = Arc::new(BufferPool::<u32>::new(1, 1, "t").unwrap());
        let getter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(pool.close());
        let result = timeout(WAIT, getter).await.unwrap().unwrap();
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_and_consumer_conserve_items() {
        let pool = Arc::new(BufferPool::new(5, 4, "t").unwrap());
        let mut producers = Vec::new();
        for p in 0..4u32 {
            let pool = Arc::clone(&pool);
            producers.push(tokio::spawn(async move {
                for i in 0..25u32 {
                    pool.put(p * 100 + i).await.unwrap();
                }
            }));
        }

        let mut received = Vec::new();
        timeout(WAIT, async {
            while received.len() < 100 {
                received.push(pool.get().await.unwrap());
                assert!(pool.buffer_number() >= 1);
                assert!(pool.buffer_number() <= 4);
            }
        })
        .await
        .unwrap();
        for producer in producers {
            producer.await.unwrap();
        }

        received.sort_unstable();
        let mut expected: Vec<u32> = (0..4).flat_map(|p| (0..25).map(move |i| p * 100 + i)).collect();
        expected.sort_unstable();
        assert_eq!(received, expected);
        assert_eq!(pool.total(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn total_stays_bounded_while_growing() {
        let pool = Arc::new(BufferPool::new(1, 8, "t").unwrap());
        let producer = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                for i in 0..200u32 {
                    pool.put(i).await.unwrap();
                }
            })
        };

        timeout(WAIT, async {
            for _ in 0..200 {
                pool.get().await.unwrap();
                let total = pool.total();
                assert!(total <= 200, "total wrapped to {}", total);
            }
        })
        .await
        .unwrap();
        producer.await.unwrap();
        assert_eq!(pool.total(), 0);
        assert!(pool.buffer_number() <= 8);
    }
}
