use crate::error::SpiderError;
use crossbeam::queue::ArrayQueue;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A fixed-capacity FIFO that never blocks.
///
/// `put` hands the value back instead of waiting when the buffer is full and
/// `get` reports `None` instead of waiting when it is empty. Closing is
/// one-shot; afterwards every operation except [`Buffer::closed`] fails with
/// [`SpiderError::ClosedBuffer`].
#[derive(Debug)]
pub struct Buffer<T> {
    queue: ArrayQueue<T>,
    closed: AtomicBool,
    closing: RwLock<()>,
}

impl<T> Buffer<T> {
    pub fn new(size: u32) -> Result<Self, SpiderError> {
        if size == 0 {
            return Err(SpiderError::illegal(format!(
                "illegal size for buffer: {}",
                size
            )));
        }
        Ok(Self {
            queue: ArrayQueue::new(size as usize),
            closed: AtomicBool::new(false),
            closing: RwLock::new(()),
        })
    }

    pub fn cap(&self) -> u32 {
        self.queue.capacity() as u32
    }

    pub fn len(&self) -> u32 {
        self.queue.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Tries to append `data`.
    ///
    /// Returns `Ok(None)` when the value was accepted and `Ok(Some(data))`
    /// when the buffer is full.
    pub fn put(&self, data: T) -> Result<Option<T>, SpiderError> {
        let _guard = self.closing.read();
        if self.closed() {
            debug!("[Buffer] --> buffer is closed");
            return Err(SpiderError::ClosedBuffer);
        }
        Ok(self.queue.push(data).err())
    }

    /// Takes the oldest value, or `None` if the buffer is empty.
    pub fn get(&self) -> Result<Option<T>, SpiderError> {
        let _guard = self.closing.read();
        if self.closed() {
            return Err(SpiderError::ClosedBuffer);
        }
        Ok(self.queue.pop())
    }

    /// Closes the buffer and discards its contents. Returns `false` if it
    /// was already closed.
    pub fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let _guard = self.closing.write();
        while self.queue.pop().is_some() {}
        true
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_is_rejected() {
        assert!(matches!(
            Buffer::<u8>::new(0),
            Err(SpiderError::IllegalParameter(_))
        ));
    }

    #[test]
    fn put_reports_full_without_blocking() {
        let buffer = Buffer::new(2).unwrap();
        assert_eq!(buffer.put(1).unwrap(), None);
        assert_eq!(buffer.put(2).unwrap(), None);
        assert_eq!(buffer.put(3).unwrap(), Some(3));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.cap(), 2);
    }

    #[test]
    fn get_is_fifo_and_reports_empty() {
        let buffer = Buffer::new(3).unwrap();
        buffer.put("a").unwrap();
        buffer.put("b").unwrap();
        assert_eq!(buffer.get().unwrap(), Some("a"));
        assert_eq!(buffer.get().unwrap(), Some("b"));
        assert_eq!(buffer.get().unwrap(), None);
    }

    #[test]
    fn close_is_one_shot_and_terminal() {
        let buffer = Buffer::new(1).unwrap();
        buffer.put(7).unwrap();
        assert!(buffer.close());
        assert!(!buffer.close());
        assert!(buffer.closed());
        assert!(matches!(buffer.put(8), Err(SpiderError::ClosedBuffer)));
        assert!(matches!(buffer.get(), Err(SpiderError::ClosedBuffer)));
    }
}
