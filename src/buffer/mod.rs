//! Elastic buffering between crawl stages.
//!
//! A [`Buffer`] is a fixed-capacity, non-blocking FIFO. A [`BufferPool`]
//! presents one logical FIFO made of several buffers that circulate through
//! an internal channel: a caller takes a buffer out, touches it, and puts it
//! back, so no two callers ever operate on the same buffer at once.

mod fifo;
mod multi_reader;
mod pool;

pub use fifo::Buffer;
pub use multi_reader::MultipleReader;
pub use pool::{BufferPool, BufferPoolSummary};
