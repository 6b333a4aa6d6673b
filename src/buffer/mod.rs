pub mod buffer_pool;
pub mod replacer;

pub use buffer_pool::BufferPool;
pub use replacer::{ClockReplacer, LruReplacer, Replacer};
