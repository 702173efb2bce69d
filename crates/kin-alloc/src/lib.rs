//! Block-based identifier allocation.
//!
//! A [`BlockAllocator`] hands out contiguous numeric ids per sequence name.
//! It reserves ranges from the store in blocks and serves later requests
//! from the cached remainder. The store's reservation is the authority;
//! the cache only saves round trips, so ids are never reused even when a
//! block is thrown away.

pub mod allocator;
pub mod block;
pub mod error;
pub mod sequence;

pub use allocator::{AllocatorConfig, BlockAllocator, DEFAULT_KEY_CACHE_SIZE};
pub use block::AllocationBlock;
pub use error::{AllocError, AllocResult};
pub use sequence::{SequenceContext, SEQUENCE_POSTFIX};
