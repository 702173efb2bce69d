use std::collections::HashMap;
use std::sync::Arc;

use kin_store::Datastore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::block::AllocationBlock;
use crate::error::{AllocError, AllocResult};
use crate::sequence::SequenceContext;

/// Block size used when a sequence has no explicit cache size.
pub const DEFAULT_KEY_CACHE_SIZE: u64 = 10;

/// Configuration for a [`BlockAllocator`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Ids reserved per store round trip.
    pub default_cache_size: u64,
    /// Overrides keyed by full sequence name.
    pub per_sequence: HashMap<String, u64>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            default_cache_size: DEFAULT_KEY_CACHE_SIZE,
            per_sequence: HashMap::new(),
        }
    }
}

impl AllocatorConfig {
    pub fn cache_size_for(&self, sequence: &str) -> u64 {
        self.per_sequence
            .get(sequence)
            .copied()
            .unwrap_or(self.default_cache_size)
            .max(1)
    }
}

/// Hands out contiguous ids per sequence, caching one block per sequence.
///
/// Methods take `&mut self`: an allocator and its cache belong to one
/// caller. Several allocators may share a store; the store's range
/// reservation keeps their ids disjoint.
pub struct BlockAllocator {
    store: Arc<dyn Datastore>,
    config: AllocatorConfig,
    blocks: HashMap<String, AllocationBlock>,
}

impl BlockAllocator {
    pub fn new(store: Arc<dyn Datastore>, config: AllocatorConfig) -> Self {
        Self {
            store,
            config,
            blocks: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Reserve `size` contiguous, never-before-issued ids.
    ///
    /// Served from the cached block when it holds enough ids. Otherwise the
    /// remainder is dropped and a new block of `max(size, cache_size)` is
    /// fetched. On failure the cached block is discarded and nothing is
    /// retried.
    pub fn reserve(&mut self, ctx: &SequenceContext, size: u64) -> AllocResult<Vec<i64>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let name = ctx.name();

        if let Some(ids) = self.blocks.get_mut(&name).and_then(|b| b.take(size)) {
            return Ok(ids);
        }

        let mut block = match self.fetch_block(&name, size) {
            Ok(block) => block,
            Err(e) => {
                self.blocks.remove(&name);
                return Err(e);
            }
        };
        let ids = block.take(size).ok_or_else(|| AllocError::AllocationFailed {
            sequence: name.clone(),
            source: kin_store::StoreError::InvalidArgument(format!(
                "store returned fewer than {size} ids"
            )),
        })?;
        self.blocks.insert(name, block);
        Ok(ids)
    }

    /// Reserve a single id.
    pub fn next(&mut self, ctx: &SequenceContext) -> AllocResult<i64> {
        let ids = self.reserve(ctx, 1)?;
        ids.first().copied().ok_or_else(|| AllocError::AllocationFailed {
            sequence: ctx.name(),
            source: kin_store::StoreError::InvalidArgument("empty reservation".into()),
        })
    }

    /// The cached block for a sequence, if any.
    pub fn cached(&self, ctx: &SequenceContext) -> Option<&AllocationBlock> {
        self.blocks.get(&ctx.name())
    }

    /// Drop the cached block for a sequence.
    pub fn discard(&mut self, ctx: &SequenceContext) {
        self.blocks.remove(&ctx.name());
    }

    fn fetch_block(&self, name: &str, size: u64) -> AllocResult<AllocationBlock> {
        let len = size.max(self.config.cache_size_for(name));
        if len > i32::MAX as u64 {
            return Err(AllocError::BlockTooLarge {
                sequence: name.to_string(),
                requested: len,
            });
        }

        let range = self
            .store
            .reserve_id_range(name, None, len)
            .map_err(|source| {
                warn!(sequence = name, error = %source, "block reservation failed");
                AllocError::AllocationFailed {
                    sequence: name.to_string(),
                    source,
                }
            })?;
        debug!(sequence = name, start = range.start, end = range.end, "fetched id block");
        Ok(AllocationBlock::new(name, range.start, range.len()))
    }
}

impl std::fmt::Debug for BlockAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockAllocator")
            .field("config", &self.config)
            .field("blocks", &self.blocks)
            .finish()
    }
}
