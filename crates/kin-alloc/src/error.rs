use kin_store::StoreError;

/// Errors from identifier allocation.
///
/// Every allocation error is fatal for the operation that needed the ids.
/// The allocator never retries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AllocError {
    /// The store refused to reserve a block.
    #[error("allocation failed for sequence {sequence}: {source}")]
    AllocationFailed {
        sequence: String,
        #[source]
        source: StoreError,
    },

    /// A single block may not exceed `i32::MAX` ids.
    #[error("block of {requested} ids for sequence {sequence} exceeds {max}", max = i32::MAX)]
    BlockTooLarge { sequence: String, requested: u64 },
}

/// Result alias for allocation operations.
pub type AllocResult<T> = Result<T, AllocError>;
