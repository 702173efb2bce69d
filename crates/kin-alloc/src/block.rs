/// A cached window of reserved ids for one sequence.
///
/// Owned by a single allocator. Dropping a block leaks its remaining ids,
/// which is safe: the store never hands them out again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationBlock {
    pub sequence_name: String,
    pub next_value: i64,
    pub remaining: u64,
}

impl AllocationBlock {
    pub fn new(sequence_name: impl Into<String>, start: i64, len: u64) -> Self {
        Self {
            sequence_name: sequence_name.into(),
            next_value: start,
            remaining: len,
        }
    }

    /// Take `n` contiguous ids, or `None` if the block holds fewer.
    pub fn take(&mut self, n: u64) -> Option<Vec<i64>> {
        if n > self.remaining {
            return None;
        }
        let start = self.next_value;
        let ids: Vec<i64> = (0..n as i64).map(|i| start + i).collect();
        self.next_value += n as i64;
        self.remaining -= n;
        Some(ids)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_is_contiguous() {
        let mut block = AllocationBlock::new("s", 11, 5);
        assert_eq!(block.take(3), Some(vec![11, 12, 13]));
        assert_eq!(block.take(2), Some(vec![14, 15]));
        assert!(block.is_exhausted());
    }

    #[test]
    fn take_beyond_remaining_leaves_block_untouched() {
        let mut block = AllocationBlock::new("s", 1, 2);
        assert_eq!(block.take(3), None);
        assert_eq!(block.remaining, 2);
        assert_eq!(block.next_value, 1);
    }
}
