//! Utility functions

use crate::config::WorldConfig;

/// Generate unique ID
pub fn next_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Clamp a requested parallel batch size into `[1, chunk_capacity]`
pub fn clamp_batch_size(requested: usize, config: &WorldConfig) -> usize {
    requested.clamp(1, config.chunk_capacity.max(1))
}

/// Number of batches of at most `batch_size` rows needed to cover `len` rows
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    debug_assert!(batch_size > 0);
    len.div_ceil(batch_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_id() {
        let id1 = next_id();
        let id2 = next_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_clamp_batch_size() {
        let config = WorldConfig::default().with_chunk_capacity(32);
        assert_eq!(clamp_batch_size(0, &config), 1);
        assert_eq!(clamp_batch_size(7, &config), 7);
        assert_eq!(clamp_batch_size(500, &config), 32);
    }

    #[test]
    fn test_batch_count() {
        assert_eq!(batch_count(0, 8), 0);
        assert_eq!(batch_count(8, 8), 1);
        assert_eq!(batch_count(9, 8), 2);
        assert_eq!(batch_count(12, 1), 12);
    }
}
