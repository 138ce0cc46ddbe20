//! Value sources for register blocks
//!
//! A [`ValueSource`] is the strategy a register block consults on every read:
//! either a static cell array (deterministic, writable) or a randomized
//! generator that produces a fresh draw per call, emulating live device data.
//! Sources are configured once at server start and shared read-mostly across
//! all connection tasks.

use std::sync::RwLock;

use rand::Rng;

/// Strategy supplying the values of a register block.
///
/// Offsets are relative to the owning block's base address; the block is
/// responsible for absolute bounds checking. Implementations must be safe to
/// call concurrently from multiple connection tasks.
pub trait ValueSource: Send + Sync {
    /// Produce `count` values starting at `offset`.
    ///
    /// Returns `None` when the range exceeds the source's configured length.
    /// On success the result must contain exactly `count` values; the store
    /// treats any other length as an internal contract violation.
    fn read(&self, offset: usize, count: usize) -> Option<Vec<u16>>;

    /// Store values starting at `offset`.
    ///
    /// Returns `false` when the range exceeds the source's configured length.
    /// Sources without backing state accept and discard writes.
    fn write(&self, offset: usize, values: &[u16]) -> bool;
}

/// Deterministic source backed by a cell array.
///
/// Reads return the stored cells; writes mutate them and are visible to
/// subsequent reads.
#[derive(Debug)]
pub struct StaticSource {
    cells: RwLock<Vec<u16>>,
}

impl StaticSource {
    /// Create a source holding the given cells
    pub fn new(cells: Vec<u16>) -> Self {
        Self {
            cells: RwLock::new(cells),
        }
    }

    /// Create a source of `length` cells, all set to `fill`
    pub fn filled(length: usize, fill: u16) -> Self {
        Self::new(vec![fill; length])
    }
}

impl ValueSource for StaticSource {
    fn read(&self, offset: usize, count: usize) -> Option<Vec<u16>> {
        let cells = self.cells.read().expect("cell lock poisoned");
        let end = offset.checked_add(count)?;
        cells.get(offset..end).map(<[u16]>::to_vec)
    }

    fn write(&self, offset: usize, values: &[u16]) -> bool {
        let mut cells = self.cells.write().expect("cell lock poisoned");
        let Some(end) = offset.checked_add(values.len()) else {
            return false;
        };
        match cells.get_mut(offset..end) {
            Some(slice) => {
                slice.copy_from_slice(values);
                true
            }
            None => false,
        }
    }
}

/// Randomized source: every read is a fresh, independent draw.
///
/// Each requested value is drawn uniformly from `[0, max]` on every call,
/// never cached, so repeated reads of the same address differ — the mock
/// equivalent of a live, changing device. Draws for one call are produced as
/// one batch; `thread_rng` keeps the generator per-task, so concurrent
/// connections need no synchronization.
#[derive(Debug, Clone)]
pub struct RandomSource {
    length: usize,
    max: u16,
}

impl RandomSource {
    /// Create a source of `length` cells drawing from `[0, max]` inclusive
    pub fn new(length: usize, max: u16) -> Self {
        Self { length, max }
    }
}

impl ValueSource for RandomSource {
    fn read(&self, offset: usize, count: usize) -> Option<Vec<u16>> {
        let end = offset.checked_add(count)?;
        if end > self.length {
            return None;
        }

        let mut rng = rand::thread_rng();
        Some((0..count).map(|_| rng.gen_range(0..=self.max)).collect())
    }

    fn write(&self, offset: usize, values: &[u16]) -> bool {
        // Accepted and discarded: the next read is a fresh draw regardless
        match offset.checked_add(values.len()) {
            Some(end) => end <= self.length,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_source_is_idempotent() {
        let source = StaticSource::new(vec![10, 20, 30, 40]);

        let first = source.read(1, 2).unwrap();
        let second = source.read(1, 2).unwrap();
        assert_eq!(first, vec![20, 30]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_static_source_rejects_out_of_range() {
        let source = StaticSource::new(vec![0; 4]);

        assert!(source.read(0, 5).is_none());
        assert!(source.read(4, 1).is_none());
        assert!(source.read(usize::MAX, 2).is_none());
        assert!(!source.write(3, &[1, 2]));
    }

    #[test]
    fn test_static_source_write_is_visible() {
        let source = StaticSource::filled(8, 0);

        assert!(source.write(2, &[7, 8, 9]));
        assert_eq!(source.read(0, 8).unwrap(), vec![0, 0, 7, 8, 9, 0, 0, 0]);
    }

    #[test]
    fn test_random_source_values_in_range() {
        let source = RandomSource::new(69, 255);

        let values = source.read(0, 69).unwrap();
        assert_eq!(values.len(), 69);
        assert!(values.iter().all(|&v| v <= 255));
    }

    #[test]
    fn test_random_source_draws_vary() {
        let source = RandomSource::new(64, 255);

        // 64 values over [0, 255]: two identical batches in 100 attempts
        // would indicate a caching bug, not bad luck
        let reference = source.read(0, 64).unwrap();
        let varied = (0..100).any(|_| source.read(0, 64).unwrap() != reference);
        assert!(varied);
    }

    #[test]
    fn test_random_source_rejects_out_of_range() {
        let source = RandomSource::new(69, 255);

        assert!(source.read(0, 70).is_none());
        assert!(source.read(69, 1).is_none());
        assert!(!source.write(68, &[1, 2]));
    }

    #[test]
    fn test_random_source_discards_writes() {
        let source = RandomSource::new(8, 0);

        assert!(source.write(0, &[42; 8]));
        // max = 0 pins every draw; the write left no trace
        assert_eq!(source.read(0, 8).unwrap(), vec![0; 8]);
    }
}
