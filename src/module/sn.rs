use once_cell::sync::Lazy;
use parking_lot::Mutex;

static GLOBAL: Lazy<SnGenerator> = Lazy::new(|| SnGenerator::new(1, 0));

/// The process-wide generator used when minting MIDs for stock modules.
pub fn global() -> &'static SnGenerator {
    &GLOBAL
}

#[derive(Debug)]
struct Cursor {
    next: u64,
    cycle_count: u64,
}

/// Hands out serial numbers from `start` to `max`, then starts over at
/// `start` and bumps the cycle count.
#[derive(Debug)]
pub struct SnGenerator {
    start: u64,
    max: u64,
    cursor: Mutex<Cursor>,
}

impl SnGenerator {
    /// A `max` of 0 means `u64::MAX`.
    pub fn new(start: u64, max: u64) -> Self {
        let max = if max == 0 { u64::MAX } else { max };
        Self {
            start,
            max,
            cursor: Mutex::new(Cursor {
                next: start,
                cycle_count: 0,
            }),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    /// The serial the next `get` will return.
    pub fn next(&self) -> u64 {
        self.cursor.lock().next
    }

    pub fn cycle_count(&self) -> u64 {
        self.cursor.lock().cycle_count
    }

    pub fn get(&self) -> u64 {
        let mut cursor = self.cursor.lock();
        let id = cursor.next;
        if id >= self.max {
            cursor.next = self.start;
            cursor.cycle_count = cursor.cycle_count.wrapping_add(1);
        } else {
            cursor.next += 1;
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn wraps_to_start_and_counts_cycles() {
        let sn = SnGenerator::new(1, 3);
        let got: Vec<u64> = (0..5).map(|_| sn.get()).collect();
        assert_eq!(got, vec![1, 2, 3, 1, 2]);
        assert_eq!(sn.cycle_count(), 1);
        assert_eq!(sn.next(), 3);
    }

    #[test]
    fn zero_max_means_unbounded() {
        let sn = SnGenerator::new(0, 0);
        assert_eq!(sn.max(), u64::MAX);
        assert_eq!(sn.start(), 0);
    }

    #[test]
    fn concurrent_gets_are_unique() {
        let sn = Arc::new(SnGenerator::new(1, 0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sn = Arc::clone(&sn);
                std::thread::spawn(move || (0..250).map(|_| sn.get()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
