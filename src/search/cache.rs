use dashmap::DashMap;
use static_assertions::const_assert_eq;

use crate::games::PositionHash;
use crate::search::{LOSING, WINNING};

/// Bounds on the true score of a position at some depth:
/// `lo <= score <= hi`. Starts fully open and only ever narrows.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Window {
    pub lo: i32,
    pub hi: i32,
}

impl Default for Window {
    fn default() -> Self {
        Window {
            lo: LOSING,
            hi: WINNING,
        }
    }
}

const_assert_eq!(std::mem::size_of::<Window>(), 8);

/// Shard count for both concurrent maps; a point update only contends on
/// its own shard.
const SHARDS: usize = 64;

/// Concurrent map from depth-mixed position hashes to score windows.
/// Entries are never evicted and bounds only tighten, so late readers can
/// never observe a looser window than an earlier one.
#[derive(Debug)]
pub struct TranspositionCache {
    map: DashMap<PositionHash, Window>,
}

impl Default for TranspositionCache {
    fn default() -> Self {
        TranspositionCache {
            map: DashMap::with_shard_amount(SHARDS),
        }
    }
}

impl TranspositionCache {
    pub fn probe(&self, key: PositionHash) -> Option<Window> {
        self.map.get(&key).map(|entry| *entry)
    }

    /// Narrows the window at `key` with a search result `best` obtained
    /// against the threshold `gamma`: a fail-low caps `hi`, a fail-high
    /// raises `lo`. The update happens under the shard lock, so concurrent
    /// tightenings combine instead of overwriting each other.
    pub fn tighten(&self, key: PositionHash, best: i32, gamma: i32) {
        let mut entry = self.map.entry(key).or_insert_with(Window::default);
        if best < gamma {
            entry.hi = entry.hi.min(best);
        } else {
            entry.lo = entry.lo.max(best);
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

/// Concurrent map from position hashes to the child index that last
/// produced a cutoff there. Purely a move-ordering hint.
#[derive(Debug)]
pub struct KillerTable {
    map: DashMap<PositionHash, u32>,
}

impl Default for KillerTable {
    fn default() -> Self {
        KillerTable {
            map: DashMap::with_shard_amount(SHARDS),
        }
    }
}

impl KillerTable {
    pub fn get(&self, hash: PositionHash) -> Option<u32> {
        self.map.get(&hash).map(|entry| *entry)
    }

    pub fn record(&self, hash: PositionHash, child: u32) {
        self.map.insert(hash, child);
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_only_tighten() {
        let cache = TranspositionCache::default();
        let key = PositionHash(1);
        cache.tighten(key, 50, 100); // fail low: hi <- 50
        assert_eq!(cache.probe(key), Some(Window { lo: LOSING, hi: 50 }));
        cache.tighten(key, 120, 100); // fail high: lo <- 120... but hi stays
        let w = cache.probe(key).unwrap();
        assert_eq!(w.lo, 120);
        assert_eq!(w.hi, 50);
        // A looser fail-low result must not widen hi again.
        cache.tighten(key, 80, 100);
        assert_eq!(cache.probe(key).unwrap().hi, 50);
        // Nor may a weaker fail-high lower lo.
        cache.tighten(key, 101, 100);
        assert_eq!(cache.probe(key).unwrap().lo, 120);
    }

    #[test]
    fn concurrent_tightening_is_monotone() {
        let cache = TranspositionCache::default();
        let key = PositionHash(7);
        std::thread::scope(|scope| {
            for t in 0..8 {
                let cache = &cache;
                scope.spawn(move || {
                    for i in 0..100 {
                        cache.tighten(key, 100 - t * 10 - i, 200);
                    }
                });
            }
        });
        // The tightest fail-low seen anywhere wins.
        assert_eq!(cache.probe(key).unwrap().hi, 100 - 7 * 10 - 99);
        assert_eq!(cache.probe(key).unwrap().lo, LOSING);
    }

    #[test]
    fn killer_keeps_the_latest_child() {
        let killers = KillerTable::default();
        let hash = PositionHash(42);
        assert_eq!(killers.get(hash), None);
        killers.record(hash, 3);
        killers.record(hash, 5);
        assert_eq!(killers.get(hash), Some(5));
    }
}
