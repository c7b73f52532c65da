//! Sliding Window Tracking
//!
//! Per-key ordered activity lists bounded by a retention horizon. Shared by
//! the DDoS tracker and the windowed analyzers; callers own the locking.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, SystemTime};

use crate::clock::SharedClock;

/// Anything that can be placed on a time window
pub trait Timestamped {
    fn timestamp(&self) -> SystemTime;
}

impl Timestamped for SystemTime {
    fn timestamp(&self) -> SystemTime {
        *self
    }
}

/// Per-key sliding window
///
/// After any prune pass a key holds only entries newer than
/// `now - horizon`, and a key left with no entries is removed from the map.
#[derive(Debug)]
pub struct SlidingWindowTracker<K, T = SystemTime> {
    horizon: Duration,
    clock: SharedClock,
    entries: HashMap<K, VecDeque<T>>,
}

impl<K, T> SlidingWindowTracker<K, T>
where
    K: Eq + Hash + Clone,
    T: Timestamped,
{
    pub fn new(horizon: Duration, clock: SharedClock) -> Self {
        Self {
            horizon,
            clock,
            entries: HashMap::new(),
        }
    }

    /// Append an entry for `key`, prune the key, and return the in-window count
    pub fn record(&mut self, key: K, entry: T) -> usize {
        self.entries.entry(key.clone()).or_default().push_back(entry);
        self.prune(&key)
    }

    /// Drop entries older than the horizon for one key
    ///
    /// Returns the remaining count. The key is removed when nothing remains.
    pub fn prune(&mut self, key: &K) -> usize {
        let cutoff = self.cutoff(self.horizon);
        let remaining = match self.entries.get_mut(key) {
            Some(list) => {
                retain_newer(list, cutoff);
                list.len()
            }
            None => return 0,
        };

        if remaining == 0 {
            self.entries.remove(key);
        }
        remaining
    }

    /// Prune every key; returns how many keys were evicted
    pub fn prune_all(&mut self) -> usize {
        let cutoff = self.cutoff(self.horizon);
        let before = self.entries.len();
        self.entries.retain(|_, list| {
            retain_newer(list, cutoff);
            !list.is_empty()
        });
        before - self.entries.len()
    }

    /// Entries for `key` newer than `now - window`, without mutating state
    pub fn count_within(&self, key: &K, window: Duration) -> usize {
        let cutoff = self.cutoff(window);
        self.entries
            .get(key)
            .map(|list| list.iter().filter(|e| is_newer(*e, cutoff)).count())
            .unwrap_or(0)
    }

    /// Entries across all keys newer than `now - window`
    pub fn total_within(&self, window: Duration) -> usize {
        let cutoff = self.cutoff(window);
        self.entries
            .values()
            .flat_map(|list| list.iter())
            .filter(|e| is_newer(*e, cutoff))
            .count()
    }

    pub fn entries(&self, key: &K) -> impl Iterator<Item = &T> {
        self.entries.get(key).into_iter().flat_map(|list| list.iter())
    }

    /// Most recently appended entry for `key`
    pub fn last(&self, key: &K) -> Option<&T> {
        self.entries.get(key).and_then(|list| list.back())
    }

    /// Forget a key entirely
    pub fn clear(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of keys currently held
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cutoff(&self, window: Duration) -> Option<SystemTime> {
        self.clock.now().checked_sub(window)
    }
}

fn is_newer<T: Timestamped>(entry: &T, cutoff: Option<SystemTime>) -> bool {
    match cutoff {
        Some(cutoff) => entry.timestamp() > cutoff,
        None => true,
    }
}

fn retain_newer<T: Timestamped>(list: &mut VecDeque<T>, cutoff: Option<SystemTime>) {
    list.retain(|e| is_newer(e, cutoff));
}
