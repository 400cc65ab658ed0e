use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::compact_map::CompactHashMap;
use crate::ClassId;

/// Counters for one storage class.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassStats {
    pub created: u64,
    pub erased: u64,
    pub bytes: u64,
}

impl ClassStats {
    /// Records still reachable through lookup.
    pub fn live(&self) -> u64 {
        self.created.saturating_sub(self.erased)
    }
}

/// Per-class counters keyed by display name, sorted for stable output.
pub type StatsSnapshot = BTreeMap<String, ClassStats>;

/// Allocation and erase counters for one uniquer.
#[derive(Debug)]
pub struct StorageStats {
    enabled: bool,
    inner: Mutex<CompactHashMap<ClassId, ClassStats>>,
}

impl Default for StorageStats {
    fn default() -> Self {
        Self::new(true)
    }
}

impl StorageStats {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            inner: Mutex::new(CompactHashMap::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_created(&self, class: ClassId, bytes: usize) {
        if !self.enabled {
            return;
        }
        let mut g = self.inner.lock();
        let e = g.entry(class).or_default();
        e.created = e.created.saturating_add(1);
        e.bytes = e.bytes.saturating_add(bytes as u64);
    }

    pub fn record_erased(&self, class: ClassId) {
        if !self.enabled {
            return;
        }
        let mut g = self.inner.lock();
        let e = g.entry(class).or_default();
        e.erased = e.erased.saturating_add(1);
    }

    pub fn get(&self, class: ClassId) -> ClassStats {
        self.inner.lock().get(&class).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let g = self.inner.lock();
        let mut out = StatsSnapshot::new();
        for (class, stats) in g.iter() {
            let e = out.entry(class.short_name()).or_default();
            e.created += stats.created;
            e.erased += stats.erased;
            e.bytes += stats.bytes;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tracked;

    #[test]
    fn stats_records() {
        let stats = StorageStats::new(true);
        let class = ClassId::of::<Tracked>();
        stats.record_created(class, 16);
        stats.record_created(class, 8);
        stats.record_erased(class);

        let s = stats.get(class);
        assert_eq!(s.created, 2);
        assert_eq!(s.erased, 1);
        assert_eq!(s.bytes, 24);
        assert_eq!(s.live(), 1);
        assert_eq!(stats.snapshot().get("Tracked"), Some(&s));
    }

    #[test]
    fn disabled_stats_stay_empty() {
        let stats = StorageStats::new(false);
        stats.record_created(ClassId::of::<Tracked>(), 16);
        assert!(stats.snapshot().is_empty());
    }
}
