//! Statistics collection and reporting utilities.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe counter collection, e.g. for the server runtime's
/// connections-accepted/admission-refused/rpc-dispatched counters.
pub struct StatsCounter {
    counters: HashMap<&'static str, AtomicU64>,
}

impl StatsCounter {
    pub fn new(names: &[&'static str]) -> Self {
        let mut counters = HashMap::new();
        for &name in names {
            counters.insert(name, AtomicU64::new(0));
        }
        Self { counters }
    }

    pub fn increment(&self, name: &str) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn add(&self, name: &str, value: u64) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        self.counters
            .iter()
            .map(|(&k, v)| (k, v.load(Ordering::Relaxed)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_and_get() {
        let stats = StatsCounter::new(&["connections_accepted"]);
        stats.increment("connections_accepted");
        stats.increment("connections_accepted");
        assert_eq!(stats.get("connections_accepted"), 2);
    }

    #[test]
    fn unknown_counter_reads_zero_and_ignores_writes() {
        let stats = StatsCounter::new(&["a"]);
        stats.increment("b");
        assert_eq!(stats.get("b"), 0);
    }

    #[test]
    fn add_accumulates_by_value() {
        let stats = StatsCounter::new(&["bytes_sent"]);
        stats.add("bytes_sent", 40);
        stats.add("bytes_sent", 2);
        assert_eq!(stats.get("bytes_sent"), 42);
    }
}
