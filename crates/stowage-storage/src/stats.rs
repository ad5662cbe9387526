// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-connection operation counters.
//!
//! One [`StatsCollector`] is owned by a storage service and shared by `Arc`
//! with every worker that runs statements for it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use stowage_core::OperationKind;

/// Point-in-time copy of all counters: connection name -> kind -> count.
pub type StatsSnapshot = BTreeMap<String, BTreeMap<OperationKind, u64>>;

/// Lock-free counters keyed by connection name and operation kind.
#[derive(Debug, Default)]
pub struct StatsCollector {
    counters: DashMap<(String, OperationKind), AtomicU64>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to the counter for `connection`/`kind`.
    pub fn increment(&self, connection: &str, kind: OperationKind) {
        let key = (connection.to_string(), kind);
        if let Some(counter) = self.counters.get(&key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(key)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, connection: &str, kind: OperationKind) -> u64 {
        self.counters
            .get(&(connection.to_string(), kind))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Sum of every counter.
    pub fn total(&self) -> u64 {
        self.counters
            .iter()
            .map(|entry| entry.value().load(Ordering::Relaxed))
            .sum()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let mut snapshot = StatsSnapshot::new();
        for entry in self.counters.iter() {
            let (connection, kind) = entry.key();
            snapshot
                .entry(connection.clone())
                .or_default()
                .insert(*kind, entry.value().load(Ordering::Relaxed));
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn counts_per_connection_and_kind() {
        let stats = StatsCollector::new();
        stats.increment("default", OperationKind::Insert);
        stats.increment("default", OperationKind::Insert);
        stats.increment("isolated", OperationKind::Update);

        assert_eq!(stats.get("default", OperationKind::Insert), 2);
        assert_eq!(stats.get("isolated", OperationKind::Update), 1);
        assert_eq!(stats.get("default", OperationKind::Update), 0);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn snapshot_nests_by_connection() {
        let stats = StatsCollector::new();
        stats.increment("default", OperationKind::Select);
        stats.increment("default", OperationKind::Commit);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot["default"][&OperationKind::Select], 1);
        assert_eq!(snapshot["default"][&OperationKind::Commit], 1);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["default"]["select"], 1);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let stats = Arc::new(StatsCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.increment("default", OperationKind::Update);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.get("default", OperationKind::Update), 8000);
    }
}
