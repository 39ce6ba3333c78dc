//! Per-tab record of sources already counted in the current redirect chain.
//!
//! A hop counted when its redirect was issued must not be counted again when
//! the chain parameter is read back at the final destination.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct ChainLedger {
    tabs: Mutex<HashMap<i32, HashSet<String>>>,
}

impl ChainLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `source` as counted for `tab_id`.
    pub fn record(&self, tab_id: i32, source: impl Into<String>) {
        self.tabs.lock().entry(tab_id).or_default().insert(source.into());
    }

    /// Whether `source` was already counted for `tab_id`.
    pub fn contains(&self, tab_id: i32, source: &str) -> bool {
        self.tabs.lock().get(&tab_id).is_some_and(|sources| sources.contains(source))
    }

    /// Remove and return everything recorded for `tab_id`.
    pub fn take(&self, tab_id: i32) -> HashSet<String> {
        self.tabs.lock().remove(&tab_id).unwrap_or_default()
    }

    /// Number of tabs with an open chain.
    pub fn len(&self) -> usize {
        self.tabs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_take() {
        let ledger = ChainLedger::new();
        ledger.record(1, "a.com");
        ledger.record(1, "b.com");
        ledger.record(2, "a.com");

        assert!(ledger.contains(1, "b.com"));
        assert!(!ledger.contains(2, "b.com"));

        let taken = ledger.take(1);
        assert_eq!(taken.len(), 2);
        assert!(!ledger.contains(1, "a.com"));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.take(9).is_empty());
    }
}
