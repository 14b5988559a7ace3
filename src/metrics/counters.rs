//! Monotonic counters.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    value: AtomicU64,
}

impl Counter {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A counter split by one label value, e.g. the command name.
#[derive(Debug)]
pub struct LabeledCounter {
    name: &'static str,
    label: &'static str,
    counters: RwLock<HashMap<String, AtomicU64>>,
}

impl LabeledCounter {
    pub fn new(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            counters: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn inc(&self, value: &str) {
        {
            let counters = self.counters.read();
            if let Some(counter) = counters.get(value) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        self.counters
            .write()
            .entry(value.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, value: &str) -> u64 {
        self.counters
            .read()
            .get(value)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// All label values with their counts, sorted by label value.
    pub fn get_all(&self) -> Vec<(String, u64)> {
        let mut all: Vec<(String, u64)> = self
            .counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();
        all.sort();
        all
    }
}
