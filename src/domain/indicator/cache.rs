//! Bounded indicator cache with first-in first-out eviction.

use log::debug;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Maps indicator identity keys to computed series.
///
/// Eviction drops the oldest inserted key regardless of how recently it was
/// read. A capacity of zero disables caching.
#[derive(Debug)]
pub struct IndicatorCache {
    max_entries: usize,
    entries: HashMap<String, Rc<[f64]>>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl Default for IndicatorCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl IndicatorCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Identity key for an indicator, or `None` when a parameter is not a
    /// primitive (array or object) and the result must not be cached.
    pub fn key(kind: &str, symbol: &str, params: &BTreeMap<String, Value>) -> Option<String> {
        let mut parts = Vec::with_capacity(params.len());
        for (k, v) in params {
            let text = match v {
                Value::Null => "none".to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                Value::Array(_) | Value::Object(_) => return None,
            };
            parts.push(format!("{k}:{text}"));
        }
        Some(format!("{kind}-symbol:{symbol}-{}", parts.join("-")))
    }

    pub fn get(&mut self, key: &str) -> Option<Rc<[f64]>> {
        match self.entries.get(key) {
            Some(data) => {
                self.hits += 1;
                debug!("indicator cache hit: {key}");
                Some(Rc::clone(data))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: String, data: Rc<[f64]>) {
        if self.max_entries == 0 {
            return;
        }
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = data;
            return;
        }
        while self.order.len() >= self.max_entries {
            if let Some(oldest) = self.order.pop_front() {
                debug!("indicator cache evict: {oldest}");
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, data);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
