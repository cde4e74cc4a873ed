//! One polling cycle's decoded values
//!
//! A `Reading` is built fresh each cycle and discarded after reporting. It
//! contains only keys whose spec is enabled and whose read succeeded; a
//! missing key means "no value this cycle", never zero.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    /// Cycle timestamp (UTC)
    pub timestamp: DateTime<Utc>,
    /// Decoded engineering values, ordered by key
    pub values: BTreeMap<String, f64>,
    /// True when the values were synthesized rather than read from the wire
    pub synthetic: bool,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
            synthetic: false,
        }
    }

    pub fn synthetic(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
            synthetic: true,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}
