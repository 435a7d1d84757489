//! Bounded per-deck history of samples and their velocity estimates

use crate::sample::EncoderSample;
use std::collections::VecDeque;

/// A sample together with the velocity estimated for it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub sample: EncoderSample,
    pub velocity: f64,
}

/// Ring buffer of the last `capacity` entries
///
/// Appending to a full history evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct EncoderHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl EncoderHistory {
    /// Create an empty history holding at most `capacity` entries (min 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest one when full
    pub fn push(&mut self, sample: EncoderSample, velocity: f64) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry { sample, velocity });
    }

    /// Arithmetic mean of the stored velocity estimates
    pub fn average_velocity(&self) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        let sum: f64 = self.entries.iter().map(|e| e.velocity).sum();
        Some(sum / self.entries.len() as f64)
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
