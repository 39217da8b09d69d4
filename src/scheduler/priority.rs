//! Task prioritization.
//!
//! Lower numbers run first. The backlog is an index-addressable min-heap so a
//! waiting item's priority can be changed (or the item removed) by key
//! without a linear scan and re-sort.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::SchedulerError;

/// Priority of a task: one of three symbolic tiers or a raw number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    Hot,
    Warm,
    Cold,
    /// Explicit numeric priority.
    Value(i64),
}

impl Priority {
    pub const HOT: i64 = 1;
    pub const WARM: i64 = 5;
    pub const COLD: i64 = 10;

    /// Numeric value used for ordering.
    pub fn value(self) -> i64 {
        match self {
            Self::Hot => Self::HOT,
            Self::Warm => Self::WARM,
            Self::Cold => Self::COLD,
            Self::Value(v) => v,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Value(0)
    }
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Self::Value(value)
    }
}

impl FromStr for Priority {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HOT" => Ok(Self::Hot),
            "WARM" => Ok(Self::Warm),
            "COLD" => Ok(Self::Cold),
            other => other
                .parse::<i64>()
                .map(Self::Value)
                .map_err(|_| SchedulerError::Config(format!("unknown priority '{s}'"))),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hot => write!(f, "HOT"),
            Self::Warm => write!(f, "WARM"),
            Self::Cold => write!(f, "COLD"),
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}

/// Item with associated priority for queue ordering.
#[derive(Debug)]
struct PrioritizedItem<T> {
    key: String,
    priority: i64,
    sequence: u64,
    item: T,
}

impl<T> PrioritizedItem<T> {
    // Min-heap order: lower priority number first, then lower sequence.
    fn precedes(&self, other: &Self) -> bool {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => self.sequence < other.sequence,
            ord => ord == Ordering::Less,
        }
    }
}

/// Keyed min-heap supporting in-place priority updates.
///
/// Keys are unique: pushing an existing key replaces nothing and returns the
/// item back to the caller.
pub struct PriorityQueue<T> {
    heap: Vec<PrioritizedItem<T>>,
    slots: HashMap<String, usize>,
    next_sequence: u64,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: Vec::new(),
            slots: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Insert an item. Fails with the item if the key is already present.
    pub fn push(&mut self, key: impl Into<String>, priority: i64, item: T) -> Result<(), T> {
        let key = key.into();
        if self.slots.contains_key(&key) {
            return Err(item);
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let idx = self.heap.len();
        self.slots.insert(key.clone(), idx);
        self.heap.push(PrioritizedItem { key, priority, sequence, item });
        self.sift_up(idx);
        Ok(())
    }

    /// Remove and return the most urgent item.
    pub fn pop(&mut self) -> Option<(String, T)> {
        if self.heap.is_empty() {
            return None;
        }
        let entry = self.remove_at(0);
        Some((entry.key, entry.item))
    }

    pub fn peek(&self) -> Option<(&str, i64)> {
        self.heap.first().map(|e| (e.key.as_str(), e.priority))
    }

    /// Change the priority of a waiting item. Returns false if absent.
    ///
    /// The insertion sequence is kept, so ties still resolve by submission
    /// order after an update.
    pub fn update_priority(&mut self, key: &str, priority: i64) -> bool {
        let Some(&idx) = self.slots.get(key) else {
            return false;
        };
        let old = self.heap[idx].priority;
        self.heap[idx].priority = priority;
        match priority.cmp(&old) {
            Ordering::Less => self.sift_up(idx),
            Ordering::Greater => self.sift_down(idx),
            Ordering::Equal => {}
        }
        true
    }

    /// Remove a waiting item by key.
    pub fn remove(&mut self, key: &str) -> Option<T> {
        let idx = *self.slots.get(key)?;
        Some(self.remove_at(idx).item)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn priority_of(&self, key: &str) -> Option<i64> {
        self.slots.get(key).map(|&idx| self.heap[idx].priority)
    }

    /// Keys and priorities of all waiting items, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, i64)> {
        self.heap.iter().map(|e| (e.key.as_str(), e.priority))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn remove_at(&mut self, idx: usize) -> PrioritizedItem<T> {
        let entry = self.heap.swap_remove(idx);
        self.slots.remove(&entry.key);
        if idx < self.heap.len() {
            self.slots.insert(self.heap[idx].key.clone(), idx);
            self.sift_down(idx);
            self.sift_up(idx);
        }
        entry
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        self.slots.insert(self.heap[a].key.clone(), a);
        self.slots.insert(self.heap[b].key.clone(), b);
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.heap[idx].precedes(&self.heap[parent]) {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut best = idx;
            if left < len && self.heap[left].precedes(&self.heap[best]) {
                best = left;
            }
            if right < len && self.heap[right].precedes(&self.heap[best]) {
                best = right;
            }
            if best == idx {
                break;
            }
            self.swap(idx, best);
            idx = best;
        }
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PriorityQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.heap.len())
            .field("next", &self.peek())
            .finish()
    }
}
