//! Array-backed max-heap keyed by time-decaying priority score.
//!
//! The ordering key is not static: it combines attributes fixed at
//! submission time with elapsed wait, so the relative order of entries
//! drifts continuously without any entry being touched. The heap therefore
//! exposes [`PriorityHeap::recompute_all`], which rescores every entry
//! against a shared "now" and rebuilds the heap bottom-up; a purely local
//! re-sift after one change would miss global reordering caused by the
//! passage of time alone.
//!
//! Alongside the array the heap maintains an identifier → position index
//! for O(1) lookup. The index is updated on every swap, so the bidirectional
//! mapping (every id to exactly one valid position, every position's id back
//! to that position) holds before any operation returns.
//!
//! `std::collections::BinaryHeap` cannot be used here: it offers no stable
//! positions to index, no point removal, and no in-place rescore.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::policy::{score_entry, PriorityWeights};
use crate::types::{EntryError, EntryPatch, QueueEntry, RequestId};

/// Mutable max-priority queue over pending aid requests.
///
/// All operations are O(log n) except the whole-structure rebuilds
/// ([`recompute_all`](Self::recompute_all),
/// [`load_from_collection`](Self::load_from_collection)), which are O(n).
///
/// Equal scores preserve no guaranteed relative order; sifting tie-breaks
/// toward the left child.
#[derive(Debug, Clone)]
pub struct PriorityHeap {
    /// Heap array. Parent at `(i - 1) / 2`, children at `2i + 1` / `2i + 2`.
    entries: Vec<QueueEntry>,
    /// Identifier → current array position.
    positions: HashMap<RequestId, usize>,
    /// Scoring weights shared by every (re)scoring pass.
    weights: PriorityWeights,
}

impl PriorityHeap {
    /// Create an empty heap with default weights.
    pub fn new() -> Self {
        Self::with_weights(PriorityWeights::default())
    }

    /// Create an empty heap with explicit weights.
    pub fn with_weights(weights: PriorityWeights) -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
            weights,
        }
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the heap holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The scoring weights in effect.
    pub fn weights(&self) -> &PriorityWeights {
        &self.weights
    }

    /// Look up an entry by id without touching heap order.
    pub fn get(&self, id: &RequestId) -> Option<&QueueEntry> {
        self.positions.get(id).map(|&idx| &self.entries[idx])
    }

    /// Insert an entry, scoring it at `now`.
    ///
    /// Returns the entry as stored, carrying its computed priority score.
    /// The id must not already be present in the heap; ids are assigned by
    /// the external record store and are unique per pending request.
    pub fn insert(&mut self, mut entry: QueueEntry, now: DateTime<Utc>) -> QueueEntry {
        entry.priority_score = score_entry(&entry, now, &self.weights);

        let idx = self.entries.len();
        self.positions.insert(entry.id.clone(), idx);
        self.entries.push(entry);
        let resting = self.sift_up(idx);

        debug!(
            id = %self.entries[resting].id,
            score = self.entries[resting].priority_score,
            size = self.entries.len(),
            "heap insert"
        );
        self.entries[resting].clone()
    }

    /// Return the highest-priority entry without mutation, or `None` if the
    /// heap is empty.
    pub fn peek(&self) -> Option<&QueueEntry> {
        self.entries.first()
    }

    /// Remove and return the highest-priority entry, or `None` if the heap
    /// is empty.
    pub fn extract_max(&mut self) -> Option<QueueEntry> {
        if self.entries.is_empty() {
            return None;
        }
        if self.entries.len() == 1 {
            let max = self.entries.pop()?;
            self.positions.remove(&max.id);
            return Some(max);
        }

        let last = self.entries.len() - 1;
        self.entries.swap(0, last);
        let max = self.entries.pop()?;
        self.positions.remove(&max.id);
        self.positions.insert(self.entries[0].id.clone(), 0);
        self.sift_down(0);

        debug!(id = %max.id, score = max.priority_score, size = self.entries.len(), "heap extract");
        Some(max)
    }

    /// Remove an arbitrary entry by id, or `None` if absent.
    ///
    /// The last array element takes the vacated slot and is sifted in both
    /// directions: only one direction can actually move it, but its correct
    /// resting position relative to its new neighbors is not known a priori.
    pub fn remove_by_id(&mut self, id: &RequestId) -> Option<QueueEntry> {
        let idx = self.positions.remove(id)?;
        let last = self.entries.len() - 1;
        self.entries.swap(idx, last);
        let removed = self.entries.pop()?;

        if idx < self.entries.len() {
            self.positions.insert(self.entries[idx].id.clone(), idx);
            self.sift_down(idx);
            self.sift_up(idx);
        }

        debug!(id = %removed.id, size = self.entries.len(), "heap remove");
        Some(removed)
    }

    /// Merge a partial update into the entry with the given id, rescore it
    /// at `now`, and re-sift.
    ///
    /// Returns `Ok(None)` if the id is absent. Returns the updated entry as
    /// stored on success. An invalid patch leaves the heap untouched.
    pub fn update_by_id(
        &mut self,
        id: &RequestId,
        patch: &EntryPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueEntry>, EntryError> {
        let Some(&idx) = self.positions.get(id) else {
            return Ok(None);
        };

        let old_score = self.entries[idx].priority_score;
        patch.apply(&mut self.entries[idx])?;
        let weights = self.weights.clone();
        let new_score = score_entry(&self.entries[idx], now, &weights);
        self.entries[idx].priority_score = new_score;

        let resting = if new_score > old_score {
            self.sift_up(idx)
        } else if new_score < old_score {
            self.sift_down(idx)
        } else {
            idx
        };

        debug!(id = %id, old_score, new_score, "heap update");
        Ok(Some(self.entries[resting].clone()))
    }

    /// Rescore every entry against a shared `now`, rebuild the heap
    /// invariant bottom-up, and rebuild the identifier index. O(n).
    pub fn recompute_all(&mut self, now: DateTime<Utc>) {
        let weights = self.weights.clone();
        for entry in &mut self.entries {
            let score = score_entry(entry, now, &weights);
            entry.priority_score = score;
        }
        self.rebuild();
    }

    /// Replace heap contents wholesale, scoring all entries at `now`.
    ///
    /// Used only for cold-start recovery. Duplicate ids are collapsed to
    /// their first occurrence: the identifier index holds one position per
    /// id, so a corrupted source must not load the same request twice.
    pub fn load_from_collection(&mut self, entries: Vec<QueueEntry>, now: DateTime<Utc>) {
        let mut seen = HashSet::with_capacity(entries.len());
        self.entries = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.id.clone()))
            .collect();
        self.recompute_all(now);
        debug!(size = self.entries.len(), "heap loaded from collection");
    }

    /// Rescore everything at `now` and return all entries sorted by
    /// descending priority.
    ///
    /// This is a reordering operation, not a pure read: scores and heap
    /// positions are updated in place before the sorted copy is taken. The
    /// returned sequence is a full sort; heap array order is only a
    /// partial order.
    pub fn all_ordered(&mut self, now: DateTime<Utc>) -> Vec<QueueEntry> {
        self.recompute_all(now);
        self.to_sorted_vec()
    }

    /// Sorted copy of the current contents using the stored scores, without
    /// rescoring. Descending priority.
    pub fn to_sorted_vec(&self) -> Vec<QueueEntry> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted
    }

    // ── internal sift machinery ─────────────────────────────────────────

    /// Swap two array slots and keep the index mapping consistent.
    fn swap_slots(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.positions.insert(self.entries[a].id.clone(), a);
        self.positions.insert(self.entries[b].id.clone(), b);
    }

    /// Walk an entry toward the root while it outscores its parent.
    /// Returns its resting position.
    fn sift_up(&mut self, mut idx: usize) -> usize {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.entries[idx].priority_score > self.entries[parent].priority_score {
                self.swap_slots(idx, parent);
                idx = parent;
            } else {
                break;
            }
        }
        idx
    }

    /// Walk an entry toward the leaves while a child outscores it. When both
    /// children tie, the left child wins. Returns its resting position.
    fn sift_down(&mut self, mut idx: usize) -> usize {
        let len = self.entries.len();
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut largest = idx;

            if left < len
                && self.entries[left].priority_score > self.entries[largest].priority_score
            {
                largest = left;
            }
            if right < len
                && self.entries[right].priority_score > self.entries[largest].priority_score
            {
                largest = right;
            }
            if largest == idx {
                break;
            }
            self.swap_slots(idx, largest);
            idx = largest;
        }
        idx
    }

    /// Restore the heap invariant over the whole array (bottom-up, from the
    /// last parent to the root) and rebuild the identifier index.
    fn rebuild(&mut self) {
        if self.entries.len() > 1 {
            let last_parent = (self.entries.len() - 2) / 2;
            for idx in (0..=last_parent).rev() {
                self.sift_down(idx);
            }
        }
        self.positions.clear();
        for (idx, entry) in self.entries.iter().enumerate() {
            self.positions.insert(entry.id.clone(), idx);
        }
    }
}

impl Default for PriorityHeap {
    fn default() -> Self {
        Self::new()
    }
}
