//! Bounded top-k accumulator.
//!
//! A `BinaryHeap` is a max-heap, so [`TopKEntry`]'s `Ord` is reversed with
//! respect to rank: the greatest entry is the worst one, sitting on top where
//! it can be compared against and evicted in O(log k).

use super::context::Passage;
use crate::cursor::DocId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A scored candidate.
#[derive(Debug, Clone, Copy)]
pub struct TopKEntry {
    pub score: f64,
    pub document: DocId,
    pub passage: Option<Passage>,
}

impl TopKEntry {
    pub fn new(score: f64, document: DocId, passage: Option<Passage>) -> Self {
        Self {
            score,
            document,
            passage,
        }
    }

    /// Final result order: score descending, then document ascending, then
    /// passage begin ascending. `total_cmp` keeps the order total even for
    /// NaN and signed zeros, so the outcome never depends on insertion order.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.document.cmp(&other.document))
            .then_with(|| {
                let begin = |e: &Self| e.passage.map(|p| p.begin);
                begin(self).cmp(&begin(other))
            })
    }
}

impl PartialEq for TopKEntry {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for TopKEntry {}

impl PartialOrd for TopKEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TopKEntry {
    // worse ranks compare greater, so the heap top is the entry to evict
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

/// Keeps the best `k` entries seen so far.
#[derive(Debug)]
pub struct TopKHeap {
    heap: BinaryHeap<TopKEntry>,
    capacity: usize,
}

impl TopKHeap {
    pub fn new(k: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1 << 16)),
            capacity: k,
        }
    }

    /// Score of the worst retained entry, once the heap is full.
    #[inline]
    pub fn threshold(&self) -> Option<f64> {
        if self.is_full() {
            self.heap.peek().map(|e| e.score)
        } else {
            None
        }
    }

    /// Whether `entry` would be retained if inserted now.
    #[inline]
    pub fn would_enter(&self, entry: &TopKEntry) -> bool {
        if self.capacity == 0 {
            return false;
        }
        match self.heap.peek() {
            Some(worst) if self.is_full() => entry.rank_cmp(worst) == Ordering::Less,
            _ => true,
        }
    }

    /// Insert `entry` if it ranks among the best `k`. Returns whether it did.
    pub fn try_insert(&mut self, entry: TopKEntry) -> bool {
        if !self.would_enter(&entry) {
            return false;
        }
        if self.is_full() {
            self.heap.pop();
        }
        self.heap.push(entry);
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Consume the heap, best entry first.
    pub fn into_sorted_vec(self) -> Vec<TopKEntry> {
        // ascending by Ord is best-first
        self.heap.into_sorted_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(score: f64, document: DocId) -> TopKEntry {
        TopKEntry::new(score, document, None)
    }

    #[test]
    fn test_top_k_heap_basic() {
        let mut heap = TopKHeap::new(3);
        assert_eq!(heap.threshold(), None);
        assert!(!heap.is_full());

        heap.try_insert(entry(1.0, 1));
        heap.try_insert(entry(3.0, 2));
        heap.try_insert(entry(2.0, 3));
        assert!(heap.is_full());
        assert_eq!(heap.threshold(), Some(1.0));

        assert!(!heap.try_insert(entry(0.5, 4)));
        assert_eq!(heap.len(), 3);

        assert!(heap.try_insert(entry(4.0, 5)));
        assert_eq!(heap.threshold(), Some(2.0));

        let scores: Vec<f64> = heap.into_sorted_vec().iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_ties_prefer_lower_document() {
        let mut heap = TopKHeap::new(2);
        heap.try_insert(entry(3.0, 0));
        heap.try_insert(entry(1.0, 1));
        heap.try_insert(entry(3.0, 2));
        let docs: Vec<DocId> = heap.into_sorted_vec().iter().map(|e| e.document).collect();
        assert_eq!(docs, vec![0, 2]);

        // an equal score with a higher id never displaces the incumbent
        let mut heap = TopKHeap::new(1);
        heap.try_insert(entry(2.0, 5));
        assert!(!heap.try_insert(entry(2.0, 9)));
        assert!(heap.try_insert(entry(2.0, 1)));
        assert_eq!(heap.into_sorted_vec()[0].document, 1);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let entries = [
            entry(1.0, 4),
            entry(2.5, 1),
            entry(2.5, 0),
            entry(-1.0, 3),
            entry(2.5, 7),
            entry(0.0, 2),
            entry(-0.0, 6),
        ];
        let run = |order: &[usize]| {
            let mut heap = TopKHeap::new(4);
            for &i in order {
                heap.try_insert(entries[i]);
            }
            heap.into_sorted_vec()
                .iter()
                .map(|e| e.document)
                .collect::<Vec<_>>()
        };
        let forward: Vec<usize> = (0..entries.len()).collect();
        let backward: Vec<usize> = (0..entries.len()).rev().collect();
        let shuffled = [3, 6, 0, 5, 2, 4, 1];
        let expected = run(&forward);
        assert_eq!(expected, vec![0, 1, 7, 4]);
        assert_eq!(run(&backward), expected);
        assert_eq!(run(&shuffled), expected);
    }

    #[test]
    fn test_passage_begin_breaks_ties() {
        let a = TopKEntry::new(1.0, 3, Some(Passage::new(50, 150)));
        let b = TopKEntry::new(1.0, 3, Some(Passage::new(0, 100)));
        assert_eq!(b.rank_cmp(&a), Ordering::Less);
    }

    #[test]
    fn test_zero_capacity() {
        let mut heap = TopKHeap::new(0);
        assert!(!heap.try_insert(entry(10.0, 0)));
        assert!(heap.is_empty());
    }

    #[test]
    fn test_nan_is_ordered() {
        let mut heap = TopKHeap::new(2);
        heap.try_insert(entry(f64::NAN, 0));
        heap.try_insert(entry(1.0, 1));
        heap.try_insert(entry(2.0, 2));
        assert_eq!(heap.len(), 2);
    }
}
