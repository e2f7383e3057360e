//! Per-document scoring context.

use crate::cursor::{DocId, TERMINATED};
use serde::Serialize;

/// A token window `[begin, end)` of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Passage {
    pub begin: u32,
    pub end: u32,
}

impl Passage {
    pub fn new(begin: u32, end: u32) -> Self {
        Self { begin, end }
    }

    #[inline]
    pub fn contains(&self, begin: u32, end: u32) -> bool {
        begin >= self.begin && end <= self.end
    }
}

/// Threshold and running state for incremental scoring of the root combiner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaState {
    /// Score the document must beat to enter the accumulator.
    pub threshold: f64,
    /// Sum of the contributions evaluated so far.
    pub partial: f64,
    /// Set when the document was abandoned before all children were scored.
    pub pruned: bool,
}

impl DeltaState {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            partial: 0.0,
            pruned: false,
        }
    }
}

/// Scratch record for the document under evaluation.
///
/// The engine owns exactly one and resets it before each document (and
/// each passage). Cursors read the document and passage; only the root
/// combiner touches the delta state.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    pub document: DocId,
    pub passage: Option<Passage>,
    pub delta: Option<DeltaState>,
}

impl Default for ScoringContext {
    fn default() -> Self {
        Self {
            document: TERMINATED,
            passage: None,
            delta: None,
        }
    }
}

impl ScoringContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for scoring `document` as a whole.
    pub fn for_document(document: DocId) -> Self {
        Self {
            document,
            ..Self::default()
        }
    }

    /// Clear everything left over from the previous document.
    pub fn reset(&mut self, document: DocId) {
        self.document = document;
        self.passage = None;
        self.delta = None;
    }

    /// True when the root combiner gave up on the current document.
    pub fn was_pruned(&self) -> bool {
        self.delta.is_some_and(|d| d.pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_state() {
        let mut ctx = ScoringContext::for_document(3);
        ctx.passage = Some(Passage::new(0, 10));
        ctx.delta = Some(DeltaState {
            threshold: 1.0,
            partial: 0.5,
            pruned: true,
        });
        assert!(ctx.was_pruned());

        ctx.reset(4);
        assert_eq!(ctx.document, 4);
        assert!(ctx.passage.is_none());
        assert!(!ctx.was_pruned());
    }

    #[test]
    fn test_passage_contains() {
        let passage = Passage::new(10, 20);
        assert!(passage.contains(10, 20));
        assert!(passage.contains(12, 13));
        assert!(!passage.contains(9, 11));
        assert!(!passage.contains(19, 21));
    }
}
