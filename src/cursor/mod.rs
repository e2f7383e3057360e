//! Movable cursors over the document-id axis.
//!
//! A cursor sits on one document at a time and only ever moves forward.
//! Capability traits extend [`Cursor`] with what a cursor can report for the
//! document named by the [`ScoringContext`]: scores, counts, extents or
//! lengths. A cursor that is not on the context's document reports the
//! neutral value (background score, zero count, no extents, zero length).
//!
//! Cursors are composed into a tree by [`build::CursorBuilder`]; every
//! constructed node is a [`CursorNode`] tagged with its primary capability,
//! and parents take children through the `into_*` conversions, which is where
//! capability mismatches are caught.

pub mod build;
pub mod combination;
pub mod scoring;
pub mod transform;
pub mod window;

use crate::engine::context::ScoringContext;
use crate::error::{QueryError, Result};
use crate::query::capability::{Capability, CapabilitySet};
use serde::Serialize;

/// Dense document identifier.
pub type DocId = u32;

/// Position of a cursor that has run out of documents.
pub const TERMINATED: DocId = DocId::MAX;

/// Half-open token span `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Extent {
    pub begin: u32,
    pub end: u32,
}

impl Extent {
    pub fn new(begin: u32, end: u32) -> Self {
        Self { begin, end }
    }

    /// Single-token extent at `position`.
    pub fn at(position: u32) -> Self {
        Self {
            begin: position,
            end: position + 1,
        }
    }
}

/// Forward-only iterator over documents.
pub trait Cursor {
    /// Operator name, used in errors and logs.
    fn name(&self) -> &'static str;

    /// The document the cursor sits on, or [`TERMINATED`].
    fn current_document(&self) -> DocId;

    /// Move to the first document `>= target`. Moving backwards is an error.
    fn move_to(&mut self, target: DocId) -> Result<()>;

    #[inline]
    fn is_done(&self) -> bool {
        self.current_document() == TERMINATED
    }

    #[inline]
    fn has_match(&self, document: DocId) -> bool {
        document != TERMINATED && self.current_document() == document
    }

    /// Estimated number of remaining postings.
    fn cost(&self) -> u64;
}

pub trait ScoreCursor: Cursor {
    fn score(&mut self, ctx: &mut ScoringContext) -> f64;

    /// Static upper bound over every document.
    fn maximum_score(&self) -> f64;

    /// Static lower bound over every document.
    fn minimum_score(&self) -> f64;

    /// Whether this cursor honors [`ScoringContext::delta`] when it is the root.
    fn supports_delta(&self) -> bool {
        false
    }
}

pub trait CountCursor: Cursor {
    fn count_at(&mut self, ctx: &ScoringContext) -> u32;
}

pub trait ExtentCursor: Cursor {
    fn extents_at(&mut self, ctx: &ScoringContext) -> &[Extent];
}

pub trait LengthCursor: Cursor {
    fn length_at(&mut self, ctx: &ScoringContext) -> u32;
}

/// Guard shared by every `move_to`: reject backward moves.
#[inline]
pub(crate) fn check_move(cursor: &'static str, current: DocId, target: DocId) -> Result<()> {
    if target < current {
        return Err(QueryError::InvalidMove {
            cursor,
            current,
            target,
        });
    }
    Ok(())
}

/// Bring a lagging side cursor up to `document` during scoring.
#[inline]
pub(crate) fn sync_to<C: Cursor + ?Sized>(cursor: &mut C, document: DocId) {
    if cursor.current_document() < document {
        // forward moves cannot fail
        let moved = cursor.move_to(document);
        debug_assert!(moved.is_ok());
    }
}

/// A constructed cursor tagged with its primary capability.
pub enum CursorNode {
    Indicator(Box<dyn Cursor>),
    Count(Box<dyn CountCursor>),
    Extent(Box<dyn ExtentCursor>),
    Length(Box<dyn LengthCursor>),
    Scored(Box<dyn ScoreCursor>),
}

impl CursorNode {
    /// Everything this node can be converted into.
    pub fn capabilities(&self) -> CapabilitySet {
        match self {
            CursorNode::Indicator(_) => CapabilitySet::INDICATOR,
            CursorNode::Count(_) => CapabilitySet::COUNT | CapabilitySet::INDICATOR,
            CursorNode::Extent(_) => {
                CapabilitySet::EXTENT | CapabilitySet::COUNT | CapabilitySet::INDICATOR
            }
            CursorNode::Length(_) => CapabilitySet::LENGTH | CapabilitySet::INDICATOR,
            CursorNode::Scored(_) => CapabilitySet::SCORED | CapabilitySet::INDICATOR,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CursorNode::Indicator(c) => c.name(),
            CursorNode::Count(c) => c.name(),
            CursorNode::Extent(c) => c.name(),
            CursorNode::Length(c) => c.name(),
            CursorNode::Scored(c) => c.name(),
        }
    }

    fn mismatch(&self, operator: &str, expected: Capability) -> QueryError {
        QueryError::CapabilityMismatch {
            operator: operator.to_string(),
            expected,
            found: self.capabilities(),
        }
    }

    pub fn into_indicator(self) -> Box<dyn Cursor> {
        match self {
            CursorNode::Indicator(c) => c,
            CursorNode::Count(c) => Box::new(IndicatorView::new(c)),
            CursorNode::Extent(c) => Box::new(IndicatorView::new(c)),
            CursorNode::Length(c) => Box::new(IndicatorView::new(c)),
            CursorNode::Scored(c) => Box::new(IndicatorView::new(c)),
        }
    }

    pub fn into_count(self, operator: &str) -> Result<Box<dyn CountCursor>> {
        match self {
            CursorNode::Count(c) => Ok(c),
            CursorNode::Extent(c) => Ok(Box::new(ExtentCounts::new(c))),
            other => Err(other.mismatch(operator, Capability::Count)),
        }
    }

    pub fn into_extent(self, operator: &str) -> Result<Box<dyn ExtentCursor>> {
        match self {
            CursorNode::Extent(c) => Ok(c),
            other => Err(other.mismatch(operator, Capability::Extent)),
        }
    }

    pub fn into_length(self, operator: &str) -> Result<Box<dyn LengthCursor>> {
        match self {
            CursorNode::Length(c) => Ok(c),
            other => Err(other.mismatch(operator, Capability::Length)),
        }
    }

    pub fn into_scored(self, operator: &str) -> Result<Box<dyn ScoreCursor>> {
        match self {
            CursorNode::Scored(c) => Ok(c),
            other => Err(other.mismatch(operator, Capability::Scored)),
        }
    }
}

impl std::fmt::Debug for CursorNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CursorNode({}, {})", self.name(), self.capabilities())
    }
}

/// Presents any cursor as a plain indicator.
pub struct IndicatorView<C: ?Sized + Cursor> {
    inner: Box<C>,
}

impl<C: ?Sized + Cursor> IndicatorView<C> {
    pub fn new(inner: Box<C>) -> Self {
        Self { inner }
    }
}

impl<C: ?Sized + Cursor> Cursor for IndicatorView<C> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn current_document(&self) -> DocId {
        self.inner.current_document()
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        self.inner.move_to(target)
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }
}

/// Counts of an extent cursor: the number of extents at the document.
pub struct ExtentCounts {
    inner: Box<dyn ExtentCursor>,
}

impl ExtentCounts {
    pub fn new(inner: Box<dyn ExtentCursor>) -> Self {
        Self { inner }
    }
}

impl Cursor for ExtentCounts {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn current_document(&self) -> DocId {
        self.inner.current_document()
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        self.inner.move_to(target)
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }
}

impl CountCursor for ExtentCounts {
    fn count_at(&mut self, ctx: &ScoringContext) -> u32 {
        self.inner.extents_at(ctx).len() as u32
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_backward_move_rejected() {
        let mut cursor = FixedScores::new(vec![(2, 1.0), (5, 1.0)], 0.0);
        cursor.move_to(5).unwrap();
        let err = cursor.move_to(3).unwrap_err();
        assert!(matches!(
            err,
            QueryError::InvalidMove {
                current: 5,
                target: 3,
                ..
            }
        ));
        // staying put is fine
        cursor.move_to(5).unwrap();
    }

    #[test]
    fn test_move_past_end_terminates() {
        let mut cursor = FixedScores::new(vec![(2, 1.0)], 0.0);
        cursor.move_to(3).unwrap();
        assert!(cursor.is_done());
        assert!(!cursor.has_match(TERMINATED));
    }

    #[test]
    fn test_extent_counts_adapter() {
        let node = CursorNode::Extent(FixedExtents::positions(&[(1, &[0, 4, 9])]));
        let mut counts = node.into_count("dirichlet").unwrap();
        let ctx = ScoringContext::for_document(1);
        assert_eq!(counts.count_at(&ctx), 3);
        let other = ScoringContext::for_document(2);
        assert_eq!(counts.count_at(&other), 0);
    }

    #[test]
    fn test_conversion_mismatch() {
        let node = CursorNode::Scored(FixedScores::boxed(vec![(1, 1.0)], 0.0));
        let err = node.into_extent("od").err().unwrap();
        match err {
            QueryError::CapabilityMismatch {
                operator,
                expected,
                found,
            } => {
                assert_eq!(operator, "od");
                assert_eq!(expected, Capability::Extent);
                assert!(found.has(Capability::Scored));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_indicator_view_delegates() {
        let node = CursorNode::Extent(FixedExtents::positions(&[(1, &[0]), (4, &[2])]));
        let mut indicator = node.into_indicator();
        assert_eq!(drain(indicator.as_mut()), vec![1, 4]);
    }
}
