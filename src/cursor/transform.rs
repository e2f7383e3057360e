//! Single-child wrappers that delegate movement and rewrite one value.

use super::{Cursor, DocId, Extent, ExtentCursor, LengthCursor, ScoreCursor};
use crate::engine::context::ScoringContext;
use crate::error::Result;

macro_rules! delegate_cursor {
    ($ty:ty, $name:literal) => {
        impl Cursor for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            #[inline]
            fn current_document(&self) -> DocId {
                self.inner.current_document()
            }

            #[inline]
            fn move_to(&mut self, target: DocId) -> Result<()> {
                self.inner.move_to(target)
            }

            fn cost(&self) -> u64 {
                self.inner.cost()
            }
        }
    };
}

/// Natural logarithm of a child's scores.
///
/// No clamping: a zero score maps to negative infinity, a negative one to NaN.
/// Only applies to scores; raw counts must go through a scoring function first.
pub struct LogCursor {
    inner: Box<dyn ScoreCursor>,
}

impl LogCursor {
    pub fn new(inner: Box<dyn ScoreCursor>) -> Self {
        Self { inner }
    }
}

delegate_cursor!(LogCursor, "log");

impl ScoreCursor for LogCursor {
    fn score(&mut self, ctx: &mut ScoringContext) -> f64 {
        self.inner.score(ctx).ln()
    }

    fn maximum_score(&self) -> f64 {
        self.inner.maximum_score().ln()
    }

    fn minimum_score(&self) -> f64 {
        self.inner.minimum_score().ln()
    }
}

/// Child score times a constant weight.
pub struct ScaleCursor {
    inner: Box<dyn ScoreCursor>,
    weight: f64,
}

impl ScaleCursor {
    pub fn new(inner: Box<dyn ScoreCursor>, weight: f64) -> Self {
        Self { inner, weight }
    }
}

delegate_cursor!(ScaleCursor, "scale");

impl ScoreCursor for ScaleCursor {
    fn score(&mut self, ctx: &mut ScoringContext) -> f64 {
        self.weight * self.inner.score(ctx)
    }

    fn maximum_score(&self) -> f64 {
        if self.weight >= 0.0 {
            self.weight * self.inner.maximum_score()
        } else {
            self.weight * self.inner.minimum_score()
        }
    }

    fn minimum_score(&self) -> f64 {
        if self.weight >= 0.0 {
            self.weight * self.inner.minimum_score()
        } else {
            self.weight * self.inner.maximum_score()
        }
    }
}

/// Extents of the child that lie entirely inside the context passage.
pub struct PassageFilterCursor {
    inner: Box<dyn ExtentCursor>,
    buffer: Vec<Extent>,
}

impl PassageFilterCursor {
    pub fn new(inner: Box<dyn ExtentCursor>) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
        }
    }
}

delegate_cursor!(PassageFilterCursor, "passage-filter");

impl ExtentCursor for PassageFilterCursor {
    fn extents_at(&mut self, ctx: &ScoringContext) -> &[Extent] {
        let extents = self.inner.extents_at(ctx);
        let Some(passage) = ctx.passage else {
            return extents;
        };
        self.buffer.clear();
        self.buffer.extend(
            extents
                .iter()
                .filter(|e| passage.contains(e.begin, e.end))
                .copied(),
        );
        &self.buffer
    }
}

/// Child length clipped to the context passage.
pub struct PassageLengthCursor {
    inner: Box<dyn LengthCursor>,
}

impl PassageLengthCursor {
    pub fn new(inner: Box<dyn LengthCursor>) -> Self {
        Self { inner }
    }
}

delegate_cursor!(PassageLengthCursor, "passage-length");

impl LengthCursor for PassageLengthCursor {
    fn length_at(&mut self, ctx: &ScoringContext) -> u32 {
        let length = self.inner.length_at(ctx);
        match ctx.passage {
            Some(passage) => length.min(passage.end).saturating_sub(passage.begin),
            None => length,
        }
    }
}
