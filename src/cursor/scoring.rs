//! Scoring functions over counts and lengths, and static priors.
//!
//! Every scorer reports static bounds derived from index statistics only, so
//! the engine can compare them against the accumulator threshold before a
//! document is scored.

use super::{Cursor, CountCursor, DocId, LengthCursor, ScoreCursor, TERMINATED, check_move, sync_to};
use crate::engine::context::ScoringContext;
use crate::error::Result;
use crate::index::{FieldStatistics, TermStatistics};

pub const DEFAULT_MU: f64 = 1500.0;
pub const DEFAULT_K1: f64 = 1.2;
pub const DEFAULT_B: f64 = 0.75;

/// What a scorer may assume about the lengths it is given, for its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthBounds {
    /// No scored document reports a shorter length.
    pub shortest: u32,
    /// A count never exceeds the length it is scored against. Plain term
    /// occurrences satisfy this; overlapping windows or a length taken from
    /// another field do not.
    pub counts_within_length: bool,
}

impl LengthBounds {
    /// Length the best-scoring document of `max_count` occurrences can have.
    fn best_length(&self, max_count: u32) -> u32 {
        if self.counts_within_length {
            max_count.max(self.shortest)
        } else {
            self.shortest
        }
    }
}

/// Query likelihood with Dirichlet smoothing.
pub struct DirichletCursor {
    lengths: Box<dyn LengthCursor>,
    counts: Box<dyn CountCursor>,
    mu: f64,
    background: f64,
    max: f64,
    min: f64,
}

impl DirichletCursor {
    pub fn new(
        lengths: Box<dyn LengthCursor>,
        counts: Box<dyn CountCursor>,
        mu: f64,
        term: TermStatistics,
        field: FieldStatistics,
        bounds: LengthBounds,
    ) -> Self {
        let collection_length = field.collection_length.max(1) as f64;
        let background = if term.collection_frequency > 0 {
            // measured window counts can outnumber the tokens
            (term.collection_frequency as f64 / collection_length).min(1.0)
        } else {
            // unseen terms still get a non-zero floor
            0.5 / collection_length
        };
        let mut cursor = Self {
            lengths,
            counts,
            mu,
            background,
            max: 0.0,
            min: 0.0,
        };
        cursor.max = cursor.formula(term.max_count, bounds.best_length(term.max_count));
        cursor.min = cursor.formula(0, field.max_length);
        cursor
    }

    #[inline]
    fn formula(&self, count: u32, length: u32) -> f64 {
        ((count as f64 + self.mu * self.background) / (length as f64 + self.mu)).ln()
    }
}

impl Cursor for DirichletCursor {
    fn name(&self) -> &'static str {
        "dirichlet"
    }

    fn current_document(&self) -> DocId {
        self.counts.current_document()
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        self.counts.move_to(target)
    }

    fn cost(&self) -> u64 {
        self.counts.cost()
    }
}

impl ScoreCursor for DirichletCursor {
    fn score(&mut self, ctx: &mut ScoringContext) -> f64 {
        sync_to(self.lengths.as_mut(), ctx.document);
        let count = self.counts.count_at(ctx);
        let length = self.lengths.length_at(ctx);
        self.formula(count, length)
    }

    fn maximum_score(&self) -> f64 {
        self.max
    }

    fn minimum_score(&self) -> f64 {
        self.min
    }
}

/// Okapi BM25.
pub struct Bm25Cursor {
    lengths: Box<dyn LengthCursor>,
    counts: Box<dyn CountCursor>,
    k1: f64,
    b: f64,
    idf: f64,
    average_length: f64,
    max: f64,
}

impl Bm25Cursor {
    pub fn new(
        lengths: Box<dyn LengthCursor>,
        counts: Box<dyn CountCursor>,
        k1: f64,
        b: f64,
        term: TermStatistics,
        field: FieldStatistics,
        bounds: LengthBounds,
    ) -> Self {
        let documents = field.document_count as f64;
        let df = term.document_frequency as f64;
        let idf = (1.0 + (documents - df + 0.5) / (df + 0.5)).ln();
        let average_length = if field.document_count > 0 {
            (field.collection_length as f64 / documents).max(f64::MIN_POSITIVE)
        } else {
            1.0
        };
        let mut cursor = Self {
            lengths,
            counts,
            k1,
            b,
            idf,
            average_length,
            max: 0.0,
        };
        // a negative idf leaves an absent term as the best case
        cursor.max = cursor
            .formula(term.max_count, bounds.best_length(term.max_count))
            .max(0.0);
        cursor
    }

    #[inline]
    fn formula(&self, count: u32, length: u32) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let tf = count as f64;
        let norm = self.k1 * (1.0 - self.b + self.b * length as f64 / self.average_length);
        self.idf * tf * (self.k1 + 1.0) / (tf + norm)
    }
}

impl Cursor for Bm25Cursor {
    fn name(&self) -> &'static str {
        "bm25"
    }

    fn current_document(&self) -> DocId {
        self.counts.current_document()
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        self.counts.move_to(target)
    }

    fn cost(&self) -> u64 {
        self.counts.cost()
    }
}

impl ScoreCursor for Bm25Cursor {
    fn score(&mut self, ctx: &mut ScoringContext) -> f64 {
        let count = self.counts.count_at(ctx);
        if count == 0 {
            return 0.0;
        }
        sync_to(self.lengths.as_mut(), ctx.document);
        let length = self.lengths.length_at(ctx);
        self.formula(count, length)
    }

    fn maximum_score(&self) -> f64 {
        self.max
    }

    fn minimum_score(&self) -> f64 {
        0.0
    }
}

/// Static per-document scores; unlisted documents get `default`.
pub struct PriorCursor {
    entries: Vec<(DocId, f64)>,
    position: usize,
    default: f64,
    max: f64,
    min: f64,
}

impl PriorCursor {
    /// `entries` must be sorted by document.
    pub fn new(entries: Vec<(DocId, f64)>, default: f64) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        let max = entries.iter().map(|e| e.1).fold(default, f64::max);
        let min = entries.iter().map(|e| e.1).fold(default, f64::min);
        Self {
            entries,
            position: 0,
            default,
            max,
            min,
        }
    }
}

impl Cursor for PriorCursor {
    fn name(&self) -> &'static str {
        "prior"
    }

    fn current_document(&self) -> DocId {
        self.entries
            .get(self.position)
            .map_or(TERMINATED, |e| e.0)
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        check_move(self.name(), self.current_document(), target)?;
        let rest = &self.entries[self.position..];
        self.position += rest.partition_point(|e| e.0 < target);
        Ok(())
    }

    fn cost(&self) -> u64 {
        (self.entries.len() - self.position) as u64
    }
}

impl ScoreCursor for PriorCursor {
    fn score(&mut self, ctx: &mut ScoringContext) -> f64 {
        match self.entries.get(self.position) {
            Some(&(doc, score)) if doc == ctx.document => score,
            _ => self.default,
        }
    }

    fn maximum_score(&self) -> f64 {
        self.max
    }

    fn minimum_score(&self) -> f64 {
        self.min
    }
}
