//! Cursors that share one document axis across several children.
//!
//! [`Combination`] owns the axis logic: a disjunctive axis sits on the
//! smallest child document, a conjunctive axis only on documents every child
//! agrees on. Moves reach a child only when it is behind the target, so a
//! combination never asks a child to go backwards.

use super::{Cursor, DocId, ScoreCursor, TERMINATED, check_move};
use crate::engine::context::ScoringContext;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Disjunctive,
    Conjunctive,
}

/// Shared document axis over a list of children.
pub struct Combination<C: ?Sized + Cursor> {
    name: &'static str,
    children: Vec<Box<C>>,
    mode: Mode,
    /// Children in ascending cost; the cheapest leads conjunctive alignment.
    order: Vec<usize>,
    current: DocId,
}

impl<C: ?Sized + Cursor> Combination<C> {
    pub fn new(name: &'static str, children: Vec<Box<C>>, mode: Mode) -> Result<Self> {
        let mut order: Vec<usize> = (0..children.len()).collect();
        order.sort_by_key(|&i| children[i].cost());
        let mut axis = Self {
            name,
            children,
            mode,
            order,
            current: 0,
        };
        axis.current = axis.settle(0)?;
        Ok(axis)
    }

    #[inline]
    pub fn current(&self) -> DocId {
        self.current
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn children(&self) -> &[Box<C>] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Box<C>] {
        &mut self.children
    }

    pub fn move_to(&mut self, target: DocId) -> Result<()> {
        check_move(self.name, self.current, target)?;
        if target == self.current {
            return Ok(());
        }
        self.current = self.settle(target)?;
        Ok(())
    }

    fn settle(&mut self, target: DocId) -> Result<DocId> {
        match self.mode {
            Mode::Disjunctive => self.union(target),
            Mode::Conjunctive => self.align(target),
        }
    }

    fn union(&mut self, target: DocId) -> Result<DocId> {
        let mut smallest = TERMINATED;
        for child in &mut self.children {
            if child.current_document() < target {
                child.move_to(target)?;
            }
            smallest = smallest.min(child.current_document());
        }
        Ok(smallest)
    }

    fn align(&mut self, mut target: DocId) -> Result<DocId> {
        if self.children.is_empty() {
            return Ok(TERMINATED);
        }
        loop {
            let mut agreed = true;
            for &i in &self.order {
                let child = &mut self.children[i];
                if child.current_document() < target {
                    child.move_to(target)?;
                }
                let doc = child.current_document();
                if doc == TERMINATED {
                    return Ok(TERMINATED);
                }
                if doc > target {
                    target = doc;
                    agreed = false;
                }
            }
            if agreed {
                return Ok(target);
            }
        }
    }

    pub fn cost(&self) -> u64 {
        let costs = self.children.iter().map(|c| c.cost());
        match self.mode {
            Mode::Disjunctive => costs.sum(),
            Mode::Conjunctive => costs.min().unwrap_or(0),
        }
    }
}

/// How `combine` folds its children's weighted scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Sum,
    Max,
}

impl Method {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sum" | "wsum" => Some(Method::Sum),
            "max" => Some(Method::Max),
            _ => None,
        }
    }
}

/// Weighted combination of scored children.
pub struct CombineCursor {
    axis: Combination<dyn ScoreCursor>,
    weights: Vec<f64>,
    method: Method,
    /// Per-child weighted upper bound contribution.
    upper: Vec<f64>,
    /// Per-child weighted lower bound contribution.
    lower: Vec<f64>,
}

impl CombineCursor {
    pub fn new(
        children: Vec<Box<dyn ScoreCursor>>,
        weights: Vec<f64>,
        method: Method,
        mode: Mode,
    ) -> Result<Self> {
        debug_assert_eq!(children.len(), weights.len());
        let (upper, lower): (Vec<f64>, Vec<f64>) = children
            .iter()
            .zip(&weights)
            .map(|(child, &w)| {
                let (hi, lo) = (w * child.maximum_score(), w * child.minimum_score());
                if w >= 0.0 { (hi, lo) } else { (lo, hi) }
            })
            .unzip();
        Ok(Self {
            axis: Combination::new("combine", children, mode)?,
            weights,
            method,
            upper,
            lower,
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn sum(&mut self, ctx: &mut ScoringContext) -> f64 {
        let mut total = 0.0;
        for (child, &w) in self.axis.children_mut().iter_mut().zip(&self.weights) {
            total += w * child.score(ctx);
        }
        total
    }

    /// Sum that stops as soon as the remaining children cannot lift the
    /// document above the threshold. The bound folds in the same order as
    /// the full sum, so a pruned document's real score never exceeds it.
    fn delta_sum(&mut self, ctx: &mut ScoringContext, threshold: f64) -> (f64, bool) {
        let count = self.weights.len();
        let mut total = 0.0;
        for i in 0..count {
            total += self.weights[i] * self.axis.children_mut()[i].score(ctx);
            if i + 1 < count {
                let bound = self.upper[i + 1..].iter().fold(total, |acc, u| acc + u);
                if bound <= threshold {
                    return (bound, true);
                }
            }
        }
        (total, false)
    }
}

impl Cursor for CombineCursor {
    fn name(&self) -> &'static str {
        "combine"
    }

    fn current_document(&self) -> DocId {
        self.axis.current()
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        self.axis.move_to(target)
    }

    fn cost(&self) -> u64 {
        self.axis.cost()
    }
}

impl ScoreCursor for CombineCursor {
    fn score(&mut self, ctx: &mut ScoringContext) -> f64 {
        match self.method {
            Method::Max => {
                let mut best = f64::NEG_INFINITY;
                for (child, &w) in self.axis.children_mut().iter_mut().zip(&self.weights) {
                    best = best.max(w * child.score(ctx));
                }
                best
            }
            Method::Sum => match ctx.delta.take() {
                // nested cursors never see the delta state
                Some(mut delta) => {
                    let (score, pruned) = self.delta_sum(ctx, delta.threshold);
                    delta.partial = score;
                    delta.pruned = pruned;
                    ctx.delta = Some(delta);
                    score
                }
                None => self.sum(ctx),
            },
        }
    }

    fn maximum_score(&self) -> f64 {
        match self.method {
            Method::Sum => self.upper.iter().fold(0.0, |acc, u| acc + u),
            Method::Max => self.upper.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    fn minimum_score(&self) -> f64 {
        match self.method {
            Method::Sum => self.lower.iter().fold(0.0, |acc, l| acc + l),
            Method::Max => self.lower.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    fn supports_delta(&self) -> bool {
        self.method == Method::Sum && self.weights.iter().all(|&w| w >= 0.0)
    }
}

/// `band` / `bor`: pure indicator over the children's shared axis.
pub struct BooleanCursor {
    name: &'static str,
    axis: Combination<dyn Cursor>,
}

impl BooleanCursor {
    pub fn and(children: Vec<Box<dyn Cursor>>) -> Result<Self> {
        Ok(Self {
            name: "band",
            axis: Combination::new("band", children, Mode::Conjunctive)?,
        })
    }

    pub fn or(children: Vec<Box<dyn Cursor>>) -> Result<Self> {
        Ok(Self {
            name: "bor",
            axis: Combination::new("bor", children, Mode::Disjunctive)?,
        })
    }
}

impl Cursor for BooleanCursor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn current_document(&self) -> DocId {
        self.axis.current()
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        self.axis.move_to(target)
    }

    fn cost(&self) -> u64 {
        self.axis.cost()
    }
}

/// `require`: documents of the first child, scored by the second.
pub struct RequireCursor {
    filter: Box<dyn Cursor>,
    scorer: Box<dyn ScoreCursor>,
}

impl RequireCursor {
    pub fn new(filter: Box<dyn Cursor>, scorer: Box<dyn ScoreCursor>) -> Result<Self> {
        let mut cursor = Self { filter, scorer };
        cursor.sync_scorer()?;
        Ok(cursor)
    }

    fn sync_scorer(&mut self) -> Result<()> {
        let doc = self.filter.current_document();
        if doc != TERMINATED && self.scorer.current_document() < doc {
            self.scorer.move_to(doc)?;
        }
        Ok(())
    }
}

impl Cursor for RequireCursor {
    fn name(&self) -> &'static str {
        "require"
    }

    fn current_document(&self) -> DocId {
        self.filter.current_document()
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        check_move(self.name(), self.current_document(), target)?;
        if self.filter.current_document() < target {
            self.filter.move_to(target)?;
        }
        self.sync_scorer()
    }

    fn cost(&self) -> u64 {
        self.filter.cost()
    }
}

impl ScoreCursor for RequireCursor {
    fn score(&mut self, ctx: &mut ScoringContext) -> f64 {
        if self.filter.has_match(ctx.document) {
            self.scorer.score(ctx)
        } else {
            self.scorer.minimum_score()
        }
    }

    fn maximum_score(&self) -> f64 {
        self.scorer.maximum_score()
    }

    fn minimum_score(&self) -> f64 {
        self.scorer.minimum_score()
    }
}
