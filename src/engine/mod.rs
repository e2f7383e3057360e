//! Query execution: rewrite, build cursors, score, accumulate.
//!
//! [`Retrieval`] is the entry point. It owns the capability resolver and the
//! global parameters, borrows nothing from a particular query, and is shared
//! read-only by every query it runs.
//!
//! Scoring walks the root cursor document by document in ascending id order.
//! Two optional optimizations cut work without changing results:
//!
//! - **early termination** stops once the accumulator is full and the root's
//!   maximum possible score can no longer beat the worst retained entry
//! - **delta scoring** lets the root `combine` abandon a document as soon as
//!   its partial sum plus the remaining children's maxima cannot beat that
//!   entry
//!
//! Both are exact because ties are broken toward the lower document id (and
//! lower passage begin), which every later candidate loses.

pub mod context;
pub mod topk;

use crate::config::{self, DEFAULT_FIELD, DEFAULT_PASSAGE_SHIFT, DEFAULT_PASSAGE_SIZE, DEFAULT_REQUESTED, Parameters, keys};
use crate::cursor::build::CursorBuilder;
use crate::cursor::{DocId, LengthCursor, ScoreCursor, sync_to};
use crate::error::{QueryError, Result};
use crate::index::{Index, IndexKey};
use crate::query::capability::Resolver;
use crate::query::node::QueryTree;
use crate::traversal::Pipeline;
use context::{DeltaState, Passage, ScoringContext};
use serde::Serialize;
use std::sync::Arc;
use topk::{TopKEntry, TopKHeap};
use tracing::debug;

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub document: DocId,
    pub name: String,
    pub score: f64,
    /// 1-based position in the result list.
    pub rank: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passage: Option<Passage>,
}

/// Counters collected while scoring one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    /// Documents the root cursor stopped on.
    pub documents_visited: usize,
    /// Score evaluations that ran to completion (one per passage in passage mode).
    pub scored: usize,
    /// Evaluations the root combiner abandoned early.
    pub delta_pruned: usize,
    /// Evaluations that made it into the accumulator at some point.
    pub entered_top_k: usize,
    pub early_terminated: bool,
}

impl ExecutionStats {
    /// Percentage of evaluations cut short by delta scoring.
    pub fn pruning_efficiency(&self) -> f64 {
        let total = self.scored + self.delta_pruned;
        if total == 0 {
            return 0.0;
        }
        (self.delta_pruned as f64 / total as f64) * 100.0
    }
}

/// Ranked results of one query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Results {
    pub documents: Vec<ScoredDocument>,
    pub stats: ExecutionStats,
}

impl Results {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Document names in rank order.
    pub fn names(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.name.as_str()).collect()
    }
}

/// Passage windowing for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PassageWindow {
    size: u32,
    shift: u32,
}

impl PassageWindow {
    fn from_settings(query: &Parameters, global: &Parameters) -> Result<Self> {
        let size: usize = config::resolve(query, global, keys::PASSAGE_SIZE, DEFAULT_PASSAGE_SIZE);
        let shift: usize = config::resolve(query, global, keys::PASSAGE_SHIFT, DEFAULT_PASSAGE_SHIFT);
        if size == 0 {
            return Err(QueryError::InvalidConfig(format!("{} must be positive", keys::PASSAGE_SIZE)));
        }
        if shift == 0 {
            return Err(QueryError::InvalidConfig(format!("{} must be positive", keys::PASSAGE_SHIFT)));
        }
        let clamp = |v: usize| u32::try_from(v).unwrap_or(u32::MAX);
        Ok(Self {
            size: clamp(size),
            shift: clamp(shift),
        })
    }

    /// Windows covering a document of `length` tokens. A document always has
    /// at least one passage, even when empty.
    fn passages(&self, length: u32) -> Vec<Passage> {
        let mut passages = Vec::new();
        let mut begin = 0u32;
        loop {
            let end = begin.saturating_add(self.size).min(length);
            passages.push(Passage::new(begin, end));
            if end >= length {
                break;
            }
            begin = begin.saturating_add(self.shift);
        }
        passages
    }
}

/// Runs queries against one index.
pub struct Retrieval {
    index: Arc<dyn Index>,
    resolver: Resolver,
    global: Parameters,
}

impl Retrieval {
    pub fn new(index: Arc<dyn Index>, global: Parameters) -> Self {
        Self {
            index,
            resolver: Resolver::new(),
            global,
        }
    }

    /// Replace the capability resolver, e.g. one with extra operators registered.
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut Resolver {
        &mut self.resolver
    }

    pub fn global_parameters(&self) -> &Parameters {
        &self.global
    }

    pub fn index(&self) -> &dyn Index {
        self.index.as_ref()
    }

    /// Run the standard traversal pipeline over `tree`.
    pub fn rewrite(&self, mut tree: QueryTree, query: &Parameters) -> Result<QueryTree> {
        Pipeline::standard(&self.resolver, query, &self.global).run(&mut tree)?;
        tree.compact();
        Ok(tree)
    }

    /// Score a rewritten tree and return the best `requested` results.
    pub fn execute(&self, tree: &QueryTree, query: &Parameters) -> Result<Results> {
        let global = &self.global;
        let requested: usize = config::resolve(query, global, keys::REQUESTED, DEFAULT_REQUESTED);
        let early_termination = config::resolve(query, global, keys::EARLY_TERMINATION, false);
        let delta_scoring = config::resolve(query, global, keys::DELTA_SCORING, false);
        let passage_mode =
            config::resolve_any(query, global, &[keys::PASSAGE_QUERY, keys::EXTENT_QUERY], false);

        let root_operator = tree.operator(tree.root()).to_string();
        let mut root = CursorBuilder::new(self.index.as_ref(), &self.resolver, global, query)
            .build(tree)?
            .into_scored(&root_operator)?;

        let mut passages = if passage_mode {
            let window = PassageWindow::from_settings(query, global)?;
            let field = config::resolve(query, global, keys::PASSAGE_FIELD, DEFAULT_FIELD.to_string());
            let lengths = self
                .index
                .open_cursor(&IndexKey::lengths(&field))?
                .into_length("lengths")?;
            Some((window, lengths))
        } else {
            None
        };

        if requested == 0 {
            return Ok(Results::default());
        }

        let mut run = Run {
            heap: TopKHeap::new(requested),
            ctx: ScoringContext::new(),
            stats: ExecutionStats::default(),
            delta: delta_scoring && root.supports_delta(),
        };
        let ceiling = root.maximum_score();

        while !root.is_done() {
            let document = root.current_document();
            if early_termination && run.heap.threshold().is_some_and(|t| ceiling <= t) {
                run.stats.early_terminated = true;
                break;
            }
            run.stats.documents_visited += 1;

            match passages.as_mut() {
                None => run.evaluate(root.as_mut(), document, None),
                Some((window, lengths)) => {
                    sync_to(lengths.as_mut(), document);
                    let length = lengths.length_at(&ScoringContext::for_document(document));
                    for passage in window.passages(length) {
                        run.evaluate(root.as_mut(), document, Some(passage));
                    }
                }
            }

            root.move_to(document.saturating_add(1))?;
        }

        let stats = run.stats;
        debug!(
            requested,
            visited = stats.documents_visited,
            scored = stats.scored,
            delta_pruned = stats.delta_pruned,
            entered = stats.entered_top_k,
            early_terminated = stats.early_terminated,
            "query executed"
        );

        let documents = run
            .heap
            .into_sorted_vec()
            .into_iter()
            .enumerate()
            .map(|(i, entry)| ScoredDocument {
                document: entry.document,
                name: self
                    .index
                    .document_name(entry.document)
                    .unwrap_or_else(|| entry.document.to_string()),
                score: entry.score,
                rank: i + 1,
                passage: entry.passage,
            })
            .collect();

        Ok(Results { documents, stats })
    }

    /// Build a tree from `spec`, rewrite it and execute it.
    pub fn run(&self, spec: &crate::query::node::NodeSpec, query: &Parameters) -> Result<Results> {
        let tree = self.rewrite(QueryTree::from_spec(spec), query)?;
        self.execute(&tree, query)
    }
}

/// Mutable state of one `execute` call.
struct Run {
    heap: TopKHeap,
    ctx: ScoringContext,
    stats: ExecutionStats,
    delta: bool,
}

impl Run {
    fn evaluate(&mut self, root: &mut dyn ScoreCursor, document: DocId, passage: Option<Passage>) {
        self.ctx.reset(document);
        self.ctx.passage = passage;
        if self.delta {
            self.ctx.delta = self.heap.threshold().map(DeltaState::new);
        }

        let score = root.score(&mut self.ctx);
        if self.ctx.was_pruned() {
            self.stats.delta_pruned += 1;
            return;
        }
        self.stats.scored += 1;
        if self.heap.try_insert(TopKEntry::new(score, document, passage)) {
            self.stats.entered_top_k += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::query::node::NodeSpec;

    fn prior_index() -> Arc<dyn Index> {
        let mut builder = MemoryIndex::builder();
        for (name, prior) in [("a", 3.0), ("b", 1.0), ("c", 3.0), ("d", 2.0)] {
            let doc = builder.add_document(name);
            builder.set_prior("p", doc, prior);
        }
        Arc::new(builder.build())
    }

    fn prior_query() -> NodeSpec {
        NodeSpec::new("prior").param("name", "p")
    }

    #[test]
    fn test_passage_windows() {
        let window = PassageWindow { size: 4, shift: 2 };
        assert_eq!(
            window.passages(7),
            vec![Passage::new(0, 4), Passage::new(2, 6), Passage::new(4, 7)]
        );
        assert_eq!(window.passages(0), vec![Passage::new(0, 0)]);
        assert_eq!(window.passages(4), vec![Passage::new(0, 4)]);
    }

    #[test]
    fn test_zero_passage_size_is_rejected() {
        let query = Parameters::new().with(keys::PASSAGE_SIZE, 0);
        let err = PassageWindow::from_settings(&query, &Parameters::new()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidConfig(_)));
    }

    #[test]
    fn test_top_k_with_ties() {
        let retrieval = Retrieval::new(prior_index(), Parameters::new());
        let results = retrieval
            .run(&prior_query(), &Parameters::new().with(keys::REQUESTED, 2))
            .unwrap();
        assert_eq!(results.names(), ["a", "c"]);
        assert_eq!(results.documents[0].rank, 1);
        assert_eq!(results.documents[1].rank, 2);
    }

    #[test]
    fn test_zero_requested_is_empty() {
        let retrieval = Retrieval::new(prior_index(), Parameters::new());
        let results = retrieval
            .run(&prior_query(), &Parameters::new().with(keys::REQUESTED, 0))
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_early_termination_same_results() {
        let retrieval = Retrieval::new(prior_index(), Parameters::new());
        let plain = Parameters::new().with(keys::REQUESTED, 2);
        let early = plain.clone().with(keys::EARLY_TERMINATION, true);
        let a = retrieval.run(&prior_query(), &plain).unwrap();
        let b = retrieval.run(&prior_query(), &early).unwrap();
        assert_eq!(a.documents, b.documents);
        // the ceiling is 3.0 and both 3.0 documents are in by doc 2
        assert!(b.stats.early_terminated);
        assert!(b.stats.documents_visited < a.stats.documents_visited);
    }

    #[test]
    fn test_scalar_root_must_be_scored() {
        let retrieval = Retrieval::new(prior_index(), Parameters::new());
        let tree = QueryTree::from_spec(&NodeSpec::new("lengths"));
        let err = retrieval.execute(&tree, &Parameters::new()).unwrap_err();
        assert!(matches!(err, QueryError::CapabilityMismatch { .. }));
    }
}
