//! Bottom-up construction of a cursor tree from a rewritten query tree.
//!
//! Dispatch is on the resolved [`CursorVariant`], so an operator alias builds
//! the same cursor as its canonical name. Every parent converts its children
//! through the [`CursorNode`] `into_*` methods; a child that cannot provide
//! what the parent consumes fails here with `CapabilityMismatch`, before any
//! document is scored.

use super::combination::{BooleanCursor, CombineCursor, Method, Mode, RequireCursor};
use super::scoring::{Bm25Cursor, DEFAULT_B, DEFAULT_K1, DEFAULT_MU, DirichletCursor, LengthBounds};
use super::transform::{LogCursor, PassageFilterCursor, PassageLengthCursor, ScaleCursor};
use super::window::{SynonymCountCursor, SynonymCursor, WindowCursor, WindowKind};
use super::{CountCursor, Cursor, CursorNode, LengthCursor};
use crate::config::{self, DEFAULT_FIELD, FromValue, Parameters};
use crate::engine::context::ScoringContext;
use crate::error::{QueryError, Result};
use crate::index::{FieldStatistics, Index, IndexKey, TermStatistics};
use crate::query::capability::{Capability, CursorVariant, Resolver};
use crate::query::node::{NodeId, QueryTree};
use tracing::debug;

pub struct CursorBuilder<'a> {
    index: &'a dyn Index,
    resolver: &'a Resolver,
    global: &'a Parameters,
    query: &'a Parameters,
}

impl<'a> CursorBuilder<'a> {
    pub fn new(
        index: &'a dyn Index,
        resolver: &'a Resolver,
        global: &'a Parameters,
        query: &'a Parameters,
    ) -> Self {
        Self {
            index,
            resolver,
            global,
            query,
        }
    }

    /// Build the cursor for the whole tree.
    pub fn build(&self, tree: &QueryTree) -> Result<CursorNode> {
        let root = self.build_node(tree, tree.root())?;
        debug!(
            root = root.name(),
            capabilities = %root.capabilities(),
            nodes = tree.node_count(),
            "cursor tree built"
        );
        Ok(root)
    }

    /// Node parameter, else query parameter, else global parameter, else `default`.
    fn setting<T: FromValue>(&self, params: &Parameters, key: &str, default: T) -> T {
        match params.get_as(key) {
            Some(value) => value,
            None => config::resolve(self.query, self.global, key, default),
        }
    }

    pub fn build_node(&self, tree: &QueryTree, id: NodeId) -> Result<CursorNode> {
        let descriptor = self.resolver.resolve(tree, id)?;
        let operator = tree.operator(id);
        let params = tree.parameters(id);
        let children = tree.children(id);

        let node = match descriptor.variant {
            CursorVariant::TermExtents => {
                arity(operator, children, 0, Some(0))?;
                let key = IndexKey::postings(field_of(params), required_str(operator, params, "term")?);
                self.index.open_cursor(&key)?
            }
            CursorVariant::TermCounts => {
                arity(operator, children, 0, Some(0))?;
                let key = IndexKey::counts(field_of(params), required_str(operator, params, "term")?);
                self.index.open_cursor(&key)?
            }
            CursorVariant::FieldLengths => {
                arity(operator, children, 0, Some(0))?;
                self.index.open_cursor(&IndexKey::lengths(field_of(params)))?
            }
            CursorVariant::Prior => {
                arity(operator, children, 0, Some(0))?;
                let name = required_str(operator, params, "name")?;
                self.index.open_cursor(&IndexKey::prior(name))?
            }
            CursorVariant::OrderedWindow | CursorVariant::UnorderedWindow => {
                arity(operator, children, 1, None)?;
                let extents = self.build_all(tree, children, |c| c.into_extent(operator))?;
                let (kind, default_width) = match descriptor.variant {
                    CursorVariant::OrderedWindow => (WindowKind::Ordered, 1),
                    _ => (WindowKind::Unordered, 4 * extents.len()),
                };
                let width = u32::try_from(params.get_usize("width", default_width))
                    .map_err(|_| QueryError::malformed(operator, "width out of range"))?;
                if width == 0 {
                    return Err(QueryError::malformed(operator, "width must be positive"));
                }
                CursorNode::Extent(Box::new(WindowCursor::new(extents, kind, width)?))
            }
            CursorVariant::Synonym => {
                arity(operator, children, 1, None)?;
                if descriptor.has(Capability::Extent) {
                    let extents = self.build_all(tree, children, |c| c.into_extent(operator))?;
                    CursorNode::Extent(Box::new(SynonymCursor::new(extents)?))
                } else {
                    let counts = self.build_all(tree, children, |c| c.into_count(operator))?;
                    CursorNode::Count(Box::new(SynonymCountCursor::new(counts)?))
                }
            }
            CursorVariant::PassageFilter => {
                arity(operator, children, 1, Some(1))?;
                let inner = self.build_node(tree, children[0])?.into_extent(operator)?;
                CursorNode::Extent(Box::new(PassageFilterCursor::new(inner)))
            }
            CursorVariant::PassageLength => {
                arity(operator, children, 1, Some(1))?;
                let inner = self.build_node(tree, children[0])?.into_length(operator)?;
                CursorNode::Length(Box::new(PassageLengthCursor::new(inner)))
            }
            CursorVariant::Dirichlet | CursorVariant::Bm25 => {
                arity(operator, children, 1, Some(2))?;
                let (lengths, field) = self.lengths_input(tree, id)?;
                let counts_node = *children.last().unwrap_or(&id);
                let counts = self.build_node(tree, counts_node)?.into_count(operator)?;
                let term = self.statistics_of(tree, counts_node)?;
                let stats = self.index.field_statistics(&field);
                let bounds = self.length_bounds(tree, id, &field, &stats)?;
                self.scorer(&descriptor.variant, params, lengths, counts, term, stats, bounds)
            }
            CursorVariant::Combine => {
                arity(operator, children, 1, None)?;
                let scored = self.build_all(tree, children, |c| c.into_scored(operator))?;
                let method = match params.get_str("method") {
                    None => Method::Sum,
                    Some(name) => Method::parse(name).ok_or_else(|| {
                        QueryError::malformed(operator, format!("unknown method `{name}`"))
                    })?,
                };
                let mode = match params.get_str("mode") {
                    Some("and") => Mode::Conjunctive,
                    _ => Mode::Disjunctive,
                };
                let mut weights: Vec<f64> = (0..scored.len())
                    .map(|i| params.get_f64(&i.to_string(), 1.0))
                    .collect();
                if params.get_bool("norm", false) {
                    let total: f64 = weights.iter().sum();
                    if total != 0.0 {
                        weights.iter_mut().for_each(|w| *w /= total);
                    }
                }
                CursorNode::Scored(Box::new(CombineCursor::new(scored, weights, method, mode)?))
            }
            CursorVariant::Logarithm => {
                arity(operator, children, 1, Some(1))?;
                let inner = self.build_node(tree, children[0])?.into_scored(operator)?;
                CursorNode::Scored(Box::new(LogCursor::new(inner)))
            }
            CursorVariant::Scale => {
                arity(operator, children, 1, Some(1))?;
                let inner = self.build_node(tree, children[0])?.into_scored(operator)?;
                let weight = params.get_f64("weight", 1.0);
                CursorNode::Scored(Box::new(ScaleCursor::new(inner, weight)))
            }
            CursorVariant::Require => {
                arity(operator, children, 2, Some(2))?;
                let filter = self.build_node(tree, children[0])?.into_indicator();
                let scorer = self.build_node(tree, children[1])?.into_scored(operator)?;
                CursorNode::Scored(Box::new(RequireCursor::new(filter, scorer)?))
            }
            CursorVariant::BooleanAnd | CursorVariant::BooleanOr => {
                arity(operator, children, 1, None)?;
                let mut indicators = Vec::with_capacity(children.len());
                for &child in children {
                    indicators.push(self.build_node(tree, child)?.into_indicator());
                }
                let cursor = if descriptor.variant == CursorVariant::BooleanAnd {
                    BooleanCursor::and(indicators)?
                } else {
                    BooleanCursor::or(indicators)?
                };
                CursorNode::Indicator(Box::new(cursor))
            }
            CursorVariant::Custom(_) => {
                return Err(QueryError::malformed(
                    operator,
                    "registered operator has no cursor implementation",
                ));
            }
        };
        Ok(node)
    }

    fn build_all<T>(
        &self,
        tree: &QueryTree,
        children: &[NodeId],
        convert: impl Fn(CursorNode) -> Result<T>,
    ) -> Result<Vec<T>> {
        children
            .iter()
            .map(|&child| convert(self.build_node(tree, child)?))
            .collect()
    }

    /// Lengths input of a scoring function: the explicit first child of a
    /// two-child form, or for the one-child form the lengths of the scorer's
    /// `field`, else of the first field named under its child.
    fn lengths_input(&self, tree: &QueryTree, id: NodeId) -> Result<(Box<dyn LengthCursor>, String)> {
        let operator = tree.operator(id);
        let children = tree.children(id);
        if children.len() == 2 {
            let lengths = self.build_node(tree, children[0])?.into_length(operator)?;
            let mut source = children[0];
            while let [inner] = tree.children(source) {
                source = *inner;
            }
            return Ok((lengths, field_of(tree.parameters(source)).to_string()));
        }
        let field = match tree.parameters(id).get_str("field") {
            Some(field) => field.to_string(),
            None => tree.field_hint(children[0]).to_string(),
        };
        let lengths = self
            .index
            .open_cursor(&IndexKey::lengths(&field))?
            .into_length(operator)?;
        Ok((lengths, field))
    }

    fn scorer(
        &self,
        variant: &CursorVariant,
        params: &Parameters,
        lengths: Box<dyn LengthCursor>,
        counts: Box<dyn CountCursor>,
        term: TermStatistics,
        field: FieldStatistics,
        bounds: LengthBounds,
    ) -> CursorNode {
        match variant {
            CursorVariant::Bm25 => {
                let k1 = self.setting(params, "k1", DEFAULT_K1);
                let b = self.setting(params, "b", DEFAULT_B);
                CursorNode::Scored(Box::new(Bm25Cursor::new(lengths, counts, k1, b, term, field, bounds)))
            }
            _ => {
                let mu = self.setting(params, "mu", DEFAULT_MU);
                CursorNode::Scored(Box::new(DirichletCursor::new(lengths, counts, mu, term, field, bounds)))
            }
        }
    }

    /// What the scorer at `id` may assume about its lengths. Counts stay
    /// within lengths only for term occurrences scored against lengths of
    /// their own field, and for passage lengths only once the occurrences are
    /// filtered to the same passage. Passage lengths have no useful floor.
    fn length_bounds(
        &self,
        tree: &QueryTree,
        id: NodeId,
        field: &str,
        stats: &FieldStatistics,
    ) -> Result<LengthBounds> {
        let children = tree.children(id);
        let mut passage_lengths = false;
        let mut plain_lengths = children.len() == 1;
        if let [lengths, _] = children {
            let mut node = *lengths;
            loop {
                match self.resolver.resolve(tree, node)?.variant {
                    CursorVariant::PassageLength if tree.children(node).len() == 1 => {
                        passage_lengths = true;
                        node = tree.children(node)[0];
                    }
                    CursorVariant::FieldLengths => {
                        plain_lengths = true;
                        break;
                    }
                    _ => break,
                }
            }
        }

        let mut node = *children.last().unwrap_or(&id);
        let mut filtered = false;
        while self.resolver.resolve(tree, node)?.variant == CursorVariant::PassageFilter {
            match tree.children(node) {
                [inner] => {
                    filtered = true;
                    node = *inner;
                }
                _ => break,
            }
        }
        let term_leaf = matches!(
            self.resolver.resolve(tree, node)?.variant,
            CursorVariant::TermExtents | CursorVariant::TermCounts
        );
        let same_field = plain_lengths && self.terms_in_field(tree, node, field)?;

        Ok(LengthBounds {
            shortest: if same_field && !passage_lengths { stats.min_length } else { 0 },
            counts_within_length: same_field && term_leaf && (filtered || !passage_lengths),
        })
    }

    /// Whether every term leaf under `id` reads `field`.
    fn terms_in_field(&self, tree: &QueryTree, id: NodeId, field: &str) -> Result<bool> {
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            let variant = self.resolver.resolve(tree, node)?.variant;
            if matches!(variant, CursorVariant::TermExtents | CursorVariant::TermCounts)
                && field_of(tree.parameters(node)) != field
            {
                return Ok(false);
            }
            stack.extend(tree.children(node));
        }
        Ok(true)
    }

    /// Collection statistics of the counts a scorer consumes. Term leaves
    /// (possibly under passage filters) ask the index; anything else is
    /// measured by walking a private copy of its cursor.
    fn statistics_of(&self, tree: &QueryTree, id: NodeId) -> Result<TermStatistics> {
        let mut id = id;
        loop {
            let descriptor = self.resolver.resolve(tree, id)?;
            match descriptor.variant {
                CursorVariant::PassageFilter if tree.children(id).len() == 1 => {
                    id = tree.children(id)[0];
                }
                CursorVariant::TermExtents | CursorVariant::TermCounts => {
                    let params = tree.parameters(id);
                    let term = required_str(tree.operator(id), params, "term")?;
                    return Ok(self.index.term_statistics(field_of(params), term));
                }
                _ => break,
            }
        }

        let mut counts = self.build_node(tree, id)?.into_count(tree.operator(id))?;
        let mut stats = TermStatistics::default();
        while !counts.is_done() {
            let doc = counts.current_document();
            let count = counts.count_at(&ScoringContext::for_document(doc));
            if count > 0 {
                stats.document_frequency += 1;
                stats.collection_frequency += count as u64;
                stats.max_count = stats.max_count.max(count);
            }
            counts.move_to(doc + 1)?;
        }
        Ok(stats)
    }
}

fn field_of(params: &Parameters) -> &str {
    params.get_str("field").unwrap_or(DEFAULT_FIELD)
}

fn required_str<'p>(operator: &str, params: &'p Parameters, key: &str) -> Result<&'p str> {
    params
        .get_str(key)
        .ok_or_else(|| QueryError::malformed(operator, format!("missing `{key}` parameter")))
}

fn arity(operator: &str, children: &[NodeId], min: usize, max: Option<usize>) -> Result<()> {
    let count = children.len();
    if count < min || max.is_some_and(|max| count > max) {
        let expected = match max {
            Some(max) if max == min => format!("{min}"),
            Some(max) => format!("{min}..={max}"),
            None => format!("at least {min}"),
        };
        return Err(QueryError::malformed(
            operator,
            format!("expected {expected} children, found {count}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ScoreCursor;
    use crate::index::MemoryIndex;
    use crate::query::node::NodeSpec;

    fn index() -> MemoryIndex {
        let mut builder = MemoryIndex::builder();
        for (name, text) in [
            ("d0", "red fish blue fish"),
            ("d1", "one fish two fish red fish"),
            ("d2", "blue whale"),
        ] {
            let doc = builder.add_document(name);
            builder.add_text(doc, DEFAULT_FIELD, text);
        }
        builder.build()
    }

    fn build(index: &MemoryIndex, spec: NodeSpec) -> Result<CursorNode> {
        let resolver = Resolver::new();
        let params = Parameters::new();
        let tree = QueryTree::from_spec(&spec);
        CursorBuilder::new(index, &resolver, &params, &params).build(&tree)
    }

    #[test]
    fn test_log_over_counts_is_mismatch() {
        let index = index();
        let err = build(
            &index,
            NodeSpec::new("log").child(NodeSpec::new("counts").param("term", "fish")),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            QueryError::CapabilityMismatch {
                expected: Capability::Scored,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_term_parameter() {
        let index = index();
        let err = build(&index, NodeSpec::new("extents")).unwrap_err();
        assert!(matches!(err, QueryError::MalformedTree { .. }));
    }

    #[test]
    fn test_arity_checked() {
        let index = index();
        let err = build(&index, NodeSpec::new("log")).unwrap_err();
        assert!(matches!(err, QueryError::MalformedTree { .. }));
    }

    #[test]
    fn test_window_width_must_fit() {
        let index = index();
        let window = |width: u64| {
            NodeSpec::new("uw")
                .param("width", width)
                .child(NodeSpec::term("red"))
                .child(NodeSpec::term("fish"))
        };
        for width in [0, 1 << 32, u64::MAX] {
            match build(&index, window(width)).unwrap_err() {
                QueryError::MalformedTree { operator, .. } => assert_eq!(operator, "uw"),
                other => panic!("width {width}: expected MalformedTree, got {other:?}"),
            }
        }
        assert!(build(&index, window(u32::MAX as u64)).is_ok());
    }

    #[test]
    fn test_unknown_method() {
        let index = index();
        let spec = NodeSpec::new("combine")
            .param("method", "median")
            .child(NodeSpec::new("dirichlet").child(NodeSpec::term("fish")));
        assert!(matches!(
            build(&index, spec).unwrap_err(),
            QueryError::MalformedTree { .. }
        ));
    }

    #[test]
    fn test_window_statistics_are_measured() {
        let index = index();
        let resolver = Resolver::new();
        let params = Parameters::new();
        let tree = QueryTree::from_spec(
            &NodeSpec::new("od").child(NodeSpec::term("red")).child(NodeSpec::term("fish")),
        );
        let builder = CursorBuilder::new(&index, &resolver, &params, &params);
        let stats = builder.statistics_of(&tree, tree.root()).unwrap();
        assert_eq!(stats.document_frequency, 2);
        assert_eq!(stats.collection_frequency, 2);
        assert_eq!(stats.max_count, 1);
    }

    #[test]
    fn test_dirichlet_one_and_two_child_forms_agree() {
        let index = index();
        let implicit = build(&index, NodeSpec::new("dirichlet").child(NodeSpec::term("fish")))
            .unwrap()
            .into_scored("test")
            .unwrap();
        let explicit = build(
            &index,
            NodeSpec::new("dirichlet")
                .child(NodeSpec::new("lengths"))
                .child(NodeSpec::term("fish")),
        )
        .unwrap()
        .into_scored("test")
        .unwrap();
        let score = |mut c: Box<dyn ScoreCursor>| {
            c.move_to(1).unwrap();
            c.score(&mut ScoringContext::for_document(1))
        };
        assert_eq!(score(implicit), score(explicit));
    }

    #[test]
    fn test_repeated_term_window_stays_under_maximum() {
        let mut builder = MemoryIndex::builder();
        for (name, text) in [("x", "a a a b b"), ("y", "a a a")] {
            let doc = builder.add_document(name);
            builder.add_text(doc, DEFAULT_FIELD, text);
        }
        let index = builder.build();
        for scorer in ["dirichlet", "bm25"] {
            let spec = NodeSpec::new(scorer).child(NodeSpec::new("lengths")).child(
                NodeSpec::new("uw").child(NodeSpec::term("a")).child(NodeSpec::term("a")),
            );
            let mut cursor = build(&index, spec).unwrap().into_scored("test").unwrap();
            let maximum = cursor.maximum_score();
            let mut ctx = ScoringContext::for_document(0);
            while !cursor.is_done() {
                let doc = cursor.current_document();
                ctx.reset(doc);
                let score = cursor.score(&mut ctx);
                assert!(score <= maximum + 1e-12, "{scorer} doc {doc}: {score} > {maximum}");
                cursor.move_to(doc + 1).unwrap();
            }
        }
    }

    #[test]
    fn test_length_bounds_follow_inputs() {
        let index = index();
        let resolver = Resolver::new();
        let params = Parameters::new();
        let builder = CursorBuilder::new(&index, &resolver, &params, &params);
        let stats = index.field_statistics(DEFAULT_FIELD);
        let bounds = |spec: NodeSpec| {
            let tree = QueryTree::from_spec(&spec);
            builder
                .length_bounds(&tree, tree.root(), DEFAULT_FIELD, &stats)
                .unwrap()
        };
        let term = || NodeSpec::term("fish");
        let lengths = || NodeSpec::new("lengths");
        let passage_lengths = || NodeSpec::new("passage-length").child(lengths());
        let filtered = || NodeSpec::new("passage-filter").child(term());

        let plain = bounds(NodeSpec::new("dirichlet").child(lengths()).child(term()));
        assert_eq!(plain, LengthBounds { shortest: 2, counts_within_length: true });
        let passage = bounds(NodeSpec::new("dirichlet").child(passage_lengths()).child(filtered()));
        assert_eq!(passage, LengthBounds { shortest: 0, counts_within_length: true });

        // whole-document counts against passage lengths
        let unfiltered = bounds(NodeSpec::new("dirichlet").child(passage_lengths()).child(term()));
        assert!(!unfiltered.counts_within_length);
        let window = bounds(
            NodeSpec::new("dirichlet")
                .child(lengths())
                .child(NodeSpec::new("uw").child(term()).child(term())),
        );
        assert_eq!(window, LengthBounds { shortest: 2, counts_within_length: false });
        let other_field = bounds(
            NodeSpec::new("dirichlet")
                .child(lengths())
                .child(NodeSpec::term("fish").param("field", "title")),
        );
        assert_eq!(other_field, LengthBounds { shortest: 0, counts_within_length: false });
    }

    #[test]
    fn test_custom_operator_has_no_cursor() {
        let index = index();
        let mut resolver = Resolver::new();
        resolver.register(
            "opaque",
            crate::query::capability::Rule::Fixed(
                crate::query::capability::CapabilitySet::SCORED,
                CursorVariant::Custom("opaque".into()),
            ),
        );
        let params = Parameters::new();
        let tree = QueryTree::from_spec(&NodeSpec::new("opaque"));
        let err = CursorBuilder::new(&index, &resolver, &params, &params)
            .build(&tree)
            .unwrap_err();
        assert!(matches!(err, QueryError::MalformedTree { .. }));
    }
}
