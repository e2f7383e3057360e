//! Wraps bare count producers in a scoring function where a score is expected.
//!
//! `#combine(#extents:term=a())` cannot run as written: `combine` sums
//! scores and the term only produces counts. This pass turns it into
//! `#combine(#dirichlet(#lengths:field=document() #extents:term=a()))`.
//! Only `combine` children and the root are touched; anywhere else a count
//! producer is left alone and cursor construction reports the mismatch.
//!
//! A scoring function written with counts only, `#dirichlet(x)`, gets its
//! lengths spelled out as `#dirichlet(#lengths:field=f() x)` so later passes
//! see every input it reads.

use super::Traversal;
use crate::config::{self, DEFAULT_SCORER, Parameters, keys};
use crate::error::Result;
use crate::query::capability::{Capability, CursorVariant, Resolver};
use crate::query::node::{NodeId, QueryTree};

pub struct ImplicitScoring<'a> {
    resolver: &'a Resolver,
    scorer: String,
}

impl<'a> ImplicitScoring<'a> {
    pub fn new(resolver: &'a Resolver, query: &Parameters, global: &Parameters) -> Self {
        let scorer = config::resolve(query, global, keys::SCORER, DEFAULT_SCORER.to_string());
        Self { resolver, scorer }
    }

    fn wants_score(&self, tree: &QueryTree, node: NodeId) -> Result<bool> {
        match tree.parent(node) {
            None => Ok(true),
            Some(parent) => {
                Ok(self.resolver.resolve(tree, parent)?.variant == CursorVariant::Combine)
            }
        }
    }
}

impl Traversal for ImplicitScoring<'_> {
    fn name(&self) -> &'static str {
        "implicit-scoring"
    }

    fn after_node(&mut self, tree: &mut QueryTree, node: NodeId) -> Result<NodeId> {
        let descriptor = self.resolver.resolve(tree, node)?;
        if let (CursorVariant::Dirichlet | CursorVariant::Bm25, &[counts]) =
            (&descriptor.variant, tree.children(node))
        {
            let field = match tree.parameters(node).get_str("field") {
                Some(field) => field.to_string(),
                None => tree.field_hint(counts).to_string(),
            };
            let lengths = tree.add_node("lengths", Parameters::new().with("field", field));
            tree.set_children(node, vec![lengths, counts]);
            return Ok(node);
        }
        if !descriptor.has(Capability::Count) || descriptor.has(Capability::Scored) {
            return Ok(node);
        }
        if !self.wants_score(tree, node)? {
            return Ok(node);
        }

        let field = tree.field_hint(node).to_string();
        let lengths = tree.add_node("lengths", Parameters::new().with("field", field));
        let scorer = tree.wrap(node, &self.scorer, Parameters::new());
        tree.set_children(scorer, vec![lengths, node]);
        Ok(scorer)
    }
}
