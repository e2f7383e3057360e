//! Splices nested plain `combine` nodes into their plain `combine` parent.
//!
//! `#combine(a #combine(b c))` and `#combine(a b c)` score identically when
//! neither node carries weights, normalization, a conjunctive mode or a
//! method other than `sum`. The flat form gives the root combiner more
//! children to prune with.

use super::Traversal;
use crate::error::Result;
use crate::query::capability::{CursorVariant, Resolver};
use crate::query::node::{NodeId, QueryTree};

pub struct FlattenCombine<'a> {
    resolver: &'a Resolver,
}

impl<'a> FlattenCombine<'a> {
    pub fn new(resolver: &'a Resolver) -> Self {
        Self { resolver }
    }

    fn is_plain_combine(&self, tree: &QueryTree, node: NodeId) -> Result<bool> {
        if self.resolver.resolve(tree, node)?.variant != CursorVariant::Combine {
            return Ok(false);
        }
        Ok(tree
            .parameters(node)
            .iter()
            .all(|(key, value)| key == "method" && value.as_str() == Some("sum")))
    }
}

impl Traversal for FlattenCombine<'_> {
    fn name(&self) -> &'static str {
        "flatten-combine"
    }

    fn after_node(&mut self, tree: &mut QueryTree, node: NodeId) -> Result<NodeId> {
        if !self.is_plain_combine(tree, node)? {
            return Ok(node);
        }
        let children = tree.children(node).to_vec();
        let mut flattened = Vec::with_capacity(children.len());
        let mut changed = false;
        for child in children {
            if self.is_plain_combine(tree, child)? {
                flattened.extend_from_slice(tree.children(child));
                changed = true;
            } else {
                flattened.push(child);
            }
        }
        if changed {
            tree.set_children(node, flattened);
        }
        Ok(node)
    }
}
