//! Scope restriction for passage queries.
//!
//! When a query runs over passages, every length and extent source feeding a
//! consumer of another kind (typically a scoring function) must see only the
//! current passage. This pass inserts `passage-length` above length sources
//! and `passage-filter` above extent sources, exactly at that boundary:
//! nodes whose parent consumes the same kind are left for the parent to
//! restrict, and parents with no capabilities at all are never wrapped
//! under.

use super::Traversal;
use crate::config::{self, Parameters, keys};
use crate::error::Result;
use crate::query::capability::{Capability, CursorVariant, Resolver};
use crate::query::node::{NodeId, QueryTree};

pub const PASSAGE_LENGTH: &str = "passage-length";
pub const PASSAGE_FILTER: &str = "passage-filter";

pub struct PassageRestriction<'a> {
    resolver: &'a Resolver,
    enabled: bool,
    wrap_lengths: bool,
    wrap_extents: bool,
}

impl<'a> PassageRestriction<'a> {
    pub fn new(resolver: &'a Resolver, query: &Parameters, global: &Parameters) -> Self {
        Self {
            resolver,
            enabled: config::resolve_any(
                query,
                global,
                &[keys::PASSAGE_QUERY, keys::EXTENT_QUERY],
                false,
            ),
            wrap_lengths: config::resolve(query, global, keys::WRAP_PASSAGE_LENGTHS, true),
            wrap_extents: config::resolve(query, global, keys::WRAP_PASSAGE_EXTENTS, true),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a node producing `capability` needs a restriction wrapper here.
    fn at_boundary(&self, tree: &QueryTree, node: NodeId, capability: Capability) -> Result<bool> {
        let Some(parent) = tree.parent(node) else {
            return Ok(true);
        };
        let parent = self.resolver.resolve(tree, parent)?;
        Ok(!parent.capabilities.is_empty() && !parent.has(capability))
    }
}

impl Traversal for PassageRestriction<'_> {
    fn name(&self) -> &'static str {
        "passage-restriction"
    }

    fn after_node(&mut self, tree: &mut QueryTree, node: NodeId) -> Result<NodeId> {
        if !self.enabled {
            return Ok(node);
        }
        let descriptor = self.resolver.resolve(tree, node)?;

        if self.wrap_lengths
            && descriptor.has(Capability::Length)
            && descriptor.variant != CursorVariant::PassageLength
            && self.at_boundary(tree, node, Capability::Length)?
        {
            return Ok(tree.wrap(node, PASSAGE_LENGTH, Parameters::new()));
        }

        if self.wrap_extents
            && descriptor.has(Capability::Extent)
            && descriptor.variant != CursorVariant::PassageFilter
            && self.at_boundary(tree, node, Capability::Extent)?
        {
            return Ok(tree.wrap(node, PASSAGE_FILTER, Parameters::new()));
        }

        Ok(node)
    }
}
