//! Rewrite passes over the query tree.
//!
//! A [`Traversal`] sees every node twice: `before_node` on the way down and
//! `after_node` on the way up, after all children have been visited. When
//! `after_node` hands back a different node id, [`walk`] links it into the
//! parent in place of the original (or makes it the root).
//!
//! Passes run one after another through a [`Pipeline`]; each pass finishes
//! the whole tree before the next one starts.

pub mod flatten;
pub mod implicit;
pub mod passage;

pub use flatten::FlattenCombine;
pub use implicit::ImplicitScoring;
pub use passage::PassageRestriction;

use crate::config::Parameters;
use crate::error::Result;
use crate::query::capability::Resolver;
use crate::query::node::{NodeId, QueryTree};
use tracing::debug;

pub trait Traversal {
    fn name(&self) -> &'static str;

    fn before_node(&mut self, _tree: &QueryTree, _node: NodeId) -> Result<()> {
        Ok(())
    }

    /// Return `node` to keep it, or the id of its replacement.
    fn after_node(&mut self, tree: &mut QueryTree, node: NodeId) -> Result<NodeId>;
}

/// Run one pass over the whole tree.
pub fn walk(tree: &mut QueryTree, pass: &mut dyn Traversal) -> Result<()> {
    let root = tree.root();
    let replacement = visit(tree, pass, root)?;
    if replacement != root {
        tree.set_root(replacement);
    }
    Ok(())
}

fn visit(tree: &mut QueryTree, pass: &mut dyn Traversal, node: NodeId) -> Result<NodeId> {
    pass.before_node(tree, node)?;
    let mut position = 0;
    while position < tree.children(node).len() {
        let child = tree.children(node)[position];
        let replacement = visit(tree, pass, child)?;
        if replacement != child {
            tree.replace_child_at(node, position, replacement);
        }
        position += 1;
    }
    pass.after_node(tree, node)
}

/// Ordered list of passes.
pub struct Pipeline<'a> {
    passes: Vec<Box<dyn Traversal + 'a>>,
}

impl<'a> Pipeline<'a> {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Implicit scoring, combine flattening, then passage restriction.
    pub fn standard(resolver: &'a Resolver, query: &'a Parameters, global: &'a Parameters) -> Self {
        Self::new()
            .with(ImplicitScoring::new(resolver, query, global))
            .with(FlattenCombine::new(resolver))
            .with(PassageRestriction::new(resolver, query, global))
    }

    pub fn with(mut self, pass: impl Traversal + 'a) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run every pass in order. The first error aborts the rewrite.
    pub fn run(&mut self, tree: &mut QueryTree) -> Result<()> {
        for pass in &mut self.passes {
            walk(tree, pass.as_mut())?;
            debug_assert!(tree.check_links(), "{} broke parent links", pass.name());
            debug!(pass = pass.name(), tree = %tree, "traversal complete");
        }
        Ok(())
    }
}

impl Default for Pipeline<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::node::NodeSpec;

    /// Renames every `extents` leaf to `counts`, by replacement.
    struct ReplaceLeaves;

    impl Traversal for ReplaceLeaves {
        fn name(&self) -> &'static str {
            "replace-leaves"
        }

        fn after_node(&mut self, tree: &mut QueryTree, node: NodeId) -> Result<NodeId> {
            if tree.operator(node) != "extents" {
                return Ok(node);
            }
            let params = tree.parameters(node).clone();
            Ok(tree.add_node("counts", params))
        }
    }

    /// Records visit order.
    #[derive(Default)]
    struct Recorder {
        before: Vec<String>,
        after: Vec<String>,
    }

    impl Traversal for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn before_node(&mut self, tree: &QueryTree, node: NodeId) -> Result<()> {
            self.before.push(tree.operator(node).to_string());
            Ok(())
        }

        fn after_node(&mut self, tree: &mut QueryTree, node: NodeId) -> Result<NodeId> {
            self.after.push(tree.operator(node).to_string());
            Ok(node)
        }
    }

    fn sample() -> QueryTree {
        QueryTree::from_spec(
            &NodeSpec::new("combine")
                .child(NodeSpec::term("a"))
                .child(NodeSpec::new("od").child(NodeSpec::term("b")).child(NodeSpec::term("c"))),
        )
    }

    #[test]
    fn test_visit_order() {
        let mut tree = sample();
        let mut recorder = Recorder::default();
        walk(&mut tree, &mut recorder).unwrap();
        assert_eq!(recorder.before, ["combine", "extents", "od", "extents", "extents"]);
        assert_eq!(recorder.after, ["extents", "extents", "extents", "od", "combine"]);
    }

    #[test]
    fn test_replacement_is_relinked() {
        let mut tree = sample();
        walk(&mut tree, &mut ReplaceLeaves).unwrap();
        assert!(tree.check_links());
        assert_eq!(
            tree.to_string(),
            "#combine(#counts:term=a() #od(#counts:term=b() #counts:term=c()))"
        );
    }

    #[test]
    fn test_root_replacement() {
        let mut tree = QueryTree::from_spec(&NodeSpec::term("a"));
        walk(&mut tree, &mut ReplaceLeaves).unwrap();
        assert!(tree.check_links());
        assert_eq!(tree.operator(tree.root()), "counts");
    }

    #[test]
    fn test_standard_pipeline_order() {
        let resolver = Resolver::new();
        let params = Parameters::new();
        let pipeline = Pipeline::standard(&resolver, &params, &params);
        assert_eq!(
            pipeline.pass_names(),
            ["implicit-scoring", "flatten-combine", "passage-restriction"]
        );
    }

    #[test]
    fn test_unknown_operator_aborts_pipeline() {
        let resolver = Resolver::new();
        let params = Parameters::new();
        let mut tree = QueryTree::from_spec(&NodeSpec::new("combine").child(NodeSpec::new("bogus")));
        let err = Pipeline::standard(&resolver, &params, &params)
            .run(&mut tree)
            .unwrap_err();
        assert!(matches!(err, crate::error::QueryError::UnknownOperator { .. }));
    }
}
