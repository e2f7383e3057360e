//! Arena-backed query node tree.
//!
//! Nodes live in a `Vec` owned by [`QueryTree`]; children are held by id and
//! the parent relation is a plain `Option<NodeId>`, so there are no ownership
//! cycles and dropping the tree drops every node. Rewrites allocate new nodes
//! and relink ids; detached nodes stay in the arena until [`QueryTree::compact`].

use crate::config::{DEFAULT_FIELD, Parameters};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Index of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A single operator application in the query tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub operator: String,
    pub parameters: Parameters,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Node {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// Owned, serializable description of a query tree.
///
/// This is the structured form an external parser hands to the core:
/// `{"operator": "combine", "children": [{"operator": "extents", "parameters": {"term": "rust"}}]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub operator: String,
    #[serde(default, skip_serializing_if = "Parameters::is_empty")]
    pub parameters: Parameters,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            parameters: Parameters::new(),
            children: Vec::new(),
        }
    }

    /// Term leaf over the default field: `#extents:term=<term>()`.
    pub fn term(term: &str) -> Self {
        Self::new("extents").param("term", term)
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.set(key, value);
        self
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.children.extend(children);
        self
    }
}

/// Query tree: node arena plus root.
#[derive(Debug, Clone)]
pub struct QueryTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl QueryTree {
    /// Build a tree from its structured description.
    pub fn from_spec(spec: &NodeSpec) -> Self {
        let mut tree = QueryTree {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let root = tree.insert_spec(spec, None);
        tree.root = root;
        tree
    }

    fn insert_spec(&mut self, spec: &NodeSpec, parent: Option<NodeId>) -> NodeId {
        let id = self.add_node(&spec.operator, spec.parameters.clone());
        self.nodes[id.index()].parent = parent;
        for child in &spec.children {
            let child_id = self.insert_spec(child, Some(id));
            self.nodes[id.index()].children.push(child_id);
        }
        id
    }

    /// Convert the reachable part of the tree back to its structured form.
    pub fn to_spec(&self) -> NodeSpec {
        self.spec_of(self.root)
    }

    pub fn spec_of(&self, id: NodeId) -> NodeSpec {
        let node = self.node(id);
        NodeSpec {
            operator: node.operator.clone(),
            parameters: node.parameters.clone(),
            children: node.children.iter().map(|&c| self.spec_of(c)).collect(),
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    #[inline]
    pub fn operator(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].operator
    }

    #[inline]
    pub fn parameters(&self, id: NodeId) -> &Parameters {
        &self.nodes[id.index()].parameters
    }

    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// Number of nodes reachable from the root.
    pub fn node_count(&self) -> usize {
        self.preorder().len()
    }

    /// Allocate a detached node (no parent, no children).
    pub fn add_node(&mut self, operator: &str, parameters: Parameters) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            operator: operator.to_string(),
            parameters,
            children: Vec::new(),
            parent: None,
        });
        id
    }

    /// Append `child` to `parent`, taking it out of its previous parent's list.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[parent.index()].children.push(child);
        self.nodes[child.index()].parent = Some(parent);
    }

    /// Put `replacement` where `parent`'s child at `position` was.
    ///
    /// The old child keeps its parent link only if it now sits somewhere
    /// below `replacement` (the wrapping case); otherwise it becomes detached.
    pub fn replace_child_at(&mut self, parent: NodeId, position: usize, replacement: NodeId) {
        let old = self.nodes[parent.index()].children[position];
        if old == replacement {
            return;
        }
        self.nodes[parent.index()].children[position] = replacement;
        self.nodes[replacement.index()].parent = Some(parent);
        if self.nodes[old.index()].parent == Some(parent) {
            self.nodes[old.index()].parent = None;
        }
    }

    /// Create `#operator(node)` in place of `node`.
    ///
    /// The wrapper inherits `node`'s parent link and `node` becomes its only
    /// child. The parent's child list still names `node` until the caller (or
    /// the traversal driver) links the wrapper in with
    /// [`QueryTree::replace_child_at`] or [`QueryTree::set_root`].
    pub fn wrap(&mut self, node: NodeId, operator: &str, parameters: Parameters) -> NodeId {
        let wrapper = self.add_node(operator, parameters);
        let parent = self.nodes[node.index()].parent;
        self.nodes[wrapper.index()].parent = parent;
        self.nodes[wrapper.index()].children.push(node);
        self.nodes[node.index()].parent = Some(wrapper);
        wrapper
    }

    /// Replace `parent`'s child list, relinking parent ids of old and new children.
    pub fn set_children(&mut self, parent: NodeId, children: Vec<NodeId>) {
        let old = std::mem::take(&mut self.nodes[parent.index()].children);
        for child in old {
            if self.nodes[child.index()].parent == Some(parent) {
                self.nodes[child.index()].parent = None;
            }
        }
        for &child in &children {
            self.nodes[child.index()].parent = Some(parent);
        }
        self.nodes[parent.index()].children = children;
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = root;
        self.nodes[root.index()].parent = None;
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|&c| c != child);
        }
    }

    /// Reachable node ids in pre-order.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        order
    }

    /// Field named by the first node of the subtree under `id` that names
    /// one, in pre-order, else the default field.
    pub fn field_hint(&self, id: NodeId) -> &str {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(field) = self.parameters(id).get_str("field") {
                return field;
            }
            stack.extend(self.children(id).iter().rev());
        }
        DEFAULT_FIELD
    }

    /// Verify the structural invariant: the root has no parent and every
    /// reachable node appears exactly once, under the parent it points at.
    pub fn check_links(&self) -> bool {
        if self.parent(self.root).is_some() {
            return false;
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.index()], true) {
                return false;
            }
            for &child in self.children(id) {
                if self.parent(child) != Some(id) {
                    return false;
                }
                stack.push(child);
            }
        }
        true
    }

    /// Rebuild the arena from the reachable nodes, dropping detached ones.
    pub fn compact(&mut self) {
        *self = QueryTree::from_spec(&self.to_spec());
    }

    fn fmt_node(&self, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.node(id);
        write!(f, "#{}", node.operator)?;
        let mut params: Vec<_> = node.parameters.iter().collect();
        params.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in params {
            match value {
                Value::String(s) => write!(f, ":{}={}", key, s)?,
                other => write!(f, ":{}={}", key, other)?,
            }
        }
        write!(f, "(")?;
        for (i, &child) in node.children.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            self.fmt_node(child, f)?;
        }
        write!(f, ")")
    }
}

/// Compact single-line rendering, e.g. `#combine(#extents:term=a() #extents:term=b())`.
impl fmt::Display for QueryTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(self.root, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryTree {
        QueryTree::from_spec(
            &NodeSpec::new("combine")
                .child(NodeSpec::term("a"))
                .child(NodeSpec::new("od").child(NodeSpec::term("b")).child(NodeSpec::term("c"))),
        )
    }

    #[test]
    fn test_from_spec_links() {
        let tree = sample();
        assert!(tree.check_links());
        assert_eq!(tree.node_count(), 5);
        let root = tree.root();
        assert_eq!(tree.operator(root), "combine");
        let od = tree.children(root)[1];
        assert_eq!(tree.parent(od), Some(root));
        assert_eq!(tree.children(od).len(), 2);
    }

    #[test]
    fn test_display() {
        let tree = sample();
        assert_eq!(
            tree.to_string(),
            "#combine(#extents:term=a() #od(#extents:term=b() #extents:term=c()))"
        );
    }

    #[test]
    fn test_wrap_and_relink() {
        let mut tree = sample();
        let root = tree.root();
        let od = tree.children(root)[1];
        let wrapper = tree.wrap(od, "passage-filter", Parameters::new());
        tree.replace_child_at(root, 1, wrapper);
        assert!(tree.check_links());
        assert_eq!(tree.parent(od), Some(wrapper));
        assert_eq!(tree.parent(wrapper), Some(root));
        assert_eq!(
            tree.to_string(),
            "#combine(#extents:term=a() #passage-filter(#od(#extents:term=b() #extents:term=c())))"
        );
    }

    #[test]
    fn test_wrap_root() {
        let mut tree = sample();
        let old_root = tree.root();
        let wrapper = tree.wrap(old_root, "log", Parameters::new());
        tree.set_root(wrapper);
        assert!(tree.check_links());
        assert_eq!(tree.parent(old_root), Some(wrapper));
    }

    #[test]
    fn test_replace_with_unrelated_detaches() {
        let mut tree = sample();
        let root = tree.root();
        let old = tree.children(root)[0];
        let fresh = tree.add_node("counts", Parameters::new().with("term", "z"));
        tree.replace_child_at(root, 0, fresh);
        assert!(tree.check_links());
        assert_eq!(tree.parent(old), None);
    }

    #[test]
    fn test_set_children_splices() {
        let mut tree = sample();
        let root = tree.root();
        let a = tree.children(root)[0];
        let od = tree.children(root)[1];
        let grandchildren = tree.children(od).to_vec();
        let mut adopted = vec![a];
        adopted.extend(grandchildren.iter().copied());
        tree.set_children(root, adopted);
        assert!(tree.check_links());
        assert_eq!(tree.parent(od), None);
        assert_eq!(tree.parent(grandchildren[0]), Some(root));
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn test_compact_drops_detached() {
        let mut tree = sample();
        let root = tree.root();
        let od = tree.children(root)[1];
        let wrapper = tree.wrap(od, "passage-filter", Parameters::new());
        tree.replace_child_at(root, 1, wrapper);
        let before = tree.to_string();
        tree.compact();
        assert_eq!(tree.to_string(), before);
        assert!(tree.check_links());
    }

    #[test]
    fn test_broken_link_detected() {
        let mut tree = sample();
        let root = tree.root();
        let a = tree.children(root)[0];
        tree.node_mut(a).parent = None;
        assert!(!tree.check_links());
    }

    #[test]
    fn test_spec_roundtrip_json() {
        let json = r#"{"operator":"combine","children":[{"operator":"extents","parameters":{"term":"a"}}]}"#;
        let spec: NodeSpec = serde_json::from_str(json).unwrap();
        let tree = QueryTree::from_spec(&spec);
        assert_eq!(tree.to_string(), "#combine(#extents:term=a())");
        assert_eq!(tree.to_spec(), spec);
    }
}
