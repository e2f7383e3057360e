//! Capability resolution for query nodes.
//!
//! The resolver answers "what kind of cursor would this node build" without
//! building it. Every operator maps to a [`Rule`] in a table; a rule either
//! names a fixed capability set or derives one from the children. The
//! concrete [`CursorVariant`] travels with the answer so rewrite passes can
//! recognize wrappers they (or someone else) already inserted.

use crate::error::{QueryError, Result};
use crate::query::node::{NodeId, QueryTree};
use bitflags::bitflags;
use rustc_hash::FxHashMap;
use std::fmt;

/// A single kind of value a cursor can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Matches or does not match a document.
    Indicator,
    /// Produces a numeric score per document.
    Scored,
    /// Produces positional spans per document.
    Extent,
    /// Produces a length per document.
    Length,
    /// Produces an occurrence count per document.
    Count,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Indicator,
        Capability::Scored,
        Capability::Extent,
        Capability::Length,
        Capability::Count,
    ];

    pub fn as_set(self) -> CapabilitySet {
        match self {
            Capability::Indicator => CapabilitySet::INDICATOR,
            Capability::Scored => CapabilitySet::SCORED,
            Capability::Extent => CapabilitySet::EXTENT,
            Capability::Length => CapabilitySet::LENGTH,
            Capability::Count => CapabilitySet::COUNT,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Indicator => "indicator",
            Capability::Scored => "scored",
            Capability::Extent => "extent",
            Capability::Length => "length",
            Capability::Count => "count",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Set of capabilities a cursor offers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CapabilitySet: u8 {
        const INDICATOR = 1 << 0;
        const SCORED = 1 << 1;
        const EXTENT = 1 << 2;
        const LENGTH = 1 << 3;
        const COUNT = 1 << 4;
    }
}

impl CapabilitySet {
    #[inline]
    pub fn has(self, capability: Capability) -> bool {
        self.contains(capability.as_set())
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("{}");
        }
        let names: Vec<String> = Capability::ALL
            .iter()
            .filter(|c| self.has(**c))
            .map(|c| c.to_string())
            .collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// The concrete cursor a node resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CursorVariant {
    TermExtents,
    TermCounts,
    FieldLengths,
    Prior,
    OrderedWindow,
    UnorderedWindow,
    Synonym,
    PassageFilter,
    PassageLength,
    Dirichlet,
    Bm25,
    Combine,
    Logarithm,
    Scale,
    Require,
    BooleanAnd,
    BooleanOr,
    /// Registered by a caller; no built-in cursor exists for it.
    Custom(String),
}

/// Result of resolving a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub capabilities: CapabilitySet,
    pub variant: CursorVariant,
}

impl CapabilityDescriptor {
    pub fn new(capabilities: CapabilitySet, variant: CursorVariant) -> Self {
        Self {
            capabilities,
            variant,
        }
    }

    #[inline]
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.has(capability)
    }
}

/// How an operator's descriptor is computed.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Independent of children.
    Fixed(CapabilitySet, CursorVariant),
    /// Intersection of the children's sets, limited to `mask`.
    Children {
        mask: CapabilitySet,
        variant: CursorVariant,
    },
}

/// Operator-to-capability rule table.
#[derive(Debug, Clone)]
pub struct Resolver {
    rules: FxHashMap<String, Rule>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    /// Resolver with every built-in operator registered.
    pub fn new() -> Self {
        use CapabilitySet as C;
        use CursorVariant as V;

        let positional = C::EXTENT | C::COUNT | C::INDICATOR;
        let scored = C::SCORED | C::INDICATOR;
        let lengths = C::LENGTH | C::INDICATOR;

        let table: [(&[&str], Rule); 17] = [
            (&["extents", "text"], Rule::Fixed(positional, V::TermExtents)),
            (&["counts"], Rule::Fixed(C::COUNT | C::INDICATOR, V::TermCounts)),
            (&["lengths"], Rule::Fixed(lengths, V::FieldLengths)),
            (&["prior"], Rule::Fixed(scored, V::Prior)),
            (&["od", "ordered"], Rule::Fixed(positional, V::OrderedWindow)),
            (&["uw", "unordered"], Rule::Fixed(positional, V::UnorderedWindow)),
            (
                &["syn", "synonym"],
                Rule::Children {
                    mask: positional,
                    variant: V::Synonym,
                },
            ),
            (&["passage-filter"], Rule::Fixed(positional, V::PassageFilter)),
            (&["passage-length"], Rule::Fixed(lengths, V::PassageLength)),
            (&["dirichlet"], Rule::Fixed(scored, V::Dirichlet)),
            (&["bm25"], Rule::Fixed(scored, V::Bm25)),
            (&["combine"], Rule::Fixed(scored, V::Combine)),
            (&["log"], Rule::Fixed(scored, V::Logarithm)),
            (&["scale"], Rule::Fixed(scored, V::Scale)),
            (&["require"], Rule::Fixed(scored, V::Require)),
            (&["band", "and"], Rule::Fixed(C::INDICATOR, V::BooleanAnd)),
            (&["bor", "or"], Rule::Fixed(C::INDICATOR, V::BooleanOr)),
        ];

        let mut rules = FxHashMap::default();
        for (names, rule) in table {
            for name in names {
                rules.insert(name.to_string(), rule.clone());
            }
        }
        Self { rules }
    }

    /// Add or replace the rule for `operator`.
    pub fn register(&mut self, operator: &str, rule: Rule) {
        self.rules.insert(operator.to_string(), rule);
    }

    pub fn knows(&self, operator: &str) -> bool {
        self.rules.contains_key(operator)
    }

    /// Resolve `node` in `tree`. Fails only for operators with no rule.
    pub fn resolve(&self, tree: &QueryTree, node: NodeId) -> Result<CapabilityDescriptor> {
        let operator = tree.operator(node);
        let rule = self
            .rules
            .get(operator)
            .ok_or_else(|| QueryError::UnknownOperator {
                operator: operator.to_string(),
            })?;

        match rule {
            Rule::Fixed(capabilities, variant) => {
                Ok(CapabilityDescriptor::new(*capabilities, variant.clone()))
            }
            Rule::Children { mask, variant } => {
                let mut capabilities = *mask;
                for &child in tree.children(node) {
                    capabilities &= self.resolve(tree, child)?.capabilities;
                }
                Ok(CapabilityDescriptor::new(capabilities, variant.clone()))
            }
        }
    }
}
