//! The index collaborator: where leaf cursors and statistics come from.
//!
//! The query core never looks at posting storage. It asks an [`Index`] for a
//! cursor over one part of one field (optionally for one term) and for the
//! statistics scoring functions need for their bounds.

pub mod memory;

pub use memory::{MemoryIndex, MemoryIndexBuilder};

use crate::cursor::{CursorNode, DocId};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Which structure a leaf cursor reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexPart {
    /// Term occurrences with positions.
    Postings,
    /// Term occurrence counts only.
    Counts,
    /// Per-document field lengths.
    Lengths,
    /// Static per-document scores.
    Prior,
}

/// Address of a leaf cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    pub part: IndexPart,
    pub field: String,
    /// Term for postings/counts, table name for priors, unused for lengths.
    pub term: String,
}

impl IndexKey {
    pub fn postings(field: &str, term: &str) -> Self {
        Self {
            part: IndexPart::Postings,
            field: field.to_string(),
            term: term.to_string(),
        }
    }

    pub fn counts(field: &str, term: &str) -> Self {
        Self {
            part: IndexPart::Counts,
            field: field.to_string(),
            term: term.to_string(),
        }
    }

    pub fn lengths(field: &str) -> Self {
        Self {
            part: IndexPart::Lengths,
            field: field.to_string(),
            term: String::new(),
        }
    }

    pub fn prior(name: &str) -> Self {
        Self {
            part: IndexPart::Prior,
            field: String::new(),
            term: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermStatistics {
    /// Documents containing the term.
    pub document_frequency: u64,
    /// Total occurrences across the collection.
    pub collection_frequency: u64,
    /// Largest per-document occurrence count.
    pub max_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStatistics {
    pub document_count: u64,
    /// Sum of all document lengths.
    pub collection_length: u64,
    pub min_length: u32,
    pub max_length: u32,
}

/// Source of leaf cursors and collection statistics.
///
/// Shared read-only between concurrently executing queries.
pub trait Index: Send + Sync {
    /// Open a fresh cursor positioned on its first document. A term with no
    /// postings yields a cursor that is already done, never an error.
    fn open_cursor(&self, key: &IndexKey) -> Result<CursorNode>;

    fn term_statistics(&self, field: &str, term: &str) -> TermStatistics;

    fn field_statistics(&self, field: &str) -> FieldStatistics;

    /// External name of a document, if it has one.
    fn document_name(&self, document: DocId) -> Option<String>;
}
