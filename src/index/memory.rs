//! In-memory reference index.
//!
//! Positional postings, field lengths and prior tables held in hash maps and
//! shared with cursors through `Arc`, so opening a cursor never copies a
//! posting list. Built once through [`MemoryIndexBuilder`], then read-only.

use super::{FieldStatistics, Index, IndexKey, IndexPart, TermStatistics};
use crate::cursor::scoring::PriorCursor;
use crate::cursor::{
    CountCursor, Cursor, CursorNode, DocId, Extent, ExtentCursor, LengthCursor, TERMINATED,
    check_move,
};
use crate::engine::context::ScoringContext;
use crate::error::Result;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// One document's occurrences of a term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub document: DocId,
    pub extents: Vec<Extent>,
}

#[derive(Debug, Default)]
struct PriorTable {
    entries: Vec<(DocId, f64)>,
    default: f64,
}

/// Read-only in-memory index.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    names: Vec<String>,
    /// field -> term -> postings sorted by document
    postings: FxHashMap<String, FxHashMap<String, Arc<[Posting]>>>,
    /// field -> (document, length) sorted by document
    lengths: FxHashMap<String, Arc<[(DocId, u32)]>>,
    priors: FxHashMap<String, PriorTable>,
}

impl MemoryIndex {
    pub fn builder() -> MemoryIndexBuilder {
        MemoryIndexBuilder::default()
    }

    pub fn document_count(&self) -> usize {
        self.names.len()
    }

    fn postings_for(&self, field: &str, term: &str) -> Arc<[Posting]> {
        self.postings
            .get(field)
            .and_then(|terms| terms.get(term))
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }
}

impl Index for MemoryIndex {
    fn open_cursor(&self, key: &IndexKey) -> Result<CursorNode> {
        Ok(match key.part {
            IndexPart::Postings => CursorNode::Extent(Box::new(TermExtentsCursor::new(
                self.postings_for(&key.field, &key.term),
            ))),
            IndexPart::Counts => CursorNode::Count(Box::new(TermCountsCursor::new(
                self.postings_for(&key.field, &key.term),
            ))),
            IndexPart::Lengths => {
                let lengths = self
                    .lengths
                    .get(&key.field)
                    .cloned()
                    .unwrap_or_else(|| Arc::from(Vec::new()));
                CursorNode::Length(Box::new(FieldLengthsCursor::new(lengths)))
            }
            IndexPart::Prior => {
                let cursor = match self.priors.get(&key.term) {
                    Some(table) => PriorCursor::new(table.entries.clone(), table.default),
                    None => PriorCursor::new(Vec::new(), 0.0),
                };
                CursorNode::Scored(Box::new(cursor))
            }
        })
    }

    fn term_statistics(&self, field: &str, term: &str) -> TermStatistics {
        let postings = self.postings_for(field, term);
        let mut stats = TermStatistics {
            document_frequency: postings.len() as u64,
            ..TermStatistics::default()
        };
        for posting in postings.iter() {
            let count = posting.extents.len() as u32;
            stats.collection_frequency += count as u64;
            stats.max_count = stats.max_count.max(count);
        }
        stats
    }

    fn field_statistics(&self, field: &str) -> FieldStatistics {
        let Some(lengths) = self.lengths.get(field) else {
            return FieldStatistics::default();
        };
        FieldStatistics {
            document_count: lengths.len() as u64,
            collection_length: lengths.iter().map(|&(_, l)| l as u64).sum(),
            min_length: lengths.iter().map(|&(_, l)| l).min().unwrap_or(0),
            max_length: lengths.iter().map(|&(_, l)| l).max().unwrap_or(0),
        }
    }

    fn document_name(&self, document: DocId) -> Option<String> {
        self.names.get(document as usize).cloned()
    }
}

/// Accumulates documents, then freezes into a [`MemoryIndex`].
#[derive(Debug, Default)]
pub struct MemoryIndexBuilder {
    names: Vec<String>,
    /// field -> term -> document -> extents
    postings: FxHashMap<String, FxHashMap<String, FxHashMap<DocId, Vec<Extent>>>>,
    lengths: FxHashMap<String, FxHashMap<DocId, u32>>,
    priors: FxHashMap<String, PriorTable>,
}

impl MemoryIndexBuilder {
    /// Register a document; ids are dense and assigned in call order.
    pub fn add_document(&mut self, name: &str) -> DocId {
        let id = self.names.len() as DocId;
        self.names.push(name.to_string());
        id
    }

    /// Index `tokens` as the content of `field` in `document`.
    ///
    /// A repeated call for the same document and field appends: positions
    /// continue after the tokens already indexed there.
    pub fn add_tokens<I, S>(&mut self, document: DocId, field: &str, tokens: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let length = self
            .lengths
            .entry(field.to_string())
            .or_default()
            .entry(document)
            .or_insert(0);
        let mut positions: FxHashMap<String, Vec<Extent>> = FxHashMap::default();
        for token in tokens {
            positions
                .entry(token.as_ref().to_string())
                .or_default()
                .push(Extent::at(*length));
            *length += 1;
        }
        let terms = self.postings.entry(field.to_string()).or_default();
        for (term, extents) in positions {
            terms
                .entry(term)
                .or_default()
                .entry(document)
                .or_default()
                .extend(extents);
        }
        self
    }

    /// Whitespace-tokenized, lowercased text.
    pub fn add_text(&mut self, document: DocId, field: &str, text: &str) -> &mut Self {
        self.add_tokens(
            document,
            field,
            text.split_whitespace().map(str::to_lowercase),
        )
    }

    pub fn set_prior(&mut self, name: &str, document: DocId, value: f64) -> &mut Self {
        self.priors
            .entry(name.to_string())
            .or_default()
            .entries
            .push((document, value));
        self
    }

    /// Score reported by prior `name` for documents it does not list.
    pub fn set_prior_default(&mut self, name: &str, value: f64) -> &mut Self {
        self.priors.entry(name.to_string()).or_default().default = value;
        self
    }

    pub fn build(self) -> MemoryIndex {
        let postings: FxHashMap<String, FxHashMap<String, Arc<[Posting]>>> = self
            .postings
            .into_iter()
            .map(|(field, terms)| {
                let terms = terms
                    .into_iter()
                    .map(|(term, documents)| {
                        let mut list: Vec<Posting> = documents
                            .into_iter()
                            .map(|(document, extents)| Posting { document, extents })
                            .collect();
                        list.sort_by_key(|p| p.document);
                        (term, Arc::<[Posting]>::from(list))
                    })
                    .collect::<FxHashMap<_, _>>();
                (field, terms)
            })
            .collect();
        let lengths: FxHashMap<String, Arc<[(DocId, u32)]>> = self
            .lengths
            .into_iter()
            .map(|(field, documents)| {
                let mut list: Vec<(DocId, u32)> = documents.into_iter().collect();
                list.sort_by_key(|e| e.0);
                (field, Arc::<[(DocId, u32)]>::from(list))
            })
            .collect();
        let priors = self
            .priors
            .into_iter()
            .map(|(name, mut table)| {
                table.entries.sort_by_key(|e| e.0);
                table.entries.dedup_by_key(|e| e.0);
                (name, table)
            })
            .collect();
        MemoryIndex {
            names: self.names,
            postings,
            lengths,
            priors,
        }
    }
}

/// Shared walk over a sorted, document-keyed slice.
struct Walk<T> {
    list: Arc<[T]>,
    position: usize,
}

impl<T> Walk<T> {
    fn new(list: Arc<[T]>) -> Self {
        Self { list, position: 0 }
    }

    #[inline]
    fn current(&self, key: impl Fn(&T) -> DocId) -> DocId {
        self.list.get(self.position).map_or(TERMINATED, key)
    }

    fn advance(&mut self, target: DocId, key: impl Fn(&T) -> DocId) {
        let rest = &self.list[self.position..];
        self.position += rest.partition_point(|e| key(e) < target);
    }

    /// Entry at `document`, if the walk sits on it.
    #[inline]
    fn at(&self, document: DocId, key: impl Fn(&T) -> DocId) -> Option<&T> {
        self.list.get(self.position).filter(|e| key(e) == document)
    }

    fn remaining(&self) -> u64 {
        (self.list.len() - self.position) as u64
    }
}

fn posting_doc(p: &Posting) -> DocId {
    p.document
}

fn length_doc(e: &(DocId, u32)) -> DocId {
    e.0
}

pub struct TermExtentsCursor {
    walk: Walk<Posting>,
}

impl TermExtentsCursor {
    pub fn new(postings: Arc<[Posting]>) -> Self {
        Self {
            walk: Walk::new(postings),
        }
    }
}

impl Cursor for TermExtentsCursor {
    fn name(&self) -> &'static str {
        "extents"
    }

    fn current_document(&self) -> DocId {
        self.walk.current(posting_doc)
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        check_move(self.name(), self.current_document(), target)?;
        self.walk.advance(target, posting_doc);
        Ok(())
    }

    fn cost(&self) -> u64 {
        self.walk.remaining()
    }
}

impl ExtentCursor for TermExtentsCursor {
    fn extents_at(&mut self, ctx: &ScoringContext) -> &[Extent] {
        self.walk
            .at(ctx.document, posting_doc)
            .map(|p| p.extents.as_slice())
            .unwrap_or(&[])
    }
}

pub struct TermCountsCursor {
    walk: Walk<Posting>,
}

impl TermCountsCursor {
    pub fn new(postings: Arc<[Posting]>) -> Self {
        Self {
            walk: Walk::new(postings),
        }
    }
}

impl Cursor for TermCountsCursor {
    fn name(&self) -> &'static str {
        "counts"
    }

    fn current_document(&self) -> DocId {
        self.walk.current(posting_doc)
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        check_move(self.name(), self.current_document(), target)?;
        self.walk.advance(target, posting_doc);
        Ok(())
    }

    fn cost(&self) -> u64 {
        self.walk.remaining()
    }
}

impl CountCursor for TermCountsCursor {
    fn count_at(&mut self, ctx: &ScoringContext) -> u32 {
        self.walk
            .at(ctx.document, posting_doc)
            .map_or(0, |p| p.extents.len() as u32)
    }
}

pub struct FieldLengthsCursor {
    walk: Walk<(DocId, u32)>,
}

impl FieldLengthsCursor {
    pub fn new(lengths: Arc<[(DocId, u32)]>) -> Self {
        Self {
            walk: Walk::new(lengths),
        }
    }
}

impl Cursor for FieldLengthsCursor {
    fn name(&self) -> &'static str {
        "lengths"
    }

    fn current_document(&self) -> DocId {
        self.walk.current(length_doc)
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        check_move(self.name(), self.current_document(), target)?;
        self.walk.advance(target, length_doc);
        Ok(())
    }

    fn cost(&self) -> u64 {
        self.walk.remaining()
    }
}

impl LengthCursor for FieldLengthsCursor {
    fn length_at(&mut self, ctx: &ScoringContext) -> u32 {
        self.walk.at(ctx.document, length_doc).map_or(0, |e| e.1)
    }
}
