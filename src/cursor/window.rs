//! Positional operators: ordered and unordered windows, synonyms.
//!
//! Windows are conjunctive over their children and additionally skip
//! documents where the children co-occur but never inside a window, so a
//! window cursor only ever sits on documents it can report extents for.

use super::combination::{Combination, Mode};
use super::{Cursor, CountCursor, DocId, Extent, ExtentCursor, TERMINATED, check_move};
use crate::engine::context::ScoringContext;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// Children in order, each starting at most `width - 1` tokens after the previous ends.
    Ordered,
    /// Children in any order, all inside a span of at most `width` tokens.
    Unordered,
}

/// Greedy left-to-right ordered matching.
pub(crate) fn ordered_windows(lists: &[&[Extent]], width: u32, out: &mut Vec<Extent>) {
    out.clear();
    let Some((first, rest)) = lists.split_first() else {
        return;
    };
    let mut pointers = vec![0usize; rest.len()];
    'starts: for start in first.iter() {
        let mut end = start.end;
        for (k, list) in rest.iter().enumerate() {
            let p = &mut pointers[k];
            while *p < list.len() && list[*p].begin < end {
                *p += 1;
            }
            let Some(next) = list.get(*p) else {
                break 'starts;
            };
            if next.begin - end >= width {
                continue 'starts;
            }
            end = next.end;
        }
        out.push(Extent::new(start.begin, end));
    }
}

/// Sliding multi-pointer matching: always advance the child with the smallest begin.
pub(crate) fn unordered_windows(lists: &[&[Extent]], width: u32, out: &mut Vec<Extent>) {
    out.clear();
    if lists.is_empty() || lists.iter().any(|l| l.is_empty()) {
        return;
    }
    let mut pointers = vec![0usize; lists.len()];
    loop {
        let mut begin = u32::MAX;
        let mut end = 0;
        let mut lead = 0;
        for (k, list) in lists.iter().enumerate() {
            let extent = list[pointers[k]];
            if extent.begin < begin {
                begin = extent.begin;
                lead = k;
            }
            end = end.max(extent.end);
        }
        if end - begin <= width {
            out.push(Extent::new(begin, end));
        }
        pointers[lead] += 1;
        if pointers[lead] == lists[lead].len() {
            break;
        }
    }
}

pub struct WindowCursor {
    axis: Combination<dyn ExtentCursor>,
    kind: WindowKind,
    width: u32,
    document: DocId,
    matches: Vec<Extent>,
}

impl WindowCursor {
    pub fn new(children: Vec<Box<dyn ExtentCursor>>, kind: WindowKind, width: u32) -> Result<Self> {
        let name = match kind {
            WindowKind::Ordered => "od",
            WindowKind::Unordered => "uw",
        };
        let mut cursor = Self {
            axis: Combination::new(name, children, Mode::Conjunctive)?,
            kind,
            width,
            document: TERMINATED,
            matches: Vec::new(),
        };
        cursor.seek_match()?;
        Ok(cursor)
    }

    /// From the axis position, advance until a document has at least one window.
    fn seek_match(&mut self) -> Result<()> {
        loop {
            let doc = self.axis.current();
            if doc == TERMINATED {
                self.document = TERMINATED;
                self.matches.clear();
                return Ok(());
            }
            self.compute(doc);
            if !self.matches.is_empty() {
                self.document = doc;
                return Ok(());
            }
            self.axis.move_to(doc + 1)?;
        }
    }

    fn compute(&mut self, doc: DocId) {
        let ctx = ScoringContext::for_document(doc);
        let lists: Vec<&[Extent]> = self
            .axis
            .children_mut()
            .iter_mut()
            .map(|child| child.extents_at(&ctx))
            .collect();
        match self.kind {
            WindowKind::Ordered => ordered_windows(&lists, self.width, &mut self.matches),
            WindowKind::Unordered => unordered_windows(&lists, self.width, &mut self.matches),
        }
    }
}

impl Cursor for WindowCursor {
    fn name(&self) -> &'static str {
        match self.kind {
            WindowKind::Ordered => "od",
            WindowKind::Unordered => "uw",
        }
    }

    fn current_document(&self) -> DocId {
        self.document
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        check_move(self.name(), self.document, target)?;
        if target == self.document {
            return Ok(());
        }
        self.axis.move_to(target)?;
        self.seek_match()
    }

    fn cost(&self) -> u64 {
        self.axis.cost()
    }
}

impl ExtentCursor for WindowCursor {
    fn extents_at(&mut self, ctx: &ScoringContext) -> &[Extent] {
        if ctx.document == self.document {
            &self.matches
        } else {
            &[]
        }
    }
}

/// Union of the children's extents at each document.
pub struct SynonymCursor {
    axis: Combination<dyn ExtentCursor>,
    buffer: Vec<Extent>,
}

impl SynonymCursor {
    pub fn new(children: Vec<Box<dyn ExtentCursor>>) -> Result<Self> {
        Ok(Self {
            axis: Combination::new("syn", children, Mode::Disjunctive)?,
            buffer: Vec::new(),
        })
    }
}

impl Cursor for SynonymCursor {
    fn name(&self) -> &'static str {
        "syn"
    }

    fn current_document(&self) -> DocId {
        self.axis.current()
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        self.axis.move_to(target)
    }

    fn cost(&self) -> u64 {
        self.axis.cost()
    }
}

impl ExtentCursor for SynonymCursor {
    fn extents_at(&mut self, ctx: &ScoringContext) -> &[Extent] {
        self.buffer.clear();
        for child in self.axis.children_mut().iter_mut() {
            if child.has_match(ctx.document) {
                self.buffer.extend_from_slice(child.extents_at(ctx));
            }
        }
        self.buffer.sort_unstable();
        self.buffer.dedup();
        &self.buffer
    }
}

/// Synonym over children that only offer counts: counts add up.
pub struct SynonymCountCursor {
    axis: Combination<dyn CountCursor>,
}

impl SynonymCountCursor {
    pub fn new(children: Vec<Box<dyn CountCursor>>) -> Result<Self> {
        Ok(Self {
            axis: Combination::new("syn", children, Mode::Disjunctive)?,
        })
    }
}

impl Cursor for SynonymCountCursor {
    fn name(&self) -> &'static str {
        "syn"
    }

    fn current_document(&self) -> DocId {
        self.axis.current()
    }

    fn move_to(&mut self, target: DocId) -> Result<()> {
        self.axis.move_to(target)
    }

    fn cost(&self) -> u64 {
        self.axis.cost()
    }
}

impl CountCursor for SynonymCountCursor {
    fn count_at(&mut self, ctx: &ScoringContext) -> u32 {
        self.axis
            .children_mut()
            .iter_mut()
            .map(|child| child.count_at(ctx))
            .sum()
    }
}
