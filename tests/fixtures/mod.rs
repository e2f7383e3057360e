//! Shared corpora for the integration tests.

#![allow(dead_code)]

use quarry::{Index, MemoryIndex, Parameters, Retrieval};
use std::sync::Arc;

/// Small text collection, indexed in this order (ids 0..5).
pub const CORPUS: &[(&str, &str)] = &[
    ("A", "the quick brown fox jumps over the lazy dog"),
    ("B", "red fish blue fish"),
    ("C", "one fish two fish red fish blue fish"),
    ("D", "the red fox and the blue dog"),
    ("E", "fish fish fish"),
];

pub fn text_index() -> Arc<dyn Index> {
    index_of(CORPUS)
}

/// Index `(name, text)` pairs into the default field, ids in order.
pub fn index_of(documents: &[(&str, &str)]) -> Arc<dyn Index> {
    let mut builder = MemoryIndex::builder();
    for (name, text) in documents {
        let doc = builder.add_document(name);
        builder.add_text(doc, "document", text);
    }
    Arc::new(builder.build())
}

/// Three documents whose `static` prior scores are A=3, B=1, C=3.
pub fn prior_index() -> Arc<dyn Index> {
    let mut builder = MemoryIndex::builder();
    for (name, prior) in [("A", 3.0), ("B", 1.0), ("C", 3.0)] {
        let doc = builder.add_document(name);
        builder.add_text(doc, "document", "filler text");
        builder.set_prior("static", doc, prior);
    }
    Arc::new(builder.build())
}

/// Deterministic synthetic collection: `documents` docs drawn from a
/// `vocabulary`-word vocabulary with a skewed term distribution.
pub fn synthetic_index(documents: usize, vocabulary: usize, length: usize) -> Arc<dyn Index> {
    let mut builder = MemoryIndex::builder();
    let mut state = 0x2545_f491_4f6c_dd1du64;
    for d in 0..documents {
        let doc = builder.add_document(&format!("doc-{d:05}"));
        let tokens: Vec<String> = (0..length)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let r = (state % (vocabulary as u64 * vocabulary as u64)) as f64;
                // square root skews toward low word ids
                let word = (vocabulary as f64 - r.sqrt()).max(0.0) as usize % vocabulary;
                format!("w{word}")
            })
            .collect();
        builder.add_tokens(doc, "document", tokens);
    }
    Arc::new(builder.build())
}

pub fn retrieval(index: Arc<dyn Index>) -> Retrieval {
    Retrieval::new(index, Parameters::new())
}
