//! # Quarry - Query Execution Core for Full-Text Retrieval
//!
//! Quarry takes a structured query tree, rewrites it into an executable
//! form, builds a tree of cursors over an index and returns the top-k
//! scoring documents (or passages).
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`query`] - Query node tree (arena) and the operator capability resolver
//! - [`traversal`] - Rewrite passes: implicit scoring, combine flattening,
//!   passage restriction
//! - [`cursor`] - Movable cursors over ascending document ids, their
//!   combinators, transforms and scoring functions
//! - [`engine`] - Scoring loop, per-document context, top-k accumulator
//! - [`index`] - The index contract plus an in-memory implementation
//! - [`batch`] - Failure-isolated, optionally parallel execution of many queries
//! - [`config`] - Parameters and local-over-global setting resolution
//!
//! ## Quick Start
//!
//! ```ignore
//! use quarry::{MemoryIndex, NodeSpec, Parameters, Retrieval};
//! use std::sync::Arc;
//!
//! let mut builder = MemoryIndex::builder();
//! let doc = builder.add_document("intro");
//! builder.add_text(doc, "document", "rust cursors all the way down");
//! let retrieval = Retrieval::new(Arc::new(builder.build()), Parameters::new());
//!
//! let query = NodeSpec::new("combine")
//!     .child(NodeSpec::term("rust"))
//!     .child(NodeSpec::term("cursors"));
//! let results = retrieval.run(&query, &Parameters::new().with("requested", 10)).unwrap();
//!
//! for doc in &results.documents {
//!     println!("{} {} {:.4}", doc.rank, doc.name, doc.score);
//! }
//! ```
//!
//! ## Performance
//!
//! Two exact optimizations are available per query:
//!
//! 1. **Early termination** - stop once the root's maximum score cannot beat
//!    the k-th best result (`earlyTermination`)
//! 2. **Delta scoring** - abandon a document mid-sum once the remaining
//!    children's maxima cannot lift it into the top k (`deltaScoring`)

pub mod batch;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod index;
pub mod query;
pub mod traversal;

pub use batch::{BatchQuery, collect_queries, run_batch};
pub use config::Parameters;
pub use engine::{ExecutionStats, Results, Retrieval, ScoredDocument};
pub use error::{QueryError, Result};
pub use index::{Index, MemoryIndex, MemoryIndexBuilder};
pub use query::{NodeSpec, QueryTree, Resolver};
