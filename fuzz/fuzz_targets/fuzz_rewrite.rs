#![no_main]

use libfuzzer_sys::fuzz_target;
use quarry::{MemoryIndex, NodeSpec, Parameters, QueryTree, Retrieval};
use std::sync::{Arc, OnceLock};

static RETRIEVAL: OnceLock<Retrieval> = OnceLock::new();

fn retrieval() -> &'static Retrieval {
    RETRIEVAL.get_or_init(|| {
        let mut builder = MemoryIndex::builder();
        for (name, text) in [("a", "red fish blue fish"), ("b", "one fish two fish"), ("c", "")] {
            let doc = builder.add_document(name);
            builder.add_text(doc, "document", text);
            builder.set_prior("p", doc, 1.0);
        }
        Retrieval::new(Arc::new(builder.build()), Parameters::new())
    })
}

// Arbitrary JSON trees and query parameters must produce results or a
// QueryError, never a panic.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let (spec, params) = text.split_once('\n').unwrap_or((text, "{}"));
    let Ok(spec) = serde_json::from_str::<NodeSpec>(spec) else {
        return;
    };
    let params = Parameters::parse_str(params).unwrap_or_default();

    let retrieval = retrieval();
    if let Ok(tree) = retrieval.rewrite(QueryTree::from_spec(&spec), &params) {
        assert!(tree.check_links());
        let _ = retrieval.execute(&tree, &params);
    }
});
