//! Running many queries against one index.
//!
//! Queries are independent: each one builds its own cursor tree over the
//! shared read-only index, so with the `parallel` feature they run on the
//! rayon pool. A failing query produces an error in its own slot and never
//! stops the others. Output order always matches input order.

use crate::config::{Parameters, keys};
use crate::engine::{Results, Retrieval};
use crate::error::{QueryError, Result};
use crate::query::node::NodeSpec;
use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// One entry of a query batch.
///
/// Keys besides `number` and `query` are the query's local parameters:
/// `{"number": "7", "query": {...}, "requested": 10, "passageQuery": true}`.
/// A missing `number` is assigned `unk-N` when the batch is collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchQuery {
    #[serde(default, deserialize_with = "text_or_number")]
    pub number: String,
    pub query: NodeSpec,
    #[serde(flatten)]
    pub parameters: Parameters,
}

impl BatchQuery {
    pub fn new(number: impl Into<String>, query: NodeSpec) -> Self {
        Self {
            number: number.into(),
            query,
            parameters: Parameters::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }
}

fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, found {other}"
        ))),
    }
}

/// Read the batch out of a parameter object.
///
/// Both `query` and `queries` may hold one entry or a list of them, and
/// `query` entries come first. An entry is either a batch entry with its
/// own `query` key or a bare query tree. Entries without a number are
/// numbered `unk-0`, `unk-1`, ... in order.
pub fn collect_queries(params: &Parameters) -> Result<Vec<BatchQuery>> {
    let mut queries = Vec::new();
    for key in ["query", "queries"] {
        match params.get(key) {
            None => {}
            Some(Value::Array(entries)) => {
                for entry in entries {
                    queries.push(parse_entry(key, entry)?);
                }
            }
            Some(entry) => queries.push(parse_entry(key, entry)?),
        }
    }

    let mut unnamed = 0;
    for query in queries.iter_mut().filter(|q| q.number.is_empty()) {
        query.number = format!("unk-{unnamed}");
        unnamed += 1;
    }
    Ok(queries)
}

fn parse_entry(key: &str, entry: &Value) -> Result<BatchQuery> {
    let parsed = if entry.get("query").is_some() {
        serde_json::from_value(entry.clone())
    } else {
        serde_json::from_value(entry.clone()).map(|tree| BatchQuery::new("", tree))
    };
    parsed.map_err(|e| QueryError::InvalidConfig(format!("{key}: {e}")))
}

fn run_one(retrieval: &Retrieval, query: &BatchQuery, batch: &Parameters) -> anyhow::Result<Results> {
    let mut parameters = query.parameters.over(batch);
    if let Some(requested) = batch.get(keys::REQUESTED) {
        parameters.set(keys::REQUESTED, requested.clone());
    }
    let outcome = retrieval
        .run(&query.query, &parameters)
        .with_context(|| format!("query {} failed", query.number));
    if let Err(ref e) = outcome {
        warn!(number = %query.number, error = %format!("{e:#}"), "query skipped");
    }
    outcome
}

/// Run every query, one result slot per query, in input order.
///
/// `batch` sits between each query's own parameters and the retrieval's
/// global ones. A `requested` set on the batch applies to every query,
/// overriding the query's own.
pub fn run_batch(
    retrieval: &Retrieval,
    queries: &[BatchQuery],
    batch: &Parameters,
) -> Vec<anyhow::Result<Results>> {
    let mut backoff = batch.clone();
    backoff.remove("query");
    backoff.remove("queries");

    #[cfg(feature = "parallel")]
    {
        queries.par_iter().map(|q| run_one(retrieval, q, &backoff)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        queries.iter().map(|q| run_one(retrieval, q, &backoff)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::keys;
    use crate::index::{Index, MemoryIndex};
    use std::sync::Arc;

    fn retrieval() -> Retrieval {
        let mut builder = MemoryIndex::builder();
        let a = builder.add_document("a");
        builder.add_text(a, "document", "red fish blue fish");
        let b = builder.add_document("b");
        builder.add_text(b, "document", "one fish two fish red fish");
        let index: Arc<dyn Index> = Arc::new(builder.build());
        Retrieval::new(index, Parameters::new())
    }

    #[test]
    fn test_collect_queries_with_local_parameters() {
        let params = Parameters::parse_str(
            r#"{"queries": [
                {"number": "1", "query": {"operator": "extents", "parameters": {"term": "fish"}}, "requested": 5},
                {"number": "2", "query": {"operator": "combine"}}
            ]}"#,
        )
        .unwrap();
        let queries = collect_queries(&params).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].number, "1");
        assert_eq!(queries[0].parameters.get_usize(keys::REQUESTED, 0), 5);
        assert!(queries[1].parameters.is_empty());
    }

    #[test]
    fn test_collect_single_query() {
        let params = Parameters::parse_str(r#"{"query": {"operator": "extents", "parameters": {"term": "red"}}}"#).unwrap();
        let queries = collect_queries(&params).unwrap();
        assert_eq!(queries, vec![BatchQuery::new("unk-0", NodeSpec::term("red"))]);
        assert!(collect_queries(&Parameters::new()).unwrap().is_empty());
    }

    #[test]
    fn test_query_list_comes_before_queries() {
        let params = Parameters::parse_str(
            r#"{
                "query": [
                    {"operator": "extents", "parameters": {"term": "red"}},
                    {"number": 12, "query": {"operator": "extents", "parameters": {"term": "blue"}}}
                ],
                "queries": [
                    {"query": {"operator": "extents", "parameters": {"term": "one"}}, "requested": 3},
                    {"number": "q4", "query": {"operator": "extents", "parameters": {"term": "two"}}}
                ]
            }"#,
        )
        .unwrap();
        let queries = collect_queries(&params).unwrap();
        let numbers: Vec<&str> = queries.iter().map(|q| q.number.as_str()).collect();
        assert_eq!(numbers, ["unk-0", "12", "unk-1", "q4"]);
        assert_eq!(queries[1].query, NodeSpec::term("blue"));
        assert_eq!(queries[2].parameters.get_usize(keys::REQUESTED, 0), 3);
    }

    #[test]
    fn test_malformed_batch_is_config_error() {
        let params = Parameters::parse_str(r#"{"queries": [{"query": 3}]}"#).unwrap();
        assert!(matches!(collect_queries(&params), Err(QueryError::InvalidConfig(_))));
        let params = Parameters::parse_str(r#"{"queries": [{"number": [1], "query": {"operator": "combine"}}]}"#).unwrap();
        assert!(matches!(collect_queries(&params), Err(QueryError::InvalidConfig(_))));
    }

    #[test]
    fn test_batch_parameters_back_off_under_local() {
        let retrieval = retrieval();
        let batch = Parameters::new().with(keys::PASSAGE_QUERY, true);
        let queries = vec![
            BatchQuery::new("1", NodeSpec::term("red")),
            BatchQuery::new("2", NodeSpec::term("red"))
                .with_parameters(Parameters::new().with(keys::PASSAGE_QUERY, false)),
        ];
        let results = run_batch(&retrieval, &queries, &batch);
        assert!(results[0].as_ref().unwrap().documents.iter().all(|d| d.passage.is_some()));
        assert!(results[1].as_ref().unwrap().documents.iter().all(|d| d.passage.is_none()));
    }

    #[test]
    fn test_batch_requested_overrides_query() {
        let retrieval = retrieval();
        let queries = vec![
            BatchQuery::new("1", NodeSpec::term("fish"))
                .with_parameters(Parameters::new().with(keys::REQUESTED, 5)),
        ];
        let results = run_batch(&retrieval, &queries, &Parameters::new().with(keys::REQUESTED, 1));
        assert_eq!(results[0].as_ref().unwrap().len(), 1);
        let results = run_batch(&retrieval, &queries, &Parameters::new());
        assert_eq!(results[0].as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_failure_is_isolated() {
        let retrieval = retrieval();
        let queries = vec![
            BatchQuery::new("1", NodeSpec::term("fish")),
            BatchQuery::new("2", NodeSpec::new("no-such-operator")),
            BatchQuery::new("3", NodeSpec::term("red")),
        ];
        let results = run_batch(&retrieval, &queries, &Parameters::new());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().len(), 2);
        let err = results[1].as_ref().unwrap_err();
        assert!(format!("{err:#}").contains("query 2"));
        assert!(err.downcast_ref::<QueryError>().is_some());
        assert_eq!(results[2].as_ref().unwrap().len(), 2);
    }
}
