//! Knowledge hypergraph: layer keying, merge upserts, write validation,
//! per-key serialization, and the SQLite backend.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use helmsman::error::HelmsmanError;
use helmsman::knowledge::{KnowledgeHypergraph, Layer, SqliteBackend};

fn attrs(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_same_key_different_layers_are_distinct() {
    let graph = KnowledgeHypergraph::in_memory();

    graph
        .update_node(Layer::Concrete, "shared", &attrs(&[("confidence", json!(0.2))]))
        .unwrap();
    graph
        .update_node(Layer::Causal, "shared", &attrs(&[("confidence", json!(0.9))]))
        .unwrap();

    let concrete = graph.query(Layer::Concrete, "shared").unwrap().unwrap();
    let causal = graph.query(Layer::Causal, "shared").unwrap().unwrap();
    assert!((concrete.confidence - 0.2).abs() < f64::EPSILON);
    assert!((causal.confidence - 0.9).abs() < f64::EPSILON);
}

#[test]
fn test_merge_preserves_unrelated_attributes() {
    let graph = KnowledgeHypergraph::in_memory();

    graph
        .update_node(
            Layer::Concrete,
            "fact",
            &attrs(&[("origin", json!("planner")), ("confidence", json!(0.5))]),
        )
        .unwrap();
    let node = graph
        .update_node(Layer::Concrete, "fact", &attrs(&[("verified", json!(true))]))
        .unwrap();

    assert_eq!(node.extra.get("origin"), Some(&json!("planner")));
    assert_eq!(node.extra.get("verified"), Some(&json!(true)));
    assert!((node.confidence - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_confidence_clamped_on_every_write() {
    let graph = KnowledgeHypergraph::in_memory();

    let high = graph
        .update_node(Layer::Concrete, "a", &attrs(&[("confidence", json!(7.0))]))
        .unwrap();
    assert_eq!(high.confidence, 1.0);

    let low = graph
        .update_node(Layer::Concrete, "b", &attrs(&[("confidence", json!(-0.4))]))
        .unwrap();
    assert_eq!(low.confidence, 0.0);
}

#[test]
fn test_invalid_property_name_rejected_without_partial_write() {
    let graph = KnowledgeHypergraph::in_memory();

    let bad = attrs(&[("ok_name", json!(1)), ("not ok", json!(2))]);
    let err = graph.update_node(Layer::Concrete, "fact", &bad).unwrap_err();

    assert!(matches!(err, HelmsmanError::InvalidPropertyName(_)));
    assert!(graph.query(Layer::Concrete, "fact").unwrap().is_none());
}

#[test]
fn test_concurrent_updates_to_one_key_do_not_lose_writes() {
    let graph = Arc::new(KnowledgeHypergraph::in_memory());
    let key = graph.add_strategy(vec!["step".into()], 0.0, vec![]).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let graph = Arc::clone(&graph);
        let key = key.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..50 {
                graph
                    .modify(Layer::Strategy, &key, |node| {
                        node.confidence += 0.001;
                    })
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let node = graph.query(Layer::Strategy, &key).unwrap().unwrap();
    assert!((node.confidence - 0.4).abs() < 1e-6);
}

#[test]
fn test_low_confidence_listing_sorted() {
    let graph = KnowledgeHypergraph::in_memory();
    graph.add_strategy(vec!["a".into()], 0.9, vec![]).unwrap();
    let weak = graph.add_strategy(vec!["b".into()], 0.1, vec![]).unwrap();
    let weaker = graph.add_strategy(vec!["c".into()], 0.05, vec![]).unwrap();

    let low = graph.get_low_confidence_nodes(0.3).unwrap();
    assert_eq!(low.len(), 2);
    assert_eq!(low[0].1, weaker);
    assert_eq!(low[1].1, weak);
}

#[test]
fn test_null_root_cause_rejected() {
    let graph = KnowledgeHypergraph::in_memory();
    let key = graph.add_strategy(vec!["a".into()], 0.5, vec![]).unwrap();

    let err = graph
        .add_negative_pathway(&key, serde_json::Value::Null)
        .unwrap_err();
    assert!(matches!(err, HelmsmanError::Knowledge(_)));
    assert!(graph.negative_pathways_for(&key).unwrap().is_empty());
}

#[test]
fn test_sqlite_backend_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("knowledge.db");

    {
        let graph = KnowledgeHypergraph::new(Box::new(SqliteBackend::open(&path).unwrap()));
        graph
            .update_node(
                Layer::Strategy,
                "durable",
                &attrs(&[("confidence", json!(0.7)), ("origin", json!("run-1"))]),
            )
            .unwrap();
    }

    let reopened = KnowledgeHypergraph::new(Box::new(SqliteBackend::open(&path).unwrap()));
    let node = reopened.query(Layer::Strategy, "durable").unwrap().unwrap();
    assert!((node.confidence - 0.7).abs() < f64::EPSILON);
    assert_eq!(node.extra.get("origin"), Some(&json!("run-1")));
}

#[test]
fn test_sqlite_scan_spans_layers() {
    let dir = TempDir::new().unwrap();
    let backend = SqliteBackend::open(&dir.path().join("k.db")).unwrap();
    let graph = KnowledgeHypergraph::new(Box::new(backend));

    graph
        .update_node(Layer::Concrete, "f1", &attrs(&[("confidence", json!(0.1))]))
        .unwrap();
    graph.add_strategy(vec!["s".into()], 0.5, vec![]).unwrap();
    graph.add_causal_belief("retry", "recovers", 0.8).unwrap();

    let low = graph.get_low_confidence_nodes(1.1).unwrap();
    assert_eq!(low.len(), 3);
}
