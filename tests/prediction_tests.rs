//! Integration tests for Markov transition recording and batch prediction.

use std::sync::Arc;
use std::thread;

use shard_cache_sim::cache::prefetcher::{PredictError, PredictiveGraph};

fn make_accesses(graph: &PredictiveGraph, files: &[&str], client: u64) {
    for file in files {
        graph.record_transition(file, client);
    }
}

#[test]
fn test_chain_simple() {
    let graph = PredictiveGraph::new();
    make_accesses(
        &graph,
        &["a.png", "b.png", "c.png", "a.png", "b.png", "c.png"],
        1,
    );

    let short = graph.batch_predict("a.png", 2).unwrap();
    assert_eq!(short, vec!["b.png", "c.png"]);

    // Graph is exhausted after two files; no padding.
    let long = graph.batch_predict("a.png", 20).unwrap();
    assert_eq!(long, vec!["b.png", "c.png"]);
}

#[test]
fn test_higher_frequency_edge_ranks_first() {
    let graph = PredictiveGraph::new();
    for _ in 0..3 {
        make_accesses(&graph, &["hub", "hot"], 1);
    }
    make_accesses(&graph, &["hub", "cold"], 1);

    assert_eq!(graph.batch_predict("hub", 1).unwrap(), vec!["hot"]);
    assert_eq!(graph.batch_predict("hub", 2).unwrap(), vec!["hot", "cold"]);
}

#[test]
fn test_prediction_requires_known_file() {
    let graph = PredictiveGraph::new();
    assert_eq!(
        graph.batch_predict("never-seen", 1),
        Err(PredictError::UnknownFile("never-seen".to_string()))
    );
}

#[test]
fn test_interleaved_clients_do_not_cross_edges() {
    let graph = PredictiveGraph::new();
    for (a, b) in [("a1", "b1"), ("a2", "b2"), ("a3", "b3")] {
        graph.record_transition(a, 1);
        graph.record_transition(b, 2);
    }

    assert_eq!(graph.batch_predict("a1", 5).unwrap(), vec!["a2", "a3"]);
    assert_eq!(graph.batch_predict("b1", 5).unwrap(), vec!["b2", "b3"]);
}

#[test]
fn test_concurrent_recording_keeps_totals_consistent() {
    let graph = Arc::new(PredictiveGraph::new());
    let handles: Vec<_> = (0..8u64)
        .map(|client| {
            let graph = graph.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    let file = format!("f{}", (i * (client + 1)) % 17);
                    graph.record_transition(&file, client);
                    if i % 50 == 0 {
                        graph.batch_predict(&file, 5).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut all_edges = 0;
    for node in graph.nodes() {
        let sum: u64 = node.edges.iter().map(|e| e.count).sum();
        assert_eq!(sum, node.total, "node {:?}", node.file);
        all_edges += node.total;
    }
    // Every recorded access produced exactly one transition.
    assert_eq!(all_edges, 8 * 500);
    assert_eq!(graph.node_snapshot(None).unwrap().total, 8);
}
