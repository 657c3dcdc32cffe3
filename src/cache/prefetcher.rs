//! Prefetch prediction: a Markov transition graph over file accesses.
//!
//! Every fetch records an edge from the client's previous file to the
//! current one. Predictions walk the graph with Dijkstra over
//! `-ln(p)` edge weights, so the cheapest path is the most probable access
//! chain. This surfaces files two or three hops away (A -> B -> C) even when
//! the direct A -> C edge is weak or absent.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::trace;

use crate::cache::evictor::EvictionIndex;
use crate::routing::ClientId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictError {
    /// Prediction was requested from a file no transition has touched.
    #[error("no transitions recorded through file {0:?}")]
    UnknownFile(String),
}

/// A single outgoing edge with its observation count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub to: String,
    pub count: u64,
}

/// Sparse adjacency for one source file.
#[derive(Debug, Default, Clone)]
struct TransitionNode {
    /// Sum of all outgoing edge counts.
    total: u64,
    /// Edges in first-seen order.
    edges: Vec<Transition>,
    /// Destination -> index into `edges`.
    lookup: HashMap<String, usize>,
}

impl TransitionNode {
    fn record(&mut self, to: &str) {
        self.total += 1;
        match self.lookup.get(to) {
            Some(&i) => self.edges[i].count += 1,
            None => {
                self.lookup.insert(to.to_string(), self.edges.len());
                self.edges.push(Transition {
                    to: to.to_string(),
                    count: 1,
                });
            }
        }
    }

    /// `-ln(count / total)`: zero for a certain transition, growing as the
    /// transition gets rarer.
    fn weight(&self, edge: &Transition) -> f64 {
        -(edge.count as f64 / self.total as f64).ln()
    }

    fn count_to(&self, to: &str) -> u64 {
        self.lookup.get(to).map(|&i| self.edges[i].count).unwrap_or(0)
    }
}

/// Point-in-time copy of one node, for inspection and invariant checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    /// `None` for the session-start root.
    pub file: Option<String>,
    pub total: u64,
    pub edges: Vec<Transition>,
}

#[derive(Debug, Default)]
struct GraphInner {
    /// Root node: the "previous file" of every client's first access.
    session_start: TransitionNode,
    nodes: HashMap<String, TransitionNode>,
    last_access: HashMap<ClientId, String>,
}

/// Markov transition graph shared by recorders and predictors.
///
/// One coarse lock covers recording and prediction, so a query never
/// observes a half-applied transition.
#[derive(Debug, Default)]
pub struct PredictiveGraph {
    inner: Mutex<GraphInner>,
}

impl PredictiveGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `client` accessed `file` after its previous access
    /// (or after session start, for its first access).
    pub fn record_transition(&self, file: &str, client: ClientId) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let source = match inner.last_access.get(&client) {
            Some(last) => inner.nodes.entry(last.clone()).or_default(),
            None => &mut inner.session_start,
        };
        source.record(file);

        if !inner.nodes.contains_key(file) {
            inner.nodes.insert(file.to_string(), TransitionNode::default());
        }
        inner.last_access.insert(client, file.to_string());
    }

    /// The `n` files most likely to be accessed after `file`, most
    /// probable first. `file` itself is never returned.
    ///
    /// Returns fewer than `n` entries once every reachable file has been
    /// emitted.
    pub fn batch_predict(&self, file: &str, n: usize) -> Result<Vec<String>, PredictError> {
        let inner = self.inner.lock();
        let source = inner
            .nodes
            .get(file)
            .ok_or_else(|| PredictError::UnknownFile(file.to_string()))?;

        let mut predictions = Vec::with_capacity(n.min(inner.nodes.len()));
        if n == 0 {
            return Ok(predictions);
        }

        let mut frontier: EvictionIndex<&str, f64> = EvictionIndex::new();
        let mut settled: HashSet<&str> = HashSet::new();

        for edge in &source.edges {
            if edge.to != file {
                frontier.insert(edge.to.as_str(), source.weight(edge));
            }
        }

        while predictions.len() < n {
            let Some((name, distance)) = frontier.pop_min() else {
                break;
            };
            settled.insert(name);
            predictions.push(name.to_string());

            let Some(node) = inner.nodes.get(name) else {
                continue;
            };
            for edge in &node.edges {
                let to = edge.to.as_str();
                // Paths through the source would only predict what the
                // source's own edges already cover.
                if to == file || settled.contains(to) {
                    continue;
                }
                let candidate = distance + node.weight(edge);
                if !frontier.contains(&to) || candidate < frontier.get_value(&to) {
                    frontier.insert(to, candidate);
                }
            }
        }

        trace!(file, requested = n, predicted = predictions.len(), "Batch prediction");
        Ok(predictions)
    }

    /// Number of file nodes (the session-start root is not counted).
    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    /// Observation count of the `from -> to` edge; `from = None` is
    /// session start.
    pub fn transition_count(&self, from: Option<&str>, to: &str) -> u64 {
        let inner = self.inner.lock();
        match from {
            Some(from) => inner.nodes.get(from).map(|n| n.count_to(to)).unwrap_or(0),
            None => inner.session_start.count_to(to),
        }
    }

    pub fn last_access(&self, client: ClientId) -> Option<String> {
        self.inner.lock().last_access.get(&client).cloned()
    }

    pub fn node_snapshot(&self, file: Option<&str>) -> Option<NodeSnapshot> {
        let inner = self.inner.lock();
        let node = match file {
            Some(file) => inner.nodes.get(file)?,
            None => &inner.session_start,
        };
        Some(NodeSnapshot {
            file: file.map(str::to_string),
            total: node.total,
            edges: node.edges.clone(),
        })
    }

    /// Snapshots of every node, session start first.
    pub fn nodes(&self) -> Vec<NodeSnapshot> {
        let inner = self.inner.lock();
        let mut out = Vec::with_capacity(inner.nodes.len() + 1);
        out.push(NodeSnapshot {
            file: None,
            total: inner.session_start.total,
            edges: inner.session_start.edges.clone(),
        });
        for (file, node) in &inner.nodes {
            out.push(NodeSnapshot {
                file: Some(file.clone()),
                total: node.total,
                edges: node.edges.clone(),
            });
        }
        out
    }
}
