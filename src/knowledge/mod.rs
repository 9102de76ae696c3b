//! Three-layer, confidence-weighted knowledge store.
//!
//! Concrete facts (layer 1), strategies (layer 2) and causal beliefs
//! (layer 3) share one store keyed by `(layer, key)`. The hypergraph is a
//! shared resource written by many concurrent policy updates, so every
//! read-modify-write of a single node runs under a per-key lock.

mod backend;
mod node;

use std::sync::Arc;
use std::sync::OnceLock;

use dashmap::DashMap;
use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

use crate::error::{HelmsmanError, Result};

pub use backend::{KnowledgeBackend, MemoryBackend, SqliteBackend};
pub use node::{HypergraphNode, Layer};

static PROPERTY_NAME_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Safe identifier pattern for attribute names written to a backing store.
/// An invalid name fails the write rather than silently corrupting data.
fn property_name_pattern() -> &'static Regex {
    PROPERTY_NAME_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

pub struct KnowledgeHypergraph {
    backend: Box<dyn KnowledgeBackend>,
    key_locks: DashMap<(Layer, String), Arc<Mutex<()>>>,
}

impl KnowledgeHypergraph {
    pub fn new(backend: Box<dyn KnowledgeBackend>) -> Self {
        Self {
            backend,
            key_locks: DashMap::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()))
    }

    pub fn query(&self, layer: Layer, key: &str) -> Result<Option<HypergraphNode>> {
        self.backend.get(layer, key)
    }

    /// Merging upsert: attributes are folded into the existing node (or a
    /// fresh default one). Attribute names must match the safe identifier
    /// pattern; confidence is clamped to [0,1] on write.
    pub fn update_node(
        &self,
        layer: Layer,
        key: &str,
        attrs: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<HypergraphNode> {
        for name in attrs.keys() {
            if !property_name_pattern().is_match(name) {
                return Err(HelmsmanError::InvalidPropertyName(name.clone()));
            }
        }

        self.with_key_lock(layer, key, |graph| {
            let current = graph.backend.get(layer, key)?.unwrap_or_default();

            let mut merged = match serde_json::to_value(&current)? {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            for (name, value) in attrs {
                merged.insert(name.clone(), value.clone());
            }

            let mut node: HypergraphNode =
                serde_json::from_value(serde_json::Value::Object(merged))?;
            node.clamp_confidence();

            graph.backend.put(layer, key, &node)?;
            debug!(layer = %layer, key = %key, "Knowledge node updated");
            Ok(node)
        })
    }

    /// Atomic read-modify-write of one node under its per-key lock.
    /// Fails with `UnknownStrategy` when the node does not exist.
    pub fn modify<F>(&self, layer: Layer, key: &str, mutate: F) -> Result<HypergraphNode>
    where
        F: FnOnce(&mut HypergraphNode),
    {
        self.with_key_lock(layer, key, |graph| {
            let mut node = graph
                .backend
                .get(layer, key)?
                .ok_or_else(|| HelmsmanError::UnknownStrategy(key.to_string()))?;

            mutate(&mut node);
            node.clamp_confidence();

            graph.backend.put(layer, key, &node)?;
            Ok(node)
        })
    }

    pub fn add_strategy(
        &self,
        steps: Vec<String>,
        confidence: f64,
        dependencies: Vec<String>,
    ) -> Result<String> {
        let key = short_key("strategy");
        let node = HypergraphNode::strategy(steps, confidence, dependencies);
        self.backend.put(Layer::Strategy, &key, &node)?;
        debug!(key = %key, confidence, "Strategy recorded");
        Ok(key)
    }

    /// Append-only failure audit record linked to its root cause.
    pub fn add_negative_pathway(
        &self,
        strategy_key: &str,
        root_cause: serde_json::Value,
    ) -> Result<String> {
        if root_cause.is_null() {
            return Err(HelmsmanError::Knowledge(
                "negative pathway requires a root cause".to_string(),
            ));
        }

        let key = short_key("neg");
        let node = HypergraphNode::negative_pathway(strategy_key, root_cause);
        self.backend.put(Layer::Strategy, &key, &node)?;
        debug!(key = %key, strategy = %strategy_key, "Negative pathway recorded");
        Ok(key)
    }

    pub fn add_causal_belief(
        &self,
        intervention: &str,
        result: &str,
        confidence: f64,
    ) -> Result<String> {
        let key = short_key("causal");
        let node = HypergraphNode::causal_belief(intervention, result, confidence);
        self.backend.put(Layer::Causal, &key, &node)?;
        Ok(key)
    }

    pub fn get_low_confidence_nodes(
        &self,
        threshold: f64,
    ) -> Result<Vec<(Layer, String, HypergraphNode)>> {
        let mut nodes: Vec<_> = self
            .backend
            .scan()?
            .into_iter()
            .filter(|(_, _, node)| node.confidence < threshold)
            .collect();
        nodes.sort_by(|a, b| {
            a.2.confidence
                .partial_cmp(&b.2.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        Ok(nodes)
    }

    /// Negative pathways recorded against a given strategy key.
    pub fn negative_pathways_for(&self, strategy_key: &str) -> Result<Vec<String>> {
        Ok(self
            .backend
            .scan()?
            .into_iter()
            .filter(|(_, _, node)| {
                node.is_negative_pathway()
                    && node.extra.get("strategy").and_then(|v| v.as_str())
                        == Some(strategy_key)
            })
            .map(|(_, key, _)| key)
            .collect())
    }

    fn with_key_lock<T>(
        &self,
        layer: Layer,
        key: &str,
        f: impl FnOnce(&Self) -> Result<T>,
    ) -> Result<T> {
        let lock = self
            .key_locks
            .entry((layer, key.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();
        f(self)
    }
}

fn short_key(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &id[..12])
}
