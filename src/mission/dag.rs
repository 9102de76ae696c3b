use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::{MissionNode, StepState};
use crate::error::{HelmsmanError, Result};

/// A mission's execution graph. `edges` is redundant with per-node `deps`
/// and is kept for fast forward traversal (dependency -> dependents).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissionDag {
    pub mission_id: String,

    #[serde(default)]
    pub nodes: BTreeMap<String, MissionNode>,

    /// (src, dst) pairs meaning dst depends on src.
    #[serde(default)]
    pub edges: Vec<(String, String)>,

    #[serde(default)]
    pub rationale: String,
}

impl MissionDag {
    pub fn new(mission_id: impl Into<String>) -> Self {
        Self {
            mission_id: mission_id.into(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            rationale: String::new(),
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn add_node(&mut self, node: MissionNode) {
        for dep in &node.deps {
            self.edges.push((dep.clone(), node.step_id.clone()));
        }
        self.nodes.insert(node.step_id.clone(), node);
    }

    pub fn node(&self, step_id: &str) -> Option<&MissionNode> {
        self.nodes.get(step_id)
    }

    pub fn node_mut(&mut self, step_id: &str) -> Option<&mut MissionNode> {
        self.nodes.get_mut(step_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Forward traversal: step ids that directly depend on `step_id`.
    pub fn dependents(&self, step_id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(src, _)| src == step_id)
            .map(|(_, dst)| dst.as_str())
            .collect()
    }

    /// Validates that every dependency names a known step and that the
    /// dependency relation is acyclic. Called before any node is dispatched.
    pub fn validate(&self) -> Result<()> {
        for node in self.nodes.values() {
            for dep in &node.deps {
                if !self.nodes.contains_key(dep) {
                    return Err(HelmsmanError::UnknownDependency {
                        step: node.step_id.clone(),
                        dep: dep.clone(),
                    });
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Kahn's algorithm. Returns a valid execution order, or `CyclicDag`
    /// naming one step on a cycle.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .values()
            .map(|n| (n.step_id.as_str(), n.deps.len()))
            .collect();

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            for dependent in self.dependents(id) {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let on_cycle = in_degree
                .iter()
                .filter(|(_, deg)| **deg > 0)
                .map(|(id, _)| id.to_string())
                .min()
                .unwrap_or_default();
            return Err(HelmsmanError::CyclicDag(on_cycle));
        }

        Ok(order)
    }

    /// Step ids whose dependencies all succeeded and whose own state is
    /// pending.
    pub fn ready_steps(&self) -> Vec<String> {
        let satisfied: Vec<&str> = self
            .nodes
            .values()
            .filter(|n| n.state.satisfies_dependents())
            .map(|n| n.step_id.as_str())
            .collect();

        self.nodes
            .values()
            .filter(|n| n.is_ready(&satisfied))
            .map(|n| n.step_id.clone())
            .collect()
    }

    /// Pending steps with at least one failed or skipped dependency. These
    /// can never become ready and must be skipped.
    pub fn blocked_steps(&self) -> Vec<(String, String)> {
        let blocking: Vec<&str> = self
            .nodes
            .values()
            .filter(|n| n.state.blocks_dependents())
            .map(|n| n.step_id.as_str())
            .collect();

        if blocking.is_empty() {
            return Vec::new();
        }

        self.nodes
            .values()
            .filter(|n| n.state == StepState::Pending)
            .filter_map(|n| {
                n.deps
                    .iter()
                    .find(|d| blocking.contains(&d.as_str()))
                    .map(|d| (n.step_id.clone(), d.clone()))
            })
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.nodes.values().all(|n| n.state.is_terminal())
    }

    pub fn all_succeeded(&self) -> bool {
        self.nodes
            .values()
            .all(|n| n.state == StepState::Succeeded)
    }

    pub fn count_in_state(&self, state: StepState) -> usize {
        self.nodes.values().filter(|n| n.state == state).count()
    }
}
