use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::knowledge::{KnowledgeHypergraph, Layer};

/// Most likely failing component behind a zero-reward outcome, plus an
/// optional corrective action for the remediator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCause {
    pub component: String,
    pub rationale: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

pub struct RootCauseAnalyzer {
    graph: Arc<KnowledgeHypergraph>,
}

impl RootCauseAnalyzer {
    pub fn new(graph: Arc<KnowledgeHypergraph>) -> Self {
        Self { graph }
    }

    /// Propose the most likely failing component for a failed strategy.
    ///
    /// Order of suspicion: the dependency with the lowest recorded
    /// confidence, then the first step whose text appears in the failure
    /// trajectory, then the first step outright.
    pub fn analyze(
        &self,
        steps: &[String],
        dependencies: &[String],
        trajectory: &str,
    ) -> RootCause {
        if let Some((dep, confidence)) = self.weakest_dependency(dependencies) {
            debug!(component = %dep, confidence, "Root cause: low-confidence dependency");
            return RootCause {
                rationale: format!(
                    "dependency '{}' has the lowest recorded confidence ({:.2})",
                    dep, confidence
                ),
                suggested_action: Some(format!("re-verify dependency '{}'", dep)),
                component: dep,
                confidence: 1.0 - confidence,
            };
        }

        let trajectory_lower = trajectory.to_lowercase();
        if let Some(step) = steps
            .iter()
            .find(|s| !s.is_empty() && trajectory_lower.contains(&s.to_lowercase()))
        {
            return RootCause {
                component: step.clone(),
                rationale: "step text appears in the failure trajectory".to_string(),
                confidence: 0.5,
                suggested_action: Some(format!("rework step '{}'", step)),
            };
        }

        match steps.first() {
            Some(step) => RootCause {
                component: step.clone(),
                rationale: "no stronger signal; first step is the default suspect".to_string(),
                confidence: 0.25,
                suggested_action: None,
            },
            None => RootCause {
                component: "unknown".to_string(),
                rationale: "strategy has no recorded steps".to_string(),
                confidence: 0.0,
                suggested_action: None,
            },
        }
    }

    fn weakest_dependency(&self, dependencies: &[String]) -> Option<(String, f64)> {
        dependencies
            .iter()
            .filter_map(|dep| {
                self.graph
                    .query(Layer::Strategy, dep)
                    .ok()
                    .flatten()
                    .map(|node| (dep.clone(), node.confidence))
            })
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .filter(|(_, confidence)| *confidence < 0.5)
    }
}
