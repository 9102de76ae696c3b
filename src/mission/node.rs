use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StepState;

/// One unit of work in a mission DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionNode {
    pub step_id: String,

    /// Names a capability registry entry.
    pub capability: String,

    /// Names the orchestrator scope authorized to run this step.
    pub team_scope: String,

    /// Free-form instruction text, opaque to the scheduler.
    pub details: String,

    /// Requires external approval before dispatch when set.
    #[serde(default)]
    pub hitl_gate: bool,

    /// Step ids that must succeed before this node becomes ready.
    #[serde(default)]
    pub deps: Vec<String>,

    #[serde(default)]
    pub state: StepState,

    /// Optional knowledge-store strategy key; rewards for this node's
    /// outcome are routed to the policy optimizer under this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StepOutcome>,
}

impl MissionNode {
    pub fn new(
        step_id: impl Into<String>,
        capability: impl Into<String>,
        team_scope: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            capability: capability.into(),
            team_scope: team_scope.into(),
            details: details.into(),
            hitl_gate: false,
            deps: Vec::new(),
            state: StepState::Pending,
            strategy: None,
            started_at: None,
            completed_at: None,
            outcome: None,
        }
    }

    pub fn with_deps(mut self, deps: Vec<String>) -> Self {
        self.deps = deps;
        self
    }

    pub fn with_hitl_gate(mut self) -> Self {
        self.hitl_gate = true;
        self
    }

    pub fn with_strategy(mut self, key: impl Into<String>) -> Self {
        self.strategy = Some(key.into());
        self
    }

    /// Ready iff pending and every dependency is among `satisfied`.
    pub fn is_ready(&self, satisfied: &[&str]) -> bool {
        self.state == StepState::Pending
            && self
                .deps
                .iter()
                .all(|dep| satisfied.contains(&dep.as_str()))
    }

    pub fn start(&mut self) {
        debug_assert!(self.state.can_transition_to(StepState::Running));
        self.state = StepState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn succeed(&mut self, outcome: StepOutcome) {
        self.state = StepState::Succeeded;
        self.completed_at = Some(Utc::now());
        self.outcome = Some(outcome);
    }

    pub fn fail(&mut self, outcome: StepOutcome) {
        self.state = StepState::Failed;
        self.completed_at = Some(Utc::now());
        self.outcome = Some(outcome);
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        debug_assert!(self.state.can_transition_to(StepState::Skipped));
        self.state = StepState::Skipped;
        self.completed_at = Some(Utc::now());
        self.outcome = Some(StepOutcome::failure(reason, Provenance::default()));
    }

    /// Reward signal for the policy optimizer: the specialist's reported
    /// confidence on success, zero on any failure.
    pub fn reward(&self) -> f64 {
        match &self.outcome {
            Some(o) if self.state == StepState::Succeeded => o.confidence.clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

/// Terminal result of one node's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,
    pub response: String,
    pub confidence: f64,
    #[serde(default)]
    pub provenance: Provenance,
}

impl StepOutcome {
    pub fn success(
        response: impl Into<String>,
        confidence: f64,
        provenance: Provenance,
    ) -> Self {
        Self {
            success: true,
            response: response.into(),
            confidence: confidence.clamp(0.0, 1.0),
            provenance,
        }
    }

    pub fn failure(reason: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            success: false,
            response: reason.into(),
            confidence: 0.0,
            provenance,
        }
    }
}

/// Where and how an outcome was produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provenance {
    /// Set when a critic veto aborted the step before any dispatch.
    #[serde(default)]
    pub veto: bool,

    /// Set when mission-level cancellation terminated the dispatch.
    #[serde(default)]
    pub cancelled: bool,

    /// Orchestrator scope that executed (or rejected) the step.
    #[serde(default)]
    pub scope: String,
}

impl Provenance {
    pub fn scoped(scope: impl Into<String>) -> Self {
        Self {
            veto: false,
            cancelled: false,
            scope: scope.into(),
        }
    }

    pub fn vetoed(scope: impl Into<String>) -> Self {
        Self {
            veto: true,
            cancelled: false,
            scope: scope.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_requires_all_deps() {
        let node = MissionNode::new("c", "synthesize", "root", "combine results")
            .with_deps(vec!["a".into(), "b".into()]);

        assert!(!node.is_ready(&[]));
        assert!(!node.is_ready(&["a"]));
        assert!(node.is_ready(&["a", "b"]));
    }

    #[test]
    fn test_non_pending_never_ready() {
        let mut node = MissionNode::new("a", "search", "root", "find docs");
        node.start();
        assert!(!node.is_ready(&[]));
    }

    #[test]
    fn test_reward_zero_on_failure() {
        let mut node = MissionNode::new("a", "search", "root", "find docs");
        node.start();
        node.fail(StepOutcome::failure("boom", Provenance::default()));
        assert_eq!(node.reward(), 0.0);
    }

    #[test]
    fn test_reward_tracks_confidence() {
        let mut node = MissionNode::new("a", "search", "root", "find docs");
        node.start();
        node.succeed(StepOutcome::success("ok", 0.85, Provenance::scoped("root")));
        assert!((node.reward() - 0.85).abs() < f64::EPSILON);
    }
}
