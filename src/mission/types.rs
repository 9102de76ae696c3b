use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MissionDag, MissionStatus, StepState};

/// A goal plus its execution DAG and runtime state. Owned and mutated only
/// by the scheduler actively executing it; persisted after every node-state
/// transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub title: String,
    pub goal: String,

    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub risk_level: RiskLevel,

    pub dag: MissionDag,

    #[serde(default)]
    pub status: MissionStatus,

    /// Append-only log of node-state transitions.
    #[serde(default)]
    pub history: Vec<StateTransition>,

    /// Count of persistence failures during execution. Non-zero values are
    /// surfaced so operators can detect silent persistence loss.
    #[serde(default)]
    pub storage_errors: u32,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Mission {
    pub fn new(id: impl Into<String>, title: impl Into<String>, goal: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            dag: MissionDag::new(id.clone()),
            id,
            title: title.into(),
            goal: goal.into(),
            inputs: serde_json::Map::new(),
            risk_level: RiskLevel::default(),
            status: MissionStatus::Pending,
            history: Vec::new(),
            storage_errors: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_dag(mut self, mut dag: MissionDag) -> Self {
        dag.mission_id = self.id.clone();
        self.dag = dag;
        self
    }

    pub fn with_risk_level(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    pub fn record_transition(
        &mut self,
        step_id: impl Into<String>,
        from: StepState,
        to: StepState,
        reason: Option<String>,
    ) {
        self.history.push(StateTransition {
            step_id: step_id.into(),
            from,
            to,
            reason,
            at: Utc::now(),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.status == MissionStatus::Completed
    }
}

/// One durable node-state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub step_id: String,
    pub from: StepState,
    pub to: StepState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Serialized plan form accepted from an external planner: title, goal and
/// the node/edge lists. How the plan is produced is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionPlan {
    pub title: String,
    pub goal: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    pub dag: MissionDag,
}

impl MissionPlan {
    pub fn into_mission(self, id: impl Into<String>) -> Mission {
        Mission::new(id, self.title, self.goal)
            .with_risk_level(self.risk_level)
            .with_dag(self.dag)
    }
}
