//! DAG engine: walks a mission's graph, dispatching ready nodes in
//! parallel through an orchestrator scope and persisting every node-state
//! transition before the walk proceeds.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use async_trait::async_trait;

use crate::error::{HelmsmanError, Result};
use crate::mission::{
    Mission, MissionNode, MissionStatus, MissionStore, Provenance, StepOutcome, StepState,
};
use crate::orchestrator::Orchestrator;
use crate::policy::PolicyOptimizer;

/// External approval hook for steps flagged `hitl_gate`. The approval
/// mechanism itself lives outside the core; the default approves
/// everything.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn approve(&self, node: &MissionNode) -> bool;
}

pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn approve(&self, _node: &MissionNode) -> bool {
        true
    }
}

/// Summary of one mission execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub mission_id: String,
    pub status: MissionStatus,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Persistence failures observed during the walk. Non-zero means the
    /// durable record may lag the in-memory state.
    pub storage_errors: u32,
}

/// Cancels a running mission. Propagates to all in-flight node dispatches,
/// which terminate as failed with a cancellation reason.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct MissionScheduler {
    orchestrator: Arc<Orchestrator>,
    store: Arc<MissionStore>,
    policy: Option<Arc<PolicyOptimizer>>,
    approval: Arc<dyn ApprovalGate>,
    max_parallel: usize,
    cancel: Arc<watch::Sender<bool>>,
}

impl MissionScheduler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        store: Arc<MissionStore>,
        max_parallel: usize,
    ) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            orchestrator,
            store,
            policy: None,
            approval: Arc::new(AutoApprove),
            max_parallel: max_parallel.max(1),
            cancel: Arc::new(tx),
        }
    }

    pub fn with_policy(mut self, policy: Arc<PolicyOptimizer>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval = gate;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel),
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Walk the mission DAG to completion. Fails fast with `CyclicDag`
    /// before any node is dispatched; individual node failures never abort
    /// the walk, they propagate only to dependents (as `skipped`) and to
    /// the final mission status.
    pub async fn execute(&self, mission: &mut Mission) -> Result<ExecutionResult> {
        mission.dag.validate()?;

        info!(
            mission_id = %mission.id,
            nodes = mission.dag.len(),
            max_parallel = self.max_parallel,
            "Mission execution started"
        );

        mission.status = MissionStatus::Running;
        mission.started_at = Some(Utc::now());
        self.persist(mission).await;

        let mut in_flight: JoinSet<(String, Result<StepOutcome>)> = JoinSet::new();

        loop {
            self.skip_blocked(mission).await;

            if !self.is_cancelled() {
                self.launch_ready(mission, &mut in_flight).await;
            }

            if in_flight.is_empty() {
                // Approval denials settle inside `launch_ready` without
                // ever entering the join set; their dependents still need
                // a skip sweep before the walk can end.
                if mission.dag.blocked_steps().is_empty() {
                    break;
                }
                continue;
            }

            let Some(joined) = in_flight.join_next().await else {
                continue;
            };

            let (step_id, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Node dispatch task panicked");
                    continue;
                }
            };
            self.settle(mission, &step_id, outcome).await;
        }

        mission.status = self.final_status(mission);
        mission.completed_at = Some(Utc::now());
        self.persist(mission).await;

        let result = ExecutionResult {
            mission_id: mission.id.clone(),
            status: mission.status.clone(),
            succeeded: mission.dag.count_in_state(StepState::Succeeded),
            failed: mission.dag.count_in_state(StepState::Failed),
            skipped: mission.dag.count_in_state(StepState::Skipped),
            storage_errors: mission.storage_errors,
        };

        info!(
            mission_id = %result.mission_id,
            status = %result.status,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            "Mission execution finished"
        );

        Ok(result)
    }

    /// Pending nodes with a failed or skipped dependency can never run;
    /// mark them skipped (and cascade, since skipping blocks dependents).
    async fn skip_blocked(&self, mission: &mut Mission) {
        loop {
            let blocked = mission.dag.blocked_steps();
            if blocked.is_empty() {
                return;
            }
            for (step_id, dep) in blocked {
                let reason = format!("dependency '{}' did not succeed", dep);
                if let Some(node) = mission.dag.node_mut(&step_id) {
                    node.skip(reason.clone());
                }
                mission.record_transition(
                    &step_id,
                    StepState::Pending,
                    StepState::Skipped,
                    Some(reason),
                );
                self.persist(mission).await;
            }
        }
    }

    async fn launch_ready(
        &self,
        mission: &mut Mission,
        in_flight: &mut JoinSet<(String, Result<StepOutcome>)>,
    ) {
        for step_id in mission.dag.ready_steps() {
            if in_flight.len() >= self.max_parallel {
                return;
            }

            let node = match mission.dag.node(&step_id) {
                Some(n) => n.clone(),
                None => continue,
            };

            if node.hitl_gate && !self.approval.approve(&node).await {
                // Denied before dispatch; the node still passes through
                // running so the transition log stays well-formed.
                self.transition_running(mission, &step_id).await;
                let outcome = StepOutcome::failure(
                    HelmsmanError::ApprovalDenied(step_id.clone()).to_string(),
                    Provenance::default(),
                );
                self.settle(mission, &step_id, Ok(outcome)).await;
                continue;
            }

            self.transition_running(mission, &step_id).await;

            let orchestrator = Arc::clone(&self.orchestrator);
            let mut cancel_rx = self.cancel.subscribe();
            in_flight.spawn(async move {
                if *cancel_rx.borrow() {
                    return (node.step_id.clone(), Err(HelmsmanError::Cancelled));
                }
                tokio::select! {
                    result = orchestrator.run_step(&node) => (node.step_id.clone(), result),
                    _ = cancel_rx.changed() => {
                        (node.step_id.clone(), Err(HelmsmanError::Cancelled))
                    }
                }
            });
        }
    }

    async fn transition_running(&self, mission: &mut Mission, step_id: &str) {
        if let Some(node) = mission.dag.node_mut(step_id) {
            node.start();
        }
        mission.record_transition(step_id, StepState::Pending, StepState::Running, None);
        self.persist(mission).await;
    }

    /// Apply a terminal outcome to a node, persist the transition, and
    /// route the reward into the policy optimizer.
    async fn settle(
        &self,
        mission: &mut Mission,
        step_id: &str,
        outcome: Result<StepOutcome>,
    ) {
        let outcome = match outcome {
            Ok(o) => o,
            Err(e) => {
                let mut provenance = Provenance::default();
                match &e {
                    HelmsmanError::CriticVeto { .. } => provenance.veto = true,
                    HelmsmanError::Cancelled => provenance.cancelled = true,
                    _ => {}
                }
                StepOutcome::failure(e.to_string(), provenance)
            }
        };

        let (to, reason) = if outcome.success {
            (StepState::Succeeded, None)
        } else {
            (StepState::Failed, Some(outcome.response.clone()))
        };

        if let Some(node) = mission.dag.node_mut(step_id) {
            if outcome.success {
                node.succeed(outcome);
            } else {
                node.fail(outcome);
            }
        }
        mission.record_transition(step_id, StepState::Running, to, reason);
        self.persist(mission).await;

        self.feed_reward(mission, step_id).await;
    }

    async fn feed_reward(&self, mission: &Mission, step_id: &str) {
        let Some(policy) = &self.policy else { return };
        let Some(node) = mission.dag.node(step_id) else {
            return;
        };
        let Some(strategy) = &node.strategy else {
            return;
        };

        if let Err(e) = policy.update_strategy(strategy, node.reward()).await {
            warn!(
                step_id = %step_id,
                strategy = %strategy,
                error = %e,
                "Reward update failed"
            );
        }
    }

    /// Persistence failures are logged and counted, never fatal to mission
    /// progress; the count is surfaced on the mission document.
    async fn persist(&self, mission: &mut Mission) {
        if let Err(e) = self.store.save(mission).await {
            warn!(mission_id = %mission.id, error = %e, "State persistence failed");
            mission.storage_errors += 1;
        }
    }

    fn final_status(&self, mission: &Mission) -> MissionStatus {
        if self.is_cancelled() {
            return MissionStatus::Cancelled;
        }
        if mission.dag.all_succeeded() {
            MissionStatus::Completed
        } else {
            MissionStatus::Failed
        }
    }
}
