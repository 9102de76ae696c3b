//! Named, capability-restricted execution scopes that nest.
//!
//! An orchestrator owns a restricted registry and a dispatcher. Children
//! spawn with a subset of the parent's capabilities; the surface only ever
//! shrinks on the way down. Steps whose `team_scope` names a descendant
//! scope are delegated recursively.

mod critic;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::capability::{CapabilityRegistry, TaskRequest};
use crate::config::DispatchConfig;
use crate::dispatch::Dispatcher;
use crate::error::{HelmsmanError, Result};
use crate::mission::{MissionNode, Provenance, StepOutcome};

pub use critic::{Critic, PatternCritic};

pub struct Orchestrator {
    name: String,
    registry: CapabilityRegistry,
    dispatcher: Dispatcher,
    dispatch_config: DispatchConfig,
    critic: Option<Arc<dyn Critic>>,
    children: RwLock<HashMap<String, Arc<Orchestrator>>>,
}

impl Orchestrator {
    pub fn new(
        name: impl Into<String>,
        registry: CapabilityRegistry,
        dispatch_config: DispatchConfig,
    ) -> Self {
        Self {
            name: name.into(),
            dispatcher: Dispatcher::new(registry.clone(), dispatch_config.clone()),
            registry,
            dispatch_config,
            critic: None,
            children: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_critic(mut self, critic: Arc<dyn Critic>) -> Self {
        self.critic = Some(critic);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Create a named child restricted to `capability_subset` intersected
    /// with this scope's own capabilities. The child inherits the critic.
    pub fn spawn_child(
        self: &Arc<Self>,
        name: impl Into<String>,
        capability_subset: &[String],
    ) -> Arc<Orchestrator> {
        let name = name.into();
        let restricted = self.registry.restrict_to(capability_subset);

        info!(
            parent = %self.name,
            child = %name,
            capabilities = restricted.len(),
            "Child orchestrator spawned"
        );

        let mut child = Orchestrator::new(&name, restricted, self.dispatch_config.clone());
        if let Some(critic) = &self.critic {
            child.critic = Some(Arc::clone(critic));
        }

        let child = Arc::new(child);
        self.children.write().insert(name, Arc::clone(&child));
        child
    }

    pub fn child(&self, name: &str) -> Option<Arc<Orchestrator>> {
        self.children.read().get(name).cloned()
    }

    pub fn child_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.children.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn remove_child(&self, name: &str) -> bool {
        self.children.write().remove(name).is_some()
    }

    /// Depth-first search through the scope tree for a named descendant.
    fn find_scope(self: &Arc<Self>, name: &str) -> Option<Arc<Orchestrator>> {
        if let Some(child) = self.child(name) {
            return Some(child);
        }
        let children: Vec<Arc<Orchestrator>> =
            self.children.read().values().cloned().collect();
        children.into_iter().find_map(|c| c.find_scope(name))
    }

    /// Execute one mission node within this scope. Consults the critic
    /// first; a veto aborts the step with no dispatch attempted. Steps
    /// scoped to a descendant are delegated to that scope's `run_step`.
    pub async fn run_step(self: &Arc<Self>, node: &MissionNode) -> Result<StepOutcome> {
        if let Some(critic) = &self.critic {
            if let Some(reason) = critic.review(node).await {
                warn!(
                    scope = %self.name,
                    step_id = %node.step_id,
                    reason = %reason,
                    "Step vetoed by critic"
                );
                return Err(HelmsmanError::CriticVeto {
                    step_id: node.step_id.clone(),
                    reason,
                });
            }
        }

        if node.team_scope != self.name {
            let Some(scope) = self.find_scope(&node.team_scope) else {
                return Err(HelmsmanError::UnknownScope(node.team_scope.clone()));
            };
            debug!(
                scope = %self.name,
                delegate = %node.team_scope,
                step_id = %node.step_id,
                "Delegating step to child scope"
            );
            // Recursion through the scope tree; boxed to keep the future
            // finitely sized.
            return Box::pin(scope.run_step(node)).await;
        }

        let task = TaskRequest::new(&node.step_id, &node.details);
        let reply = self.dispatcher.dispatch(&node.capability, &task).await?;

        Ok(StepOutcome::success(
            reply.response,
            reply.confidence,
            Provenance::scoped(&self.name),
        ))
    }
}
