//! Scope hierarchy: shrink-only capability inheritance, delegation, and
//! critic gating before any dispatch.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use helmsman::capability::{
    CapabilityRegistry, EchoSpecialist, Specialist, SpecialistReply, TaskRequest,
};
use helmsman::config::DispatchConfig;
use helmsman::error::{HelmsmanError, Result};
use helmsman::mission::MissionNode;
use helmsman::orchestrator::{Critic, Orchestrator};

struct CountingSpecialist {
    name: String,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Specialist for CountingSpecialist {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, task: &TaskRequest) -> Result<SpecialistReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SpecialistReply::success(task.details.clone(), 0.9))
    }
}

struct VetoEverything;

#[async_trait]
impl Critic for VetoEverything {
    async fn review(&self, node: &MissionNode) -> Option<String> {
        Some(format!("step '{}' not permitted", node.step_id))
    }
}

fn root_with(capabilities: &[&str]) -> Arc<Orchestrator> {
    let registry = CapabilityRegistry::new();
    for name in capabilities {
        registry.register(Arc::new(EchoSpecialist::new(*name)));
    }
    Arc::new(Orchestrator::new(
        "root",
        registry,
        DispatchConfig::default(),
    ))
}

#[tokio::test]
async fn test_child_capabilities_only_shrink() {
    let root = root_with(&["search", "code_review"]);

    // Asking for a capability the parent lacks grants nothing extra.
    let child = root.spawn_child(
        "review-team",
        &["code_review".to_string(), "deploy".to_string()],
    );

    assert_eq!(child.registry().names(), vec!["code_review"]);
    assert!(!child.registry().contains("deploy"));
    assert!(!child.registry().contains("search"));
}

#[tokio::test]
async fn test_restricted_child_rejects_out_of_scope_capability() {
    let root = root_with(&["search", "code_review", "deploy"]);
    root.spawn_child("review-team", &["code_review".to_string()]);

    // The step targets the child scope but names a capability only the
    // parent holds; it must fail in the child, not escalate.
    let node = MissionNode::new("s1", "deploy", "review-team", "ship it");
    let err = root.run_step(&node).await.unwrap_err();
    assert!(matches!(err, HelmsmanError::UnknownCapability(_)));
}

#[tokio::test]
async fn test_delegation_reaches_nested_scope() {
    let root = root_with(&["search", "code_review"]);
    let team = root.spawn_child("team-a", &["code_review".to_string()]);
    team.spawn_child("team-a-review", &["code_review".to_string()]);

    let node = MissionNode::new("s1", "code_review", "team-a-review", "review the diff");
    let outcome = root.run_step(&node).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.provenance.scope, "team-a-review");
}

#[tokio::test]
async fn test_unknown_scope_rejected() {
    let root = root_with(&["search"]);
    let node = MissionNode::new("s1", "search", "ghost-team", "find the docs");

    let err = root.run_step(&node).await.unwrap_err();
    assert!(matches!(err, HelmsmanError::UnknownScope(_)));
}

#[tokio::test]
async fn test_veto_prevents_dispatch_entirely() {
    let calls = Arc::new(AtomicU32::new(0));
    let registry = CapabilityRegistry::new();
    registry.register(Arc::new(CountingSpecialist {
        name: "search".into(),
        calls: Arc::clone(&calls),
    }));
    let root = Arc::new(
        Orchestrator::new("root", registry, DispatchConfig::default())
            .with_critic(Arc::new(VetoEverything)),
    );

    let node = MissionNode::new("s1", "search", "root", "find the docs");
    let err = root.run_step(&node).await.unwrap_err();

    assert!(matches!(err, HelmsmanError::CriticVeto { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_children_inherit_the_critic() {
    let registry = CapabilityRegistry::new();
    registry.register(Arc::new(EchoSpecialist::new("search")));
    let root = Arc::new(
        Orchestrator::new("root", registry, DispatchConfig::default())
            .with_critic(Arc::new(VetoEverything)),
    );
    let child = root.spawn_child("sub", &["search".to_string()]);

    // Run directly against the child so the veto provably comes from the
    // inherited critic, not the root's own review.
    let node = MissionNode::new("s1", "search", "sub", "find the docs");
    let err = child.run_step(&node).await.unwrap_err();
    assert!(matches!(err, HelmsmanError::CriticVeto { .. }));
}
