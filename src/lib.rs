pub mod capability;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod knowledge;
pub mod mission;
pub mod orchestrator;
pub mod policy;
pub mod recovery;
pub mod scheduler;
pub mod server;

pub use capability::{CapabilityRegistry, Specialist, SpecialistReply, TaskRequest};
pub use config::HelmsmanConfig;
pub use dispatch::Dispatcher;
pub use error::{HelmsmanError, Result};
pub use knowledge::{HypergraphNode, KnowledgeBackend, KnowledgeHypergraph, Layer};
pub use mission::{Mission, MissionDag, MissionNode, MissionPlan, MissionStatus, MissionStore};
pub use orchestrator::{Critic, Orchestrator};
pub use policy::PolicyOptimizer;
pub use recovery::{Remediator, RootCause, RootCauseAnalyzer};
pub use scheduler::{ApprovalGate, ExecutionResult, MissionScheduler};
