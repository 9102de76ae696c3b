//! Mission data model: nodes, DAG, status machine and the durable store.

mod dag;
mod node;
mod status;
mod store;
mod types;

pub use dag::MissionDag;
pub use node::{MissionNode, Provenance, StepOutcome};
pub use status::{MissionStatus, StepState};
pub use store::MissionStore;
pub use types::{Mission, MissionPlan, RiskLevel, StateTransition};
