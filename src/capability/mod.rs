//! Capability registry and the specialist seam.

mod registry;
mod specialist;

pub use registry::CapabilityRegistry;
pub use specialist::{EchoSpecialist, Specialist, SpecialistReply, TaskRequest};
