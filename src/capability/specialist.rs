use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Task description handed to a specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub step_id: String,
    pub details: String,

    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl TaskRequest {
    pub fn new(step_id: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            details: details.into(),
            context: serde_json::Map::new(),
        }
    }

    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Structured specialist result. A reply carrying `error` counts as a
/// failed attempt for retry purposes even when the call itself returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistReply {
    pub response: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpecialistReply {
    pub fn success(response: impl Into<String>, confidence: f64) -> Self {
        Self {
            response: response.into(),
            confidence: confidence.clamp(0.0, 1.0),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            response: String::new(),
            confidence: 0.0,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A named worker able to execute a task description. The core treats this
/// as an opaque remote or local call with no assumptions beyond the reply
/// shape.
#[async_trait]
pub trait Specialist: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, task: &TaskRequest) -> Result<SpecialistReply>;
}

/// Stand-in specialist that echoes the task back with fixed confidence.
/// Used by the CLI demo wiring; real tool integrations live outside the core.
pub struct EchoSpecialist {
    name: String,
    confidence: f64,
}

impl EchoSpecialist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            confidence: 0.9,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

#[async_trait]
impl Specialist for EchoSpecialist {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, task: &TaskRequest) -> Result<SpecialistReply> {
        Ok(SpecialistReply::success(
            format!("[{}] {}", self.name, task.details),
            self.confidence,
        ))
    }
}
