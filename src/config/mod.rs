//! Configuration loaded from `helmsman.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{HelmsmanError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmsmanConfig {
    pub scheduler: SchedulerConfig,
    pub dispatch: DispatchConfig,
    pub policy: PolicyConfig,
    pub knowledge: KnowledgeConfig,
    pub server: ServerConfig,
}

impl HelmsmanConfig {
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("helmsman.toml");
        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        self.validate()?;
        let config_path = data_dir.join("helmsman.toml");
        let content =
            toml::to_string_pretty(self).map_err(|e| HelmsmanError::Config(e.to_string()))?;
        fs::write(&config_path, content).await?;
        Ok(())
    }

    /// Validate configuration values for consistency. Collects every
    /// violation rather than stopping at the first.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.scheduler.max_parallel == 0 {
            errors.push("scheduler.max_parallel must be greater than 0");
        }

        if self.dispatch.timeout_ms == 0 {
            errors.push("dispatch.timeout_ms must be greater than 0");
        }
        if self.dispatch.max_attempts == 0 {
            errors.push("dispatch.max_attempts must be greater than 0");
        }
        if self.dispatch.max_concurrent == 0 {
            errors.push("dispatch.max_concurrent must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.policy.learning_rate) {
            errors.push("policy.learning_rate must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&self.policy.regularization) {
            errors.push("policy.regularization must be between 0.0 and 1.0");
        }

        if !(0.0..=1.0).contains(&self.knowledge.low_confidence_threshold) {
            errors.push("knowledge.low_confidence_threshold must be between 0.0 and 1.0");
        }
        if self.knowledge.backend == KnowledgeBackendKind::Sqlite
            && self.knowledge.sqlite_path.is_none()
        {
            errors.push("knowledge.sqlite_path is required for the sqlite backend");
        }

        if self.server.bind.is_empty() {
            errors.push("server.bind must not be empty");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(HelmsmanError::Config(errors.join("; ")))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on concurrently running node dispatches per mission.
    pub max_parallel: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_parallel: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Hard timeout per dispatch attempt.
    pub timeout_ms: u64,
    /// Total attempts per dispatch call, first try included.
    pub max_attempts: u32,
    /// Validity window for the result cache.
    pub cache_ttl_ms: u64,
    /// Bound on specialist calls in flight across the dispatcher.
    pub max_concurrent: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            max_attempts: 3,
            cache_ttl_ms: 30_000,
            max_concurrent: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub learning_rate: f64,
    pub regularization: f64,
    /// Fixed seed for the regularization mixing weight. Leave unset for
    /// entropy seeding; set for reproducible updates.
    pub seed: Option<u64>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.2,
            regularization: 0.1,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub backend: KnowledgeBackendKind,
    pub sqlite_path: Option<PathBuf>,
    pub low_confidence_threshold: f64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            backend: KnowledgeBackendKind::Memory,
            sqlite_path: None,
            low_confidence_threshold: 0.3,
        }
    }
}

/// Backing store for the knowledge hypergraph, selected explicitly at
/// construction time rather than inferred from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeBackendKind {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8420".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(HelmsmanConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut config = HelmsmanConfig::default();
        config.scheduler.max_parallel = 0;
        config.policy.learning_rate = 1.5;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_parallel"));
        assert!(err.contains("learning_rate"));
    }

    #[test]
    fn test_sqlite_backend_requires_path() {
        let mut config = HelmsmanConfig::default();
        config.knowledge.backend = KnowledgeBackendKind::Sqlite;
        assert!(config.validate().is_err());

        config.knowledge.sqlite_path = Some("knowledge.db".into());
        assert!(config.validate().is_ok());
    }
}
