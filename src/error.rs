use thiserror::Error;

#[derive(Error, Debug)]
pub enum HelmsmanError {
    #[error("Mission DAG contains a cycle involving step: {0}")]
    CyclicDag(String),

    #[error("Step '{step}' depends on unknown step: {dep}")]
    UnknownDependency { step: String, dep: String },

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Unknown team scope: {0}")]
    UnknownScope(String),

    #[error("Dispatch to '{specialist}' timed out after {timeout_ms}ms")]
    DispatchTimeout { specialist: String, timeout_ms: u64 },

    #[error("Dispatch to '{specialist}' failed after {attempts} attempts: {last_error}")]
    DispatchFailed {
        specialist: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Specialist error: {0}")]
    Specialist(String),

    #[error("Step '{step_id}' vetoed by critic: {reason}")]
    CriticVeto { step_id: String, reason: String },

    #[error("Approval denied for step: {0}")]
    ApprovalDenied(String),

    #[error("Mission cancelled")]
    Cancelled,

    #[error("Mission not found: {0}")]
    MissionNotFound(String),

    #[error("Unknown strategy node: {0}")]
    UnknownStrategy(String),

    #[error("Invalid property name: {0}")]
    InvalidPropertyName(String),

    #[error("Knowledge store error: {0}")]
    Knowledge(String),

    #[error("State persistence failed: {0}")]
    StoragePersistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl HelmsmanError {
    /// Whether a single failed dispatch attempt may be retried within the
    /// same `dispatch` call. Unknown capabilities and vetoes are final;
    /// only in-flight call failures are worth repeating.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DispatchTimeout { .. } | Self::Specialist(_) | Self::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HelmsmanError>;
