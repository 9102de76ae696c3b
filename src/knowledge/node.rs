use serde::{Deserialize, Serialize};

/// Hypergraph partition. Concrete facts, strategies and causal beliefs
/// live in separate layers sharing one key space per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Concrete,
    Strategy,
    Causal,
}

impl Layer {
    pub fn index(&self) -> u8 {
        match self {
            Self::Concrete => 1,
            Self::Strategy => 2,
            Self::Causal => 3,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Self::Concrete),
            2 => Some(Self::Strategy),
            3 => Some(Self::Causal),
            _ => None,
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Concrete => write!(f, "concrete"),
            Self::Strategy => write!(f, "strategy"),
            Self::Causal => write!(f, "causal"),
        }
    }
}

/// A confidence-weighted knowledge node. Unknown attributes merge into
/// `extra`, so upserts from callers with richer schemas are lossless.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HypergraphNode {
    pub confidence: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,

    /// Keys of other strategy nodes this node depends on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<serde_json::Value>,

    #[serde(
        rename = "type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub node_type: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl HypergraphNode {
    pub fn strategy(steps: Vec<String>, confidence: f64, dependencies: Vec<String>) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 1.0),
            steps: Some(steps),
            dependencies: if dependencies.is_empty() {
                None
            } else {
                Some(dependencies)
            },
            root_cause: None,
            node_type: Some("strategy".to_string()),
            extra: serde_json::Map::new(),
        }
    }

    /// Append-only audit record of a failed strategy. Always confidence 0
    /// with a non-null root cause.
    pub fn negative_pathway(strategy_key: &str, root_cause: serde_json::Value) -> Self {
        let mut extra = serde_json::Map::new();
        extra.insert(
            "strategy".to_string(),
            serde_json::Value::String(strategy_key.to_string()),
        );
        Self {
            confidence: 0.0,
            steps: None,
            dependencies: None,
            root_cause: Some(root_cause),
            node_type: Some("negative_pathway".to_string()),
            extra,
        }
    }

    pub fn causal_belief(intervention: &str, result: &str, confidence: f64) -> Self {
        let mut extra = serde_json::Map::new();
        extra.insert(
            "intervention".to_string(),
            serde_json::Value::String(intervention.to_string()),
        );
        extra.insert(
            "result".to_string(),
            serde_json::Value::String(result.to_string()),
        );
        Self {
            confidence: confidence.clamp(0.0, 1.0),
            steps: None,
            dependencies: None,
            root_cause: None,
            node_type: Some("causal_belief".to_string()),
            extra,
        }
    }

    pub fn clamp_confidence(&mut self) {
        self.confidence = self.confidence.clamp(0.0, 1.0);
    }

    pub fn is_negative_pathway(&self) -> bool {
        self.node_type.as_deref() == Some("negative_pathway")
    }
}
