use async_trait::async_trait;

use crate::mission::MissionNode;

/// Policy gate consulted before any dispatch. Returning a reason vetoes
/// the step; a vetoed step fails without ever reaching the dispatcher.
#[async_trait]
pub trait Critic: Send + Sync {
    async fn review(&self, node: &MissionNode) -> Option<String>;
}

/// Critic that vetoes steps whose details contain a disallowed pattern.
pub struct PatternCritic {
    disallowed: Vec<String>,
}

impl PatternCritic {
    pub fn new(disallowed: Vec<String>) -> Self {
        Self {
            disallowed: disallowed
                .into_iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }
}

#[async_trait]
impl Critic for PatternCritic {
    async fn review(&self, node: &MissionNode) -> Option<String> {
        let details = node.details.to_lowercase();
        self.disallowed
            .iter()
            .find(|pattern| details.contains(pattern.as_str()))
            .map(|pattern| format!("details match disallowed pattern '{}'", pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pattern_critic_vetoes_match() {
        let critic = PatternCritic::new(vec!["rm -rf".into()]);

        let bad = MissionNode::new("s1", "shell", "root", "run rm -rf / please");
        assert!(critic.review(&bad).await.is_some());

        let fine = MissionNode::new("s2", "shell", "root", "list the directory");
        assert!(critic.review(&fine).await.is_none());
    }
}
