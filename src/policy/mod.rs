//! Online confidence updates for strategy nodes.
//!
//! `update_strategy` moves a strategy's confidence toward the observed
//! reward, then regularizes toward a per-key baseline with a randomized
//! mixing weight. The weight comes from a seedable RNG so tests and
//! replay runs can pin it down.

use std::sync::Arc;

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::PolicyConfig;
use crate::error::Result;
use crate::knowledge::{KnowledgeHypergraph, Layer};
use crate::recovery::{Remediator, RootCauseAnalyzer};

pub struct PolicyOptimizer {
    graph: Arc<KnowledgeHypergraph>,
    analyzer: RootCauseAnalyzer,
    remediator: Arc<dyn Remediator>,
    config: PolicyConfig,
    rng: parking_lot::Mutex<StdRng>,
    /// First-seen confidence per strategy key, the regularization anchor.
    baselines: DashMap<String, f64>,
}

impl PolicyOptimizer {
    pub fn new(
        graph: Arc<KnowledgeHypergraph>,
        remediator: Arc<dyn Remediator>,
        config: PolicyConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            analyzer: RootCauseAnalyzer::new(Arc::clone(&graph)),
            graph,
            remediator,
            config,
            rng: parking_lot::Mutex::new(rng),
            baselines: DashMap::new(),
        }
    }

    /// Update a strategy's confidence from a reward in [0,1]. Returns the
    /// final confidence. A zero reward additionally records exactly one
    /// negative pathway and triggers best-effort remediation.
    pub async fn update_strategy(&self, strategy_key: &str, reward: f64) -> Result<f64> {
        let reward = reward.clamp(0.0, 1.0);
        let lr = self.config.learning_rate;
        let reg = self.config.regularization;
        let lambda: f64 = self.rng.lock().gen();

        let node = self.graph.modify(Layer::Strategy, strategy_key, |node| {
            let baseline = *self
                .baselines
                .entry(strategy_key.to_string())
                .or_insert(node.confidence);

            let updated = node.confidence + lr * (reward - node.confidence);
            let mixed = (1.0 - reg * lambda) * updated + reg * lambda * baseline;
            node.confidence = mixed.clamp(0.0, 1.0);
        })?;

        debug!(
            strategy = %strategy_key,
            reward,
            confidence = node.confidence,
            "Strategy confidence updated"
        );

        if reward == 0.0 {
            self.record_failure(strategy_key, &node.steps, &node.dependencies)
                .await?;
        }

        Ok(node.confidence)
    }

    /// Zero-reward outcomes are a first-class learning signal: they must
    /// always produce a negative pathway, even if remediation then fails.
    async fn record_failure(
        &self,
        strategy_key: &str,
        steps: &Option<Vec<String>>,
        dependencies: &Option<Vec<String>>,
    ) -> Result<()> {
        let steps = steps.clone().unwrap_or_default();
        let deps = dependencies.clone().unwrap_or_default();

        let cause = self
            .analyzer
            .analyze(&steps, &deps, "strategy yielded zero reward");

        let pathway_key = self
            .graph
            .add_negative_pathway(strategy_key, json!(cause))?;

        info!(
            strategy = %strategy_key,
            pathway = %pathway_key,
            component = %cause.component,
            "Negative pathway recorded"
        );

        if let Err(e) = self.remediator.remediate(&cause).await {
            warn!(
                strategy = %strategy_key,
                component = %cause.component,
                error = %e,
                "Remediation failed; continuing"
            );
        }

        Ok(())
    }

    pub fn graph(&self) -> &Arc<KnowledgeHypergraph> {
        &self.graph
    }
}

/// Map a terminal step outcome to a reward signal.
pub fn score_reward(success: bool, confidence: f64) -> f64 {
    if success {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HelmsmanError;
    use crate::recovery::LogRemediator;

    fn optimizer_with(config: PolicyConfig) -> (Arc<KnowledgeHypergraph>, PolicyOptimizer) {
        let graph = Arc::new(KnowledgeHypergraph::in_memory());
        let optimizer =
            PolicyOptimizer::new(Arc::clone(&graph), Arc::new(LogRemediator), config);
        (graph, optimizer)
    }

    #[tokio::test]
    async fn test_update_moves_toward_reward() {
        let config = PolicyConfig {
            learning_rate: 0.5,
            regularization: 0.0,
            seed: Some(7),
        };
        let (graph, optimizer) = optimizer_with(config);
        let key = graph.add_strategy(vec!["s".into()], 0.4, vec![]).unwrap();

        let updated = optimizer.update_strategy(&key, 1.0).await.unwrap();
        // With reg = 0: 0.4 + 0.5 * (1.0 - 0.4) = 0.7
        assert!((updated - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_deterministic_under_fixed_seed() {
        let config = PolicyConfig {
            learning_rate: 0.3,
            regularization: 0.5,
            seed: Some(42),
        };
        let (graph_a, opt_a) = optimizer_with(config.clone());
        let (graph_b, opt_b) = optimizer_with(config);

        let key_a = graph_a.add_strategy(vec!["s".into()], 0.5, vec![]).unwrap();
        let key_b = graph_b.add_strategy(vec!["s".into()], 0.5, vec![]).unwrap();

        let a = opt_a.update_strategy(&key_a, 0.9).await.unwrap();
        let b = opt_b.update_strategy(&key_b, 0.9).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_unknown_strategy_rejected() {
        let (_, optimizer) = optimizer_with(PolicyConfig::default());
        let err = optimizer.update_strategy("ghost", 0.5).await.unwrap_err();
        assert!(matches!(err, HelmsmanError::UnknownStrategy(_)));
    }

    #[tokio::test]
    async fn test_score_reward() {
        assert_eq!(score_reward(false, 0.9), 0.0);
        assert_eq!(score_reward(true, 0.9), 0.9);
        assert_eq!(score_reward(true, 1.5), 1.0);
    }
}
