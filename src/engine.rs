//! Construction-time wiring for the engine components.
//!
//! Everything is passed in explicitly; there are no globals. Tests build
//! throwaway contexts around mock providers.

use crate::config::EngineConfig;
use crate::decision::DecisionEngine;
use crate::events::EventBus;
use crate::personalize::Personalizer;
use crate::providers::PredictionProvider;
use crate::risk::RiskEvaluator;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared handles over the live components. Cloning is cheap; all clones
/// point at the same state.
#[derive(Clone)]
pub struct EngineContext {
    pub config: EngineConfig,
    pub events: Arc<EventBus>,
    pub risk: Arc<RwLock<RiskEvaluator>>,
    pub personalizer: Arc<RwLock<Personalizer>>,
    pub decisions: Arc<DecisionEngine>,
}

impl EngineContext {
    pub fn new(config: EngineConfig, provider: Arc<dyn PredictionProvider>) -> Self {
        let events = Arc::new(EventBus::new());
        let risk = Arc::new(RwLock::new(RiskEvaluator::new(
            config.risk.clone(),
            config.initial_bankroll,
        )));
        let personalizer = Arc::new(RwLock::new(Personalizer::new(config.clustering.clone())));
        let decisions = Arc::new(DecisionEngine::new(
            provider,
            config.decision.clone(),
            Arc::clone(&events),
        ));

        Self {
            config,
            events,
            risk,
            personalizer,
            decisions,
        }
    }
}
