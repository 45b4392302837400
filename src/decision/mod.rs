//! Prediction-driven decision core.
//!
//! Wraps a `PredictionProvider` behind a TTL cache and turns qualifying
//! predictions into `BettingDecision`s. Stakes are expressed as fractions of
//! the current bankroll; the risk evaluator converts them into amounts.

use crate::config::DecisionConfig;
use crate::events::{EngineEvent, EventBus};
use crate::providers::PredictionProvider;
use crate::risk;
use crate::types::{BettingDecision, DecisionContext, Prediction};
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Provider output with its insertion time.
#[derive(Debug, Clone)]
struct CachedPrediction {
    prediction: Prediction,
    cached_at: Instant,
}

/// Counters carried on `EngineEvent::MetricsUpdated`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMetrics {
    pub analyses: u64,
    pub cache_hits: u64,
    pub provider_calls: u64,
    pub decisions: u64,
}

/// Analysis pipeline: cache lookup, provider call, confidence gate, sizing.
pub struct DecisionEngine {
    provider: Arc<dyn PredictionProvider>,
    cache: RwLock<HashMap<String, CachedPrediction>>,
    config: DecisionConfig,
    events: Arc<EventBus>,
    metrics: Mutex<DecisionMetrics>,
}

impl DecisionEngine {
    pub fn new(
        provider: Arc<dyn PredictionProvider>,
        config: DecisionConfig,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            cache: RwLock::new(HashMap::new()),
            config,
            events,
            metrics: Mutex::new(DecisionMetrics::default()),
        }
    }

    /// Snapshot of the running counters.
    pub fn metrics(&self) -> DecisionMetrics {
        self.metrics.lock().clone()
    }

    /// Analyze one market context. Returns `None` when the provider fails
    /// (after emitting `EngineEvent::Error`) or when the prediction does not
    /// clear the confidence threshold.
    pub async fn analyze(&self, ctx: &DecisionContext) -> Option<BettingDecision> {
        self.metrics.lock().analyses += 1;
        let key = ctx.cache_key();

        let prediction = match self.fresh_prediction(&key).await {
            Some(prediction) => {
                self.metrics.lock().cache_hits += 1;
                debug!(%key, "serving prediction from cache");
                prediction
            }
            None => {
                self.metrics.lock().provider_calls += 1;
                match self.provider.generate_prediction(ctx).await {
                    Ok(prediction) => {
                        let mut cache = self.cache.write().await;
                        cache.insert(
                            key.clone(),
                            CachedPrediction {
                                prediction: prediction.clone(),
                                cached_at: Instant::now(),
                            },
                        );
                        prediction
                    }
                    Err(e) => {
                        warn!(%key, error = %e, "prediction provider failed");
                        self.events.emit(EngineEvent::Error {
                            source: "decision".to_string(),
                            message: e.to_string(),
                        });
                        return None;
                    }
                }
            }
        };

        if prediction.confidence < self.config.min_confidence {
            debug!(
                %key,
                confidence = prediction.confidence,
                threshold = self.config.min_confidence,
                "prediction below confidence threshold"
            );
            return None;
        }

        let decision = self.generate_decision(prediction, ctx);
        self.metrics.lock().decisions += 1;

        self.events.emit(EngineEvent::NewDecision(decision.clone()));
        self.events.emit(EngineEvent::MetricsUpdated(self.metrics()));

        Some(decision)
    }

    async fn fresh_prediction(&self, key: &str) -> Option<Prediction> {
        let cache = self.cache.read().await;
        let entry = cache.get(key)?;
        if entry.cached_at.elapsed() <= self.config.cache_ttl() {
            Some(entry.prediction.clone())
        } else {
            None
        }
    }

    /// Size the stake as a bankroll fraction: half the distance Kelly would
    /// go, scaled by `bankroll_percentage` and capped at `max_risk_per_bet`.
    fn generate_decision(&self, prediction: Prediction, ctx: &DecisionContext) -> BettingDecision {
        let odds = ctx.market_state.odds.to_f64().unwrap_or(1.0);
        let kelly = risk::kelly_fraction(prediction.win_probability(), odds - 1.0);
        let fraction = (kelly * self.config.bankroll_percentage)
            .min(self.config.max_risk_per_bet)
            .max(0.0);
        let recommended_stake = Decimal::from_f64(fraction).unwrap_or(Decimal::ZERO);

        BettingDecision {
            confidence: prediction.confidence,
            recommended_stake,
            factors: prediction.factors.clone(),
            prediction,
            timestamp: Utc::now(),
            context: ctx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::providers::MockPredictionProvider;
    use crate::types::{Factor, MarketState};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn market_ctx(odds: Decimal) -> DecisionContext {
        DecisionContext {
            player_id: "p1".into(),
            metric: "points".into(),
            market_state: MarketState {
                odds,
                volatility: 0.3,
                momentum: 0.1,
                liquidity: 0.8,
            },
            correlation_factors: HashMap::new(),
        }
    }

    fn prediction(confidence: f64) -> Prediction {
        Prediction {
            event_id: "evt-1".into(),
            model_id: "model-a".into(),
            confidence,
            predicted_value: 24.5,
            recommended_stake: None,
            factors: vec![Factor {
                name: "recent_form".into(),
                weight: 0.6,
                value: 0.7,
            }],
            market_factors: HashMap::new(),
            temporal_factors: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    fn engine(provider: MockPredictionProvider, config: DecisionConfig) -> DecisionEngine {
        DecisionEngine::new(Arc::new(provider), config, Arc::new(EventBus::new()))
    }

    #[tokio::test]
    async fn second_analysis_within_ttl_skips_the_provider() {
        let mut provider = MockPredictionProvider::new();
        let sample = prediction(0.9);
        provider
            .expect_generate_prediction()
            .times(1)
            .returning(move |_| Ok(sample.clone()));

        let engine = engine(provider, DecisionConfig::default());
        let ctx = market_ctx(dec!(2.0));

        assert!(engine.analyze(&ctx).await.is_some());
        assert!(engine.analyze(&ctx).await.is_some());

        let metrics = engine.metrics();
        assert_eq!(metrics.analyses, 2);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.provider_calls, 1);
        assert_eq!(metrics.decisions, 2);
    }

    #[tokio::test]
    async fn expired_cache_entries_trigger_a_refetch() {
        let mut provider = MockPredictionProvider::new();
        let sample = prediction(0.9);
        provider
            .expect_generate_prediction()
            .times(2)
            .returning(move |_| Ok(sample.clone()));

        let config = DecisionConfig {
            cache_ttl_ms: 20,
            ..DecisionConfig::default()
        };
        let engine = engine(provider, config);
        let ctx = market_ctx(dec!(2.0));

        assert!(engine.analyze(&ctx).await.is_some());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(engine.analyze(&ctx).await.is_some());

        assert_eq!(engine.metrics().provider_calls, 2);
    }

    #[tokio::test]
    async fn distinct_contexts_do_not_share_cache_entries() {
        let mut provider = MockPredictionProvider::new();
        let sample = prediction(0.9);
        provider
            .expect_generate_prediction()
            .times(2)
            .returning(move |_| Ok(sample.clone()));

        let engine = engine(provider, DecisionConfig::default());
        let mut other = market_ctx(dec!(2.0));
        other.metric = "assists".into();

        assert!(engine.analyze(&market_ctx(dec!(2.0))).await.is_some());
        assert!(engine.analyze(&other).await.is_some());
    }

    #[tokio::test]
    async fn provider_failure_emits_an_error_event() {
        let mut provider = MockPredictionProvider::new();
        provider
            .expect_generate_prediction()
            .times(1)
            .returning(|_| Err(EngineError::PredictionUnavailable("feed offline".into())));

        let events = Arc::new(EventBus::new());
        let errors = Arc::new(AtomicUsize::new(0));
        {
            let errors = Arc::clone(&errors);
            events.subscribe(move |event| {
                if matches!(event, EngineEvent::Error { .. }) {
                    errors.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        let engine =
            DecisionEngine::new(Arc::new(provider), DecisionConfig::default(), events);
        assert!(engine.analyze(&market_ctx(dec!(2.0))).await.is_none());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(engine.metrics().decisions, 0);
    }

    #[tokio::test]
    async fn low_confidence_is_filtered_without_events() {
        let mut provider = MockPredictionProvider::new();
        let sample = prediction(0.45);
        provider
            .expect_generate_prediction()
            .times(1)
            .returning(move |_| Ok(sample.clone()));

        let events = Arc::new(EventBus::new());
        let emitted = Arc::new(AtomicUsize::new(0));
        {
            let emitted = Arc::clone(&emitted);
            events.subscribe(move |_| {
                emitted.fetch_add(1, Ordering::SeqCst);
            });
        }

        let engine =
            DecisionEngine::new(Arc::new(provider), DecisionConfig::default(), events);
        assert!(engine.analyze(&market_ctx(dec!(2.0))).await.is_none());
        assert_eq!(emitted.load(Ordering::SeqCst), 0);

        let metrics = engine.metrics();
        assert_eq!(metrics.provider_calls, 1);
        assert_eq!(metrics.decisions, 0);
    }

    #[tokio::test]
    async fn stake_is_a_capped_bankroll_fraction() {
        let mut provider = MockPredictionProvider::new();
        let sample = prediction(0.9);
        provider
            .expect_generate_prediction()
            .returning(move |_| Ok(sample.clone()));

        let engine = engine(provider, DecisionConfig::default());
        // p = 0.9 at decimal odds 3.0: kelly = (0.9 * 2 - 0.1) / 2 = 0.85
        let decision = engine.analyze(&market_ctx(dec!(3.0))).await.unwrap();

        let expected = dec!(0.017);
        assert!((decision.recommended_stake - expected).abs() < dec!(0.000000001));
        assert!(decision.recommended_stake <= dec!(0.05));
    }

    #[tokio::test]
    async fn negative_edge_zeroes_the_stake() {
        let mut provider = MockPredictionProvider::new();
        let sample = prediction(0.65);
        provider
            .expect_generate_prediction()
            .returning(move |_| Ok(sample.clone()));

        let engine = engine(provider, DecisionConfig::default());
        // p = 0.65 at odds 1.2 has negative Kelly; the decision survives with
        // a zero stake rather than being dropped.
        let decision = engine.analyze(&market_ctx(dec!(1.2))).await.unwrap();
        assert_eq!(decision.recommended_stake, Decimal::ZERO);
    }

    #[tokio::test]
    async fn decision_event_precedes_metrics_event() {
        let mut provider = MockPredictionProvider::new();
        let sample = prediction(0.9);
        provider
            .expect_generate_prediction()
            .returning(move |_| Ok(sample.clone()));

        let events = Arc::new(EventBus::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        {
            let order = Arc::clone(&order);
            events.subscribe(move |event| {
                let tag = match event {
                    EngineEvent::NewDecision(_) => "decision",
                    EngineEvent::MetricsUpdated(_) => "metrics",
                    _ => "other",
                };
                order.lock().push(tag);
            });
        }

        let engine =
            DecisionEngine::new(Arc::new(provider), DecisionConfig::default(), events);
        engine.analyze(&market_ctx(dec!(2.0))).await.unwrap();

        assert_eq!(*order.lock(), vec!["decision", "metrics"]);
    }
}
