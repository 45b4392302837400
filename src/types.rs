//! Core data types shared across the engine.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single weighted signal contributing to a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    pub weight: f64,
    pub value: f64,
}

/// Market conditions for the metric being analyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    /// Quoted decimal odds for the metric (payout per unit staked, stake included).
    pub odds: Decimal,
    pub volatility: f64,
    pub momentum: f64,
    pub liquidity: f64,
}

impl MarketState {
    /// Probability implied by the quoted odds.
    pub fn implied_probability(&self) -> f64 {
        let odds = self.odds.to_f64().unwrap_or(0.0);
        if odds > 1.0 {
            1.0 / odds
        } else {
            1.0
        }
    }
}

/// Everything the decision core needs to analyze one player/metric pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub player_id: String,
    pub metric: String,
    pub market_state: MarketState,
    pub correlation_factors: HashMap<String, f64>,
}

impl DecisionContext {
    /// Cache key for the prediction cache. Market state is deliberately
    /// excluded: it mutates continuously and would defeat the TTL cache.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.player_id, self.metric)
    }
}

/// Model output for one event. Immutable once created; freshness is
/// enforced by the decision core's TTL cache, not by the value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub event_id: String,
    pub model_id: String,
    /// Model confidence in [0, 1].
    pub confidence: f64,
    pub predicted_value: f64,
    /// Upstream stake suggestion as a fraction of current bankroll.
    pub recommended_stake: Option<Decimal>,
    pub factors: Vec<Factor>,
    pub market_factors: HashMap<String, f64>,
    pub temporal_factors: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl Prediction {
    /// Win probability derived from model output. Single derivation point:
    /// risk math must not reach into `confidence` directly.
    pub fn win_probability(&self) -> f64 {
        self.confidence.clamp(0.0, 1.0)
    }
}

/// Actionable output of the decision core.
///
/// `recommended_stake` is a fraction of current bankroll. The decision core
/// has no ledger access; converting fractions to currency is the risk
/// evaluator's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BettingDecision {
    pub confidence: f64,
    pub recommended_stake: Decimal,
    pub prediction: Prediction,
    pub factors: Vec<Factor>,
    pub timestamp: DateTime<Utc>,
    pub context: DecisionContext,
}
