//! Behavioral profile store.
//!
//! Profiles grow by streaming updates: each resolved bet appends to the
//! histories and refreshes the scalar summaries in O(1).

use crate::error::{EngineError, Result};
use crate::risk::{Bet, BetStatus};
use crate::types::Prediction;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Blend factor for the exponentially weighted preference summaries.
const EWMA_ALPHA: f64 = 0.2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BettingBehavior {
    pub total_bets: u32,
    pub total_stake: Decimal,
    pub average_stake: Decimal,
    pub stake_history: Vec<Decimal>,
    pub odds_history: Vec<Decimal>,
    pub confidence_history: Vec<f64>,
    pub outcome_history: Vec<bool>,
    /// Running sum of squared stakes backing the O(1) variation update.
    #[serde(default)]
    pub stake_squared_sum: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Profit per unit staked.
    pub roi: f64,
    pub win_rate: f64,
    pub average_odds: f64,
    pub profit_loss: Decimal,
}

/// Scalar risk summary; these three plus the preference scalars form the
/// clustering feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTraits {
    /// Coefficient of variation of the stake history.
    pub stake_variation: f64,
    /// Mean implied probability of the odds taken: high prefers favorites.
    pub odds_preference: f64,
    /// Mean confidence at which this user historically bets.
    pub confidence_threshold: f64,
}

impl Default for RiskTraits {
    fn default() -> Self {
        Self {
            stake_variation: 0.0,
            odds_preference: 0.5,
            confidence_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionPreferences {
    /// Per-model outcome trust in [0, 1], blended per resolution.
    pub model_trust: HashMap<String, f64>,
    /// Multiplicative appetite for market-driven factors, in [0, 2].
    pub market_sensitivity: f64,
    /// Multiplicative appetite for temporal factors, in [0, 2].
    pub temporal_preference: f64,
}

impl Default for PredictionPreferences {
    fn default() -> Self {
        Self {
            model_trust: HashMap::new(),
            market_sensitivity: 1.0,
            temporal_preference: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralProfile {
    pub user_id: String,
    pub betting_behavior: BettingBehavior,
    pub performance: PerformanceMetrics,
    pub risk_traits: RiskTraits,
    pub preferences: PredictionPreferences,
    /// Assigned by the clusterer; None until the first pass includes this
    /// profile.
    pub cluster_id: Option<usize>,
    pub updated_at: DateTime<Utc>,
}

impl BehavioralProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            betting_behavior: BettingBehavior::default(),
            performance: PerformanceMetrics::default(),
            risk_traits: RiskTraits::default(),
            preferences: PredictionPreferences::default(),
            cluster_id: None,
            updated_at: Utc::now(),
        }
    }

    /// Feature vector consumed by the clusterer.
    pub fn feature_vector(&self) -> [f64; 4] {
        [
            self.risk_traits.stake_variation,
            self.risk_traits.odds_preference,
            self.preferences.market_sensitivity,
            self.preferences.temporal_preference,
        ]
    }

    fn apply_resolution(&mut self, bet: &Bet, prediction: &Prediction) {
        let won = bet.status == BetStatus::Won;
        let outcome = if won { 1.0 } else { 0.0 };

        let behavior = &mut self.betting_behavior;
        behavior.total_bets += 1;
        behavior.total_stake += bet.amount;
        behavior.average_stake = behavior.total_stake / Decimal::from(behavior.total_bets);
        behavior.stake_history.push(bet.amount);
        behavior.odds_history.push(bet.odds);
        behavior.confidence_history.push(prediction.confidence);
        behavior.outcome_history.push(won);
        let stake = bet.amount.to_f64().unwrap_or(0.0);
        behavior.stake_squared_sum += stake * stake;

        let n = f64::from(behavior.total_bets);
        let odds = bet.odds.to_f64().unwrap_or(1.0);

        let net = match bet.payout {
            Some(payout) => payout - bet.amount,
            None => -bet.amount,
        };
        self.performance.profit_loss += net;
        self.performance.win_rate += (outcome - self.performance.win_rate) / n;
        self.performance.average_odds += (odds - self.performance.average_odds) / n;
        let staked = behavior.total_stake.to_f64().unwrap_or(0.0);
        self.performance.roi = if staked > 0.0 {
            self.performance.profit_loss.to_f64().unwrap_or(0.0) / staked
        } else {
            0.0
        };

        let mean = behavior.average_stake.to_f64().unwrap_or(0.0);
        self.risk_traits.stake_variation = if mean > 0.0 {
            let variance = (behavior.stake_squared_sum / n - mean * mean).max(0.0);
            variance.sqrt() / mean
        } else {
            0.0
        };
        let implied = if odds > 0.0 { 1.0 / odds } else { 1.0 };
        self.risk_traits.odds_preference += (implied - self.risk_traits.odds_preference) / n;
        self.risk_traits.confidence_threshold +=
            (prediction.confidence - self.risk_traits.confidence_threshold) / n;

        let trust = self
            .preferences
            .model_trust
            .entry(prediction.model_id.clone())
            .or_insert(0.5);
        *trust = (1.0 - EWMA_ALPHA) * *trust + EWMA_ALPHA * outcome;

        if !prediction.market_factors.is_empty() {
            let exposure = mean_abs(prediction.market_factors.values());
            self.preferences.market_sensitivity = blend(
                self.preferences.market_sensitivity,
                exposure,
            );
        }
        if !prediction.temporal_factors.is_empty() {
            let exposure = mean_abs(prediction.temporal_factors.values());
            self.preferences.temporal_preference = blend(
                self.preferences.temporal_preference,
                exposure,
            );
        }

        self.updated_at = Utc::now();
    }
}

fn mean_abs<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v.abs();
        count += 1;
    }
    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}

fn blend(old: f64, sample: f64) -> f64 {
    ((1.0 - EWMA_ALPHA) * old + EWMA_ALPHA * sample).clamp(0.0, 2.0)
}

/// In-memory profile store keyed by user id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileStore {
    profiles: HashMap<String, BehavioralProfile>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_profiles(profiles: Vec<BehavioralProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|p| (p.user_id.clone(), p))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, user_id: &str) -> Option<&BehavioralProfile> {
        self.profiles.get(user_id)
    }

    pub fn get_mut(&mut self, user_id: &str) -> Option<&mut BehavioralProfile> {
        self.profiles.get_mut(user_id)
    }

    pub fn insert(&mut self, profile: BehavioralProfile) {
        self.profiles.insert(profile.user_id.clone(), profile);
    }

    pub fn profiles(&self) -> impl Iterator<Item = &BehavioralProfile> {
        self.profiles.values()
    }

    pub fn snapshot(&self) -> Vec<BehavioralProfile> {
        let mut all: Vec<_> = self.profiles.values().cloned().collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        all
    }

    /// Mean of per-user average stakes, across users with betting history.
    pub fn population_average_stake(&self) -> Decimal {
        let mut sum = Decimal::ZERO;
        let mut count = 0u32;
        for profile in self.profiles.values() {
            if profile.betting_behavior.total_bets > 0 {
                sum += profile.betting_behavior.average_stake;
                count += 1;
            }
        }
        if count > 0 {
            sum / Decimal::from(count)
        } else {
            Decimal::ZERO
        }
    }

    /// Fold one resolved bet into the user's profile, creating the profile
    /// on first sight. Pending bets carry no outcome and are rejected.
    pub fn update_profile(
        &mut self,
        user_id: &str,
        bet: &Bet,
        prediction: &Prediction,
    ) -> Result<()> {
        if bet.status == BetStatus::Pending {
            return Err(EngineError::InvalidBetState(format!(
                "bet {} is unresolved and cannot update a profile",
                bet.id
            )));
        }
        let profile = self
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| BehavioralProfile::new(user_id));
        profile.apply_resolution(bet, prediction);
        Ok(())
    }
}
