//! Risk evaluation and bet lifecycle.
//!
//! Fractional Kelly sizing with tiered risk classification. Every balance
//! mutation flows through the ledger so the cached bankroll aggregate and
//! the transaction log stay in lockstep.

use crate::config::RiskConfig;
use crate::error::{EngineError, Result};
use crate::ledger::{BankrollLedger, LedgerStats, Transaction};
use crate::types::Prediction;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Tier thresholds for risk classification. First match wins; anything
/// that clears neither bar is high risk.
const LOW_RISK_MIN_CONFIDENCE: f64 = 0.80;
const LOW_RISK_MIN_EDGE: f64 = 0.10;
const MEDIUM_RISK_MIN_CONFIDENCE: f64 = 0.60;
const MEDIUM_RISK_MIN_EDGE: f64 = 0.05;

/// Fraction of bankroll to stake per the Kelly criterion.
///
/// `net_odds` is the net payout per unit staked (decimal odds minus one).
/// A zero or negative result means the edge is gone; callers treat that as
/// "do not bet".
pub fn kelly_fraction(win_prob: f64, net_odds: f64) -> f64 {
    if net_odds <= 0.0 {
        return 0.0;
    }
    let p = win_prob.clamp(0.0, 1.0);
    let q = 1.0 - p;
    (p * net_odds - q) / net_odds
}

/// Model edge over the market: win probability minus implied probability.
pub fn edge(win_prob: f64, decimal_odds: f64) -> f64 {
    let implied = if decimal_odds > 0.0 {
        1.0 / decimal_odds
    } else {
        1.0
    };
    win_prob.clamp(0.0, 1.0) - implied
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Full risk picture for one proposed bet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Raw Kelly criterion before the fractional multiplier.
    pub kelly_criterion: f64,
    pub recommended_stake: Decimal,
    pub max_stake: Decimal,
    pub risk_level: RiskLevel,
    pub edge: f64,
    pub expected_value: Decimal,
    pub variance: Decimal,
    pub sharpe_ratio: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetType {
    Straight,
    Parlay,
    Teaser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: Uuid,
    /// Decision or event this bet was placed against.
    pub recommendation_id: String,
    pub amount: Decimal,
    pub kind: BetType,
    pub odds: Decimal,
    pub timestamp: DateTime<Utc>,
    pub status: BetStatus,
    pub payout: Option<Decimal>,
}

impl Bet {
    pub fn is_pending(&self) -> bool {
        self.status == BetStatus::Pending
    }
}

/// Placement parameters collected by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRequest {
    pub recommendation_id: String,
    pub amount: Decimal,
    pub kind: BetType,
    pub odds: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreakType {
    Win,
    Loss,
}

/// Cached aggregate over bets and transactions, updated on every mutating
/// operation. `current` always equals the ledger balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bankroll {
    pub initial: Decimal,
    pub current: Decimal,
    pub total_bets: u32,
    pub winning_bets: u32,
    pub total_profit: Decimal,
    /// Percentage return on contributed capital (initial plus deposits).
    pub roi: Decimal,
    pub average_bet_size: Decimal,
    pub largest_bet: Decimal,
    /// Largest single net win (payout minus stake).
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub current_streak: u32,
    pub current_streak_type: Option<StreakType>,
    pub win_streak: u32,
    pub loss_streak: u32,
}

impl Bankroll {
    pub fn new(initial: Decimal) -> Self {
        Self {
            initial,
            current: initial,
            total_bets: 0,
            winning_bets: 0,
            total_profit: Decimal::ZERO,
            roi: Decimal::ZERO,
            average_bet_size: Decimal::ZERO,
            largest_bet: Decimal::ZERO,
            largest_win: Decimal::ZERO,
            largest_loss: Decimal::ZERO,
            current_streak: 0,
            current_streak_type: None,
            win_streak: 0,
            loss_streak: 0,
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_bets == 0 {
            return 0.0;
        }
        f64::from(self.winning_bets) / f64::from(self.total_bets)
    }

    fn record_outcome(&mut self, won: bool) {
        let kind = if won { StreakType::Win } else { StreakType::Loss };
        if self.current_streak_type == Some(kind) {
            self.current_streak += 1;
        } else {
            self.current_streak_type = Some(kind);
            self.current_streak = 1;
        }
        match kind {
            StreakType::Win => self.win_streak = self.win_streak.max(self.current_streak),
            StreakType::Loss => self.loss_streak = self.loss_streak.max(self.current_streak),
        }
    }

    fn recompute_roi(&mut self, capital_base: Decimal) {
        self.roi = if capital_base > Decimal::ZERO {
            self.total_profit / capital_base * dec!(100)
        } else {
            Decimal::ZERO
        };
    }
}

/// Sizes, classifies, places and resolves bets against the ledger.
#[derive(Debug, Clone)]
pub struct RiskEvaluator {
    config: RiskConfig,
    ledger: BankrollLedger,
    bankroll: Bankroll,
    bets: Vec<Bet>,
}

impl RiskEvaluator {
    pub fn new(config: RiskConfig, initial: Decimal) -> Self {
        Self {
            config,
            ledger: BankrollLedger::new(initial),
            bankroll: Bankroll::new(initial),
            bets: Vec::new(),
        }
    }

    pub fn bankroll(&self) -> &Bankroll {
        &self.bankroll
    }

    pub fn ledger(&self) -> &BankrollLedger {
        &self.ledger
    }

    pub fn bets(&self) -> &[Bet] {
        &self.bets
    }

    pub fn pending_bets(&self) -> impl Iterator<Item = &Bet> {
        self.bets.iter().filter(|b| b.is_pending())
    }

    pub fn ledger_stats(&self) -> LedgerStats {
        self.ledger.stats()
    }

    /// Single-bet ceiling at the current balance.
    pub fn max_stake(&self) -> Decimal {
        self.bankroll.current * Self::pct(self.config.max_bankroll_pct)
    }

    /// Assess a bet sized by the evaluator itself: fractional Kelly capped
    /// at the bankroll ceiling.
    pub fn evaluate(&self, prediction: &Prediction, odds: Decimal) -> RiskMetrics {
        let kelly = self.kelly_for(prediction, odds);
        let stake = if kelly > 0.0 {
            let frac = (kelly * self.config.kelly_fraction).min(self.config.max_bankroll_pct);
            self.bankroll.current * Self::pct(frac)
        } else {
            Decimal::ZERO
        };
        self.build_metrics(prediction, odds, kelly, stake)
    }

    /// Assess a caller-proposed stake (the automation path: the decision
    /// core proposes, the evaluator classifies). The stake is still capped
    /// at the bankroll ceiling.
    pub fn evaluate_stake(
        &self,
        prediction: &Prediction,
        odds: Decimal,
        stake: Decimal,
    ) -> RiskMetrics {
        let kelly = self.kelly_for(prediction, odds);
        let stake = if kelly > 0.0 {
            stake.max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        self.build_metrics(prediction, odds, kelly, stake)
    }

    fn kelly_for(&self, prediction: &Prediction, odds: Decimal) -> f64 {
        let odds = odds.to_f64().unwrap_or(1.0);
        kelly_fraction(prediction.win_probability(), odds - 1.0)
    }

    fn build_metrics(
        &self,
        prediction: &Prediction,
        odds: Decimal,
        kelly: f64,
        stake: Decimal,
    ) -> RiskMetrics {
        let max_stake = self.max_stake();
        let recommended = stake.min(max_stake);
        let edge = edge(prediction.win_probability(), odds.to_f64().unwrap_or(0.0));
        let confidence = prediction.confidence;

        let stake_frac = if self.bankroll.current > Decimal::ZERO {
            (recommended / self.bankroll.current).to_f64().unwrap_or(1.0)
        } else {
            1.0
        };
        let risk_level = if kelly <= 0.0 {
            RiskLevel::High
        } else if stake_frac <= self.config.min_bankroll_pct
            && confidence >= LOW_RISK_MIN_CONFIDENCE
            && edge >= LOW_RISK_MIN_EDGE
        {
            RiskLevel::Low
        } else if stake_frac <= self.config.max_bankroll_pct
            && confidence >= MEDIUM_RISK_MIN_CONFIDENCE
            && edge >= MEDIUM_RISK_MIN_EDGE
        {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        };

        let p = Decimal::from_f64(prediction.win_probability()).unwrap_or_default();
        let q = Decimal::ONE - p;
        let win_amount = recommended * (odds - Decimal::ONE).max(Decimal::ZERO);
        let loss_amount = recommended;
        let expected_value = p * win_amount - q * loss_amount;
        let dw = win_amount - expected_value;
        let dl = -loss_amount - expected_value;
        let variance = p * dw * dw + q * dl * dl;
        let sharpe_ratio = if variance > Decimal::ZERO {
            expected_value / variance.sqrt().unwrap_or(Decimal::ONE)
        } else {
            Decimal::ZERO
        };

        RiskMetrics {
            kelly_criterion: kelly,
            recommended_stake: recommended,
            max_stake,
            risk_level,
            edge,
            expected_value,
            variance,
            sharpe_ratio,
        }
    }

    /// Place a bet. The funds check happens before any mutation; a rejected
    /// placement leaves ledger, bankroll and bet list untouched.
    pub fn place_bet(&mut self, request: BetRequest) -> Result<Bet> {
        if request.amount <= Decimal::ZERO {
            return Err(EngineError::Internal("bet amount must be positive".into()));
        }
        if request.odds <= Decimal::ONE {
            return Err(EngineError::Internal(
                "decimal odds must be greater than 1".into(),
            ));
        }

        self.ledger.record_bet(request.amount)?;

        let bet = Bet {
            id: Uuid::new_v4(),
            recommendation_id: request.recommendation_id,
            amount: request.amount,
            kind: request.kind,
            odds: request.odds,
            timestamp: Utc::now(),
            status: BetStatus::Pending,
            payout: None,
        };

        self.bankroll.current -= request.amount;
        self.bankroll.total_bets += 1;
        let n = Decimal::from(self.bankroll.total_bets);
        self.bankroll.average_bet_size =
            (self.bankroll.average_bet_size * (n - Decimal::ONE) + request.amount) / n;
        self.bankroll.largest_bet = self.bankroll.largest_bet.max(request.amount);

        info!(
            bet_id = %bet.id,
            recommendation = %bet.recommendation_id,
            amount = %bet.amount,
            odds = %bet.odds,
            "bet placed"
        );
        self.bets.push(bet.clone());
        Ok(bet)
    }

    /// Resolve a pending bet. Unknown ids and repeated resolutions are
    /// rejected without touching any state.
    pub fn resolve_bet(&mut self, bet_id: Uuid, won: bool) -> Result<Bet> {
        let bet = self
            .bets
            .iter_mut()
            .find(|b| b.id == bet_id)
            .ok_or_else(|| EngineError::InvalidBetState(format!("unknown bet {bet_id}")))?;
        if bet.status != BetStatus::Pending {
            return Err(EngineError::InvalidBetState(format!(
                "bet {bet_id} already resolved"
            )));
        }

        if won {
            let payout = bet.amount * bet.odds;
            bet.status = BetStatus::Won;
            bet.payout = Some(payout);
            self.ledger.record_win(payout);
            self.bankroll.current += payout;
            self.bankroll.winning_bets += 1;
            let net = payout - bet.amount;
            self.bankroll.total_profit += net;
            self.bankroll.largest_win = self.bankroll.largest_win.max(net);
            self.bankroll.record_outcome(true);
            debug!(bet_id = %bet_id, %payout, "bet won");
        } else {
            bet.status = BetStatus::Lost;
            self.ledger.record_loss(bet.amount);
            self.bankroll.total_profit -= bet.amount;
            self.bankroll.largest_loss = self.bankroll.largest_loss.max(bet.amount);
            self.bankroll.record_outcome(false);
            debug!(bet_id = %bet_id, stake = %bet.amount, "bet lost");
        }

        let resolved = bet.clone();
        self.bankroll
            .recompute_roi(self.bankroll.initial + self.ledger.total_deposits());
        Ok(resolved)
    }

    /// External funding. Deposits widen the capital base used for ROI.
    pub fn deposit(&mut self, amount: Decimal) -> Result<Transaction> {
        let tx = self.ledger.deposit(amount)?;
        self.bankroll.current += amount;
        self.bankroll
            .recompute_roi(self.bankroll.initial + self.ledger.total_deposits());
        Ok(tx)
    }

    pub fn withdraw(&mut self, amount: Decimal) -> Result<Transaction> {
        let tx = self.ledger.withdraw(amount)?;
        self.bankroll.current -= amount;
        Ok(tx)
    }

    /// Intentional full reset: fresh bankroll, empty bet list, empty log.
    pub fn reset_bankroll(&mut self, initial: Decimal) {
        info!(%initial, "bankroll reset");
        self.bankroll = Bankroll::new(initial);
        self.bets.clear();
        self.ledger.reset(initial);
    }

    fn pct(fraction: f64) -> Decimal {
        Decimal::from_f64(fraction).unwrap_or_default()
    }
}
