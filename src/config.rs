//! Engine configuration.
//!
//! Layered load: TOML file (optional) then `ENGINE__*` environment
//! overrides. Every field has a default so an empty config is runnable.

use crate::error::{EngineError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Opening bankroll, in account currency.
    pub initial_bankroll: Decimal,
    pub decision: DecisionConfig,
    pub risk: RiskConfig,
    pub clustering: ClusterConfig,
    pub automation: AutomationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_bankroll: dec!(1000),
            decision: DecisionConfig::default(),
            risk: RiskConfig::default(),
            clustering: ClusterConfig::default(),
            automation: AutomationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file plus `ENGINE__*` env overrides.
    /// A missing file is not an error; defaults apply.
    pub fn load(path: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(path).to_string();
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&expanded).required(false))
            .add_source(
                config::Environment::with_prefix("ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let cfg: EngineConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_bankroll < Decimal::ZERO {
            return Err(EngineError::Config(
                "initial_bankroll must be non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.decision.min_confidence) {
            return Err(EngineError::Config(
                "decision.min_confidence must be in [0, 1]".into(),
            ));
        }
        if self.risk.max_bankroll_pct <= 0.0 || self.risk.max_bankroll_pct > 1.0 {
            return Err(EngineError::Config(
                "risk.max_bankroll_pct must be in (0, 1]".into(),
            ));
        }
        if self.risk.min_bankroll_pct > self.risk.max_bankroll_pct {
            return Err(EngineError::Config(
                "risk.min_bankroll_pct must not exceed risk.max_bankroll_pct".into(),
            ));
        }
        if self.clustering.max_clusters == 0 || self.clustering.min_cluster_size == 0 {
            return Err(EngineError::Config(
                "clustering sizes must be positive".into(),
            ));
        }
        if self.automation.tick_interval_secs == 0 {
            return Err(EngineError::Config(
                "automation.tick_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Decision core settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Predictions below this confidence produce no decision.
    pub min_confidence: f64,
    /// Prediction cache time-to-live, in milliseconds.
    pub cache_ttl_ms: u64,
    /// Fraction of the Kelly stake actually recommended per decision.
    pub bankroll_percentage: f64,
    /// Hard cap on a single recommendation, as a fraction of bankroll.
    pub max_risk_per_bet: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.60,
            cache_ttl_ms: 300_000,
            bankroll_percentage: 0.02,
            max_risk_per_bet: 0.05,
        }
    }
}

impl DecisionConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Risk evaluator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Fractional Kelly multiplier applied to the raw criterion.
    pub kelly_fraction: f64,
    /// Single-bet ceiling as a fraction of current bankroll.
    pub max_bankroll_pct: f64,
    /// Stake fraction at or below which a bet can qualify as low risk.
    pub min_bankroll_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            kelly_fraction: 0.5,
            max_bankroll_pct: 0.05,
            min_bankroll_pct: 0.01,
        }
    }
}

/// Personalization clusterer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Profiles per cluster used to derive k.
    pub min_cluster_size: usize,
    pub max_clusters: usize,
    /// Lloyd iteration bound; non-convergence is best-effort, not an error.
    pub max_iterations: usize,
    /// Seed for centroid initialization, for reproducible passes.
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 10,
            max_clusters: 5,
            max_iterations: 100,
            seed: 42,
        }
    }
}

/// Automation orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Profile the automated loop bets on behalf of.
    pub user_id: String,
    pub tick_interval_secs: u64,
    /// Timeout for each external provider call within a tick.
    pub provider_timeout_ms: u64,
    /// Auto-stop once current bankroll falls to initial * (1 - stop_loss_pct).
    pub stop_loss_pct: f64,
    /// Auto-stop once current bankroll reaches initial * (1 + take_profit_pct).
    pub take_profit_pct: f64,
    /// Minimum decision confidence for automated placement.
    pub bet_confidence: f64,
    /// Where profiles are persisted between runs. None disables persistence.
    pub profile_store_path: Option<String>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            user_id: "primary".to_string(),
            tick_interval_secs: 300,
            provider_timeout_ms: 5_000,
            stop_loss_pct: 0.25,
            take_profit_pct: 0.50,
            bet_confidence: 0.7,
            profile_store_path: None,
        }
    }
}

impl AutomationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}
