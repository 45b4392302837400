//! External collaborator interfaces.
//!
//! The engine core is transport-agnostic: predictions, outcomes,
//! notifications and profile persistence arrive through these traits, and
//! the embedding application supplies the implementations.

use crate::error::Result;
use crate::personalize::BehavioralProfile;
use crate::types::{DecisionContext, MarketState, Prediction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// One bettable event in a market snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEvent {
    pub event_id: String,
    pub player_id: String,
    pub metric: String,
    pub market_state: MarketState,
    pub correlation_factors: HashMap<String, f64>,
}

impl MarketEvent {
    pub fn context(&self) -> DecisionContext {
        DecisionContext {
            player_id: self.player_id.clone(),
            metric: self.metric.clone(),
            market_state: self.market_state.clone(),
            correlation_factors: self.correlation_factors.clone(),
        }
    }
}

/// Snapshot of currently bettable events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketData {
    pub events: Vec<MarketEvent>,
}

/// Upstream source of predictions and market snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PredictionProvider: Send + Sync {
    /// Idempotent startup check. Called once per orchestrator start.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn generate_prediction(&self, context: &DecisionContext) -> Result<Prediction>;

    async fn market_data(&self) -> Result<MarketData>;
}

/// Settlement source driving bet resolution.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutcomeFeed: Send + Sync {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// `None` means the event has not settled yet.
    async fn outcome_for(&self, event_id: &str) -> Result<Option<bool>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

/// Outbound notification channel. Failures are logged by callers, never
/// propagated into the engine loop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        kind: NotificationKind,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Result<()>;
}

/// Default sink: structured log lines, no external delivery.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify(
        &self,
        kind: NotificationKind,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Result<()> {
        let data = data.unwrap_or(serde_json::Value::Null);
        match kind {
            NotificationKind::Info | NotificationKind::Success => {
                info!(?kind, %data, "{message}")
            }
            NotificationKind::Warning => warn!(%data, "{message}"),
            NotificationKind::Error => error!(%data, "{message}"),
        }
        Ok(())
    }
}

/// Durable store for behavioral profiles between runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn load(&self) -> Result<Vec<BehavioralProfile>>;

    async fn store(&self, profiles: &[BehavioralProfile]) -> Result<()>;
}

/// File-backed repository: one pretty-printed JSON document per store.
#[derive(Debug, Clone)]
pub struct JsonProfileRepository {
    path: PathBuf,
}

impl JsonProfileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ProfileRepository for JsonProfileRepository {
    async fn load(&self) -> Result<Vec<BehavioralProfile>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn store(&self, profiles: &[BehavioralProfile]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_string_pretty(profiles)?;
        tokio::fs::write(&self.path, raw).await?;
        info!(path = %self.path.display(), count = profiles.len(), "persisted profiles");
        Ok(())
    }
}
