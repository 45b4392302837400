//! Automated betting loop.
//!
//! Drives the full pipeline on a fixed interval: fetch market data, settle
//! open bets through the outcome feed, refresh behavioral clusters, analyze
//! each event, and place the bets that clear the risk gate. Stop-loss and
//! take-profit guards shut the loop down when the bankroll drifts too far
//! from its starting point.


use crate::config::AutomationConfig;
use crate::engine::EngineContext;
use crate::error::{EngineError, Result};
use crate::events::EngineEvent;
use crate::personalize::Personalizer;
use crate::providers::{
    MarketEvent, NotificationKind, NotificationSink, OutcomeFeed, PredictionProvider,
    ProfileRepository,
};
use crate::risk::{BetRequest, BetType, RiskLevel, RiskMetrics};
use crate::types::Prediction;
use parking_lot::{Mutex, RwLock};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle of the loop. `Starting` only exists inside `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Starting => write!(f, "starting"),
            EngineState::Running => write!(f, "running"),
        }
    }
}

/// Bet placed by the loop, kept until the outcome feed settles it. The
/// prediction is the personalized one that drove the placement; it feeds the
/// profile update on resolution.
#[derive(Debug, Clone)]
struct OpenBet {
    bet_id: Uuid,
    prediction: Prediction,
}

/// Periodic orchestrator over the engine context.
pub struct AutomationEngine {
    ctx: EngineContext,
    config: AutomationConfig,
    provider: Arc<dyn PredictionProvider>,
    outcomes: Arc<dyn OutcomeFeed>,
    notifier: Arc<dyn NotificationSink>,
    repository: Option<Arc<dyn ProfileRepository>>,
    state: RwLock<EngineState>,
    /// Unsettled bets keyed by market event id. Ordered so settlement
    /// passes replay identically for a given seed.
    open_bets: Mutex<BTreeMap<String, OpenBet>>,
    shutdown: watch::Sender<bool>,
    ticks: AtomicU64,
}

impl AutomationEngine {
    pub fn new(
        ctx: EngineContext,
        provider: Arc<dyn PredictionProvider>,
        outcomes: Arc<dyn OutcomeFeed>,
        notifier: Arc<dyn NotificationSink>,
        repository: Option<Arc<dyn ProfileRepository>>,
    ) -> Self {
        let config = ctx.config.automation.clone();
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx,
            config,
            provider,
            outcomes,
            notifier,
            repository,
            state: RwLock::new(EngineState::Stopped),
            open_bets: Mutex::new(BTreeMap::new()),
            shutdown,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Completed ticks since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn open_bet_count(&self) -> usize {
        self.open_bets.lock().len()
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Initialize collaborators and spawn the tick loop. No-op when already
    /// running; initialization failures leave the engine stopped and
    /// propagate to the caller.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.write();
            if *state != EngineState::Stopped {
                debug!("start requested while already running");
                return Ok(());
            }
            *state = EngineState::Starting;
        }

        if let Err(e) = self.initialize().await {
            *self.state.write() = EngineState::Stopped;
            error!(error = %e, "engine initialization failed");
            return Err(e);
        }

        self.shutdown.send_replace(false);
        *self.state.write() = EngineState::Running;

        let receiver = self.shutdown.subscribe();
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run_loop(receiver).await;
        });

        info!(
            user = %self.config.user_id,
            interval_secs = self.config.tick_interval_secs,
            "automation engine running"
        );
        self.notify(NotificationKind::Success, "Automation engine started", None)
            .await;
        Ok(())
    }

    /// Signal shutdown, persist profiles, and transition to `Stopped`.
    /// Idempotent; an in-flight external fetch is abandoned.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write();
            if *state == EngineState::Stopped {
                return;
            }
            *state = EngineState::Stopped;
        }

        let _ = self.shutdown.send(true);

        if let Some(repo) = &self.repository {
            let snapshot = {
                let personalizer = self.ctx.personalizer.read().await;
                personalizer.store().snapshot()
            };
            if let Err(e) = repo.store(&snapshot).await {
                warn!(error = %e, "profile persistence failed");
            }
        }

        info!("automation engine stopped");
        self.notify(NotificationKind::Info, "Automation engine stopped", None)
            .await;
    }

    async fn initialize(&self) -> Result<()> {
        self.provider
            .initialize()
            .await
            .map_err(|e| EngineError::Initialization(format!("prediction provider: {e}")))?;
        self.outcomes
            .initialize()
            .await
            .map_err(|e| EngineError::Initialization(format!("outcome feed: {e}")))?;

        if let Some(repo) = &self.repository {
            let profiles = repo
                .load()
                .await
                .map_err(|e| EngineError::Initialization(format!("profile repository: {e}")))?;
            if !profiles.is_empty() {
                info!(count = profiles.len(), "loaded persisted profiles");
                let mut personalizer = self.ctx.personalizer.write().await;
                *personalizer =
                    Personalizer::from_profiles(self.ctx.config.clustering.clone(), profiles);
            }
        }
        Ok(())
    }

    async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.tick_interval());

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                result = self.tick() => {
                    if let Err(e) = result {
                        warn!(error = %e, "tick failed");
                        self.notify(
                            NotificationKind::Warning,
                            &format!("Tick failed: {e}"),
                            None,
                        )
                        .await;
                    }
                }
            }
        }
        debug!("automation loop exited");
    }

    /// One pass of the loop. Public so callers can single-step the engine.
    pub async fn tick(&self) -> Result<()> {
        let market = match tokio::time::timeout(
            self.config.provider_timeout(),
            self.provider.market_data(),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::Timeout {
                    operation: "market_data".into(),
                    timeout_ms: self.config.provider_timeout_ms,
                })
            }
        };

        self.resolve_open_bets().await;

        {
            let mut personalizer = self.ctx.personalizer.write().await;
            if personalizer.needs_reclustering() {
                personalizer.perform_clustering();
            }
        }

        for event in &market.events {
            if let Err(e) = self.process_event(event).await {
                warn!(event_id = %event.event_id, error = %e, "event processing failed");
                self.notify(
                    NotificationKind::Warning,
                    &format!("Event {} skipped: {e}", event.event_id),
                    None,
                )
                .await;
            }
        }

        self.check_guards().await;
        self.ticks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Ask the outcome feed about every open bet and settle the decided
    /// ones. Each resolution feeds the bettor's behavioral profile.
    async fn resolve_open_bets(&self) {
        let snapshot: Vec<(String, OpenBet)> = self
            .open_bets
            .lock()
            .iter()
            .map(|(id, open)| (id.clone(), open.clone()))
            .collect();

        for (event_id, open) in snapshot {
            let won = match self.outcomes.outcome_for(&event_id).await {
                Ok(Some(won)) => won,
                Ok(None) => continue,
                Err(e) => {
                    warn!(%event_id, error = %e, "outcome lookup failed");
                    continue;
                }
            };

            let resolved = {
                let mut risk = self.ctx.risk.write().await;
                risk.resolve_bet(open.bet_id, won)
            };
            let bet = match resolved {
                Ok(bet) => bet,
                Err(e) => {
                    // Unknown or already-settled bet: drop it so we stop
                    // asking the feed about it.
                    warn!(%event_id, error = %e, "bet resolution failed");
                    self.open_bets.lock().remove(&event_id);
                    continue;
                }
            };

            {
                let mut personalizer = self.ctx.personalizer.write().await;
                if let Err(e) =
                    personalizer.update_profile(&self.config.user_id, &bet, &open.prediction)
                {
                    warn!(%event_id, error = %e, "profile update failed");
                }
            }
            self.open_bets.lock().remove(&event_id);

            let (kind, message) = if won {
                (
                    NotificationKind::Success,
                    format!("Bet won on {event_id}"),
                )
            } else {
                (NotificationKind::Info, format!("Bet lost on {event_id}"))
            };
            self.notify(kind, &message, None).await;
        }
    }

    /// Analyze one market event and place a bet when it clears the gate.
    async fn process_event(&self, event: &MarketEvent) -> Result<()> {
        if self.open_bets.lock().contains_key(&event.event_id) {
            return Ok(());
        }

        let ctx = event.context();
        let Some(decision) = self.ctx.decisions.analyze(&ctx).await else {
            return Ok(());
        };

        // Carry the sized fraction into the prediction so cluster stake
        // scaling applies to it.
        let mut prediction = decision.prediction.clone();
        prediction.recommended_stake = Some(decision.recommended_stake);

        let personalized = {
            let personalizer = self.ctx.personalizer.read().await;
            personalizer.personalized_prediction(&self.config.user_id, &prediction)
        };
        let fraction = personalized
            .recommended_stake
            .unwrap_or(decision.recommended_stake)
            .max(Decimal::ZERO);

        let metrics = {
            let risk = self.ctx.risk.read().await;
            let proposed = (risk.bankroll().current * fraction).round_dp(2);
            risk.evaluate_stake(&personalized, event.market_state.odds, proposed)
        };

        if metrics.risk_level == RiskLevel::High {
            debug!(event_id = %event.event_id, "high risk, no bet");
            self.ctx.events.emit(EngineEvent::HighRisk {
                event_id: event.event_id.clone(),
                metrics,
            });
            return Ok(());
        }

        if !self.should_place_bet(&metrics, personalized.confidence)
            || metrics.recommended_stake <= Decimal::ZERO
        {
            return Ok(());
        }

        let bet = {
            let mut risk = self.ctx.risk.write().await;
            risk.place_bet(BetRequest {
                recommendation_id: event.event_id.clone(),
                amount: metrics.recommended_stake,
                kind: BetType::Straight,
                odds: event.market_state.odds,
            })?
        };

        info!(event_id = %event.event_id, amount = %bet.amount, odds = %bet.odds, "bet placed");
        self.open_bets.lock().insert(
            event.event_id.clone(),
            OpenBet {
                bet_id: bet.id,
                prediction: personalized,
            },
        );

        self.notify(
            NotificationKind::Info,
            &format!(
                "Placed {} on {} at odds {}",
                bet.amount, event.event_id, bet.odds
            ),
            Some(serde_json::json!({
                "event_id": event.event_id,
                "amount": bet.amount,
                "odds": bet.odds,
            })),
        )
        .await;

        Ok(())
    }

    fn should_place_bet(&self, metrics: &RiskMetrics, confidence: f64) -> bool {
        metrics.risk_level == RiskLevel::Low
            && metrics.expected_value > Decimal::ZERO
            && confidence > self.config.bet_confidence
    }

    /// Stop-loss / take-profit against fractions of the initial bankroll.
    /// A breach emits the event, notifies, and stops the loop.
    async fn check_guards(&self) {
        let (current, initial) = {
            let risk = self.ctx.risk.read().await;
            (risk.bankroll().current, risk.bankroll().initial)
        };
        if initial <= Decimal::ZERO {
            return;
        }

        let floor = initial * (Decimal::ONE - pct(self.config.stop_loss_pct));
        let ceiling = initial * (Decimal::ONE + pct(self.config.take_profit_pct));

        if current <= floor {
            warn!(%current, %floor, "stop-loss breached");
            self.ctx.events.emit(EngineEvent::StopLoss {
                current,
                threshold: floor,
            });
            self.notify(
                NotificationKind::Warning,
                &format!("Stop-loss hit: bankroll {current} at or below {floor}"),
                None,
            )
            .await;
            self.stop().await;
        } else if current >= ceiling {
            info!(%current, %ceiling, "take-profit reached");
            self.ctx.events.emit(EngineEvent::TakeProfit {
                current,
                threshold: ceiling,
            });
            self.notify(
                NotificationKind::Success,
                &format!("Take-profit hit: bankroll {current} at or above {ceiling}"),
                None,
            )
            .await;
            self.stop().await;
        }
    }

    async fn notify(
        &self,
        kind: NotificationKind,
        message: &str,
        data: Option<serde_json::Value>,
    ) {
        if let Err(e) = self.notifier.notify(kind, message, data).await {
            warn!(error = %e, "notification failed");
        }
    }
}

fn pct(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}
