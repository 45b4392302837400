//! Deterministic simulated collaborators.
//!
//! Seeded market, prediction and settlement sources so the binary can run a
//! full betting loop with no external service. The provider draws a true win
//! probability per event, quotes odds around the fair line, and books the
//! eventual outcome; the linked feed replays that outcome after a polling
//! delay. Prediction confidence tracks the booked probability with bounded
//! noise, so edges are real and a paper run behaves like a market.

use crate::error::Result;
use crate::providers::{MarketData, MarketEvent, OutcomeFeed, PredictionProvider};
use crate::types::{DecisionContext, Factor, MarketState, Prediction};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

const PLAYERS: [&str; 6] = [
    "antetokounmpo",
    "doncic",
    "jokic",
    "curry",
    "tatum",
    "gilgeous-alexander",
];
const METRICS: [&str; 4] = ["points", "rebounds", "assists", "threes"];

const EVENTS_PER_TICK: usize = 4;
/// Polls an open event survives before the feed settles it.
const SETTLE_AFTER_POLLS: u32 = 1;
/// Booked outcomes kept around for events nobody bet on.
const BOOK_CAP: usize = 512;

#[derive(Debug)]
struct BookedOutcome {
    won: bool,
    polls_left: u32,
}

#[derive(Debug, Clone)]
struct Truth {
    probability: f64,
    event_id: String,
}

#[derive(Debug, Default)]
struct BookState {
    settlements: HashMap<String, BookedOutcome>,
    order: VecDeque<String>,
    /// Latest booked probability per `player:metric`, so predictions for a
    /// market line up with the outcome already drawn for it.
    truths: HashMap<String, Truth>,
}

#[derive(Debug, Default)]
struct OutcomeBook {
    state: Mutex<BookState>,
}

impl OutcomeBook {
    fn book(&self, event_id: &str, won: bool) {
        let mut state = self.state.lock();
        state.order.push_back(event_id.to_string());
        state.settlements.insert(
            event_id.to_string(),
            BookedOutcome {
                won,
                polls_left: SETTLE_AFTER_POLLS,
            },
        );
        // Events nobody bets on are never polled away; cap the backlog.
        while state.order.len() > BOOK_CAP {
            if let Some(oldest) = state.order.pop_front() {
                state.settlements.remove(&oldest);
            }
        }
    }

    fn remember_truth(&self, player: &str, metric: &str, probability: f64, event_id: &str) {
        self.state.lock().truths.insert(
            format!("{player}:{metric}"),
            Truth {
                probability,
                event_id: event_id.to_string(),
            },
        );
    }

    fn truth_for(&self, key: &str) -> Option<Truth> {
        self.state.lock().truths.get(key).cloned()
    }

    fn poll(&self, event_id: &str) -> Option<bool> {
        let mut state = self.state.lock();
        let settled = match state.settlements.get_mut(event_id) {
            None => return None,
            Some(entry) => {
                if entry.polls_left > 0 {
                    entry.polls_left -= 1;
                    return None;
                }
                entry.won
            }
        };
        state.settlements.remove(event_id);
        Some(settled)
    }
}

/// Seeded stand-in for a real prediction service.
pub struct SimulatedProvider {
    seed: u64,
    rng: Mutex<StdRng>,
    book: Arc<OutcomeBook>,
    counter: AtomicU64,
}

impl SimulatedProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            book: Arc::new(OutcomeBook::default()),
            counter: AtomicU64::new(0),
        }
    }

    /// Feed wired to this provider's outcome book.
    pub fn outcome_feed(&self) -> SimulatedOutcomeFeed {
        SimulatedOutcomeFeed {
            book: Arc::clone(&self.book),
        }
    }
}

#[async_trait]
impl PredictionProvider for SimulatedProvider {
    async fn initialize(&self) -> Result<()> {
        info!(seed = self.seed, "simulated prediction provider ready");
        Ok(())
    }

    async fn generate_prediction(&self, context: &DecisionContext) -> Result<Prediction> {
        let mut rng = self.rng.lock();
        let (probability, event_id) = match self.book.truth_for(&context.cache_key()) {
            Some(truth) => (truth.probability, truth.event_id),
            // Ad hoc analysis of a market the simulator never quoted.
            None => (
                rng.random_range(0.35..0.90),
                format!("adhoc-{}", context.cache_key()),
            ),
        };

        let confidence = (probability + rng.random_range(-0.08..0.08)).clamp(0.05, 0.98);
        let predicted_value = match context.metric.as_str() {
            "points" => rng.random_range(12.0..35.0),
            "rebounds" => rng.random_range(4.0..14.0),
            "assists" => rng.random_range(3.0..12.0),
            _ => rng.random_range(1.0..8.0),
        };

        Ok(Prediction {
            event_id,
            model_id: "sim-v1".to_string(),
            confidence,
            predicted_value,
            recommended_stake: None,
            factors: vec![
                Factor {
                    name: "form".to_string(),
                    weight: 0.6,
                    value: rng.random_range(0.0..1.0),
                },
                Factor {
                    name: "matchup".to_string(),
                    weight: 0.4,
                    value: rng.random_range(0.0..1.0),
                },
            ],
            market_factors: HashMap::from([(
                "volume_shift".to_string(),
                rng.random_range(-0.4..0.4),
            )]),
            temporal_factors: HashMap::from([(
                "rest_days".to_string(),
                rng.random_range(0.0..1.0),
            )]),
            timestamp: Utc::now(),
        })
    }

    async fn market_data(&self) -> Result<MarketData> {
        let mut rng = self.rng.lock();
        let mut events = Vec::with_capacity(EVENTS_PER_TICK);

        for _ in 0..EVENTS_PER_TICK {
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            let event_id = format!("sim-{n:06}");
            let player = PLAYERS[rng.random_range(0..PLAYERS.len())];
            let metric = METRICS[rng.random_range(0..METRICS.len())];
            let probability = rng.random_range(0.35..0.90);

            // Quote around the fair line with a jittered book margin.
            let quoted = (1.0 / probability) * rng.random_range(0.88..1.06);
            let odds = Decimal::from_f64(quoted)
                .unwrap_or(dec!(1.9))
                .round_dp(2)
                .max(dec!(1.01));

            let won = rng.random_bool(probability);
            self.book.book(&event_id, won);
            self.book.remember_truth(player, metric, probability, &event_id);

            events.push(MarketEvent {
                event_id,
                player_id: player.to_string(),
                metric: metric.to_string(),
                market_state: MarketState {
                    odds,
                    volatility: rng.random_range(0.05..0.6),
                    momentum: rng.random_range(-0.5..0.5),
                    liquidity: rng.random_range(0.2..1.0),
                },
                correlation_factors: HashMap::new(),
            });
        }

        Ok(MarketData { events })
    }
}

/// Settlement feed over the provider's booked outcomes.
pub struct SimulatedOutcomeFeed {
    book: Arc<OutcomeBook>,
}

#[async_trait]
impl OutcomeFeed for SimulatedOutcomeFeed {
    async fn outcome_for(&self, event_id: &str) -> Result<Option<bool>> {
        Ok(self.book.poll(event_id))
    }
}
