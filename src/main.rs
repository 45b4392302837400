//! Personalized Betting Risk & Decision Engine
//!
//! Command-line front end over the engine library, backed by the seeded
//! market simulator so every command runs without external services.

use betting_engine::automation::{AutomationEngine, EngineState};
use betting_engine::config::EngineConfig;
use betting_engine::engine::EngineContext;
use betting_engine::events::EngineEvent;
use betting_engine::providers::{
    JsonProfileRepository, OutcomeFeed, PredictionProvider, ProfileRepository, TracingNotifier,
};
use betting_engine::risk::{BetRequest, BetType, RiskEvaluator};
use betting_engine::sim::SimulatedProvider;
use betting_engine::types::{DecisionContext, MarketState, Prediction};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "betting-engine")]
#[command(about = "Personalized betting risk and decision engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Seed for the simulated market
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the automated betting loop against a simulated market
    Run {
        /// Stop after this many ticks (0 runs until Ctrl-C or a guard fires)
        #[arg(long, default_value = "0")]
        ticks: u64,
        /// Override the configured tick interval
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// One-shot decision for a player metric
    Analyze {
        /// Player to analyze
        #[arg(long)]
        player: String,
        /// Metric to analyze
        #[arg(long, default_value = "points")]
        metric: String,
        /// Quoted decimal odds for the line
        #[arg(long, default_value = "1.9")]
        odds: Decimal,
    },
    /// Drive the risk evaluator through seeded bet cycles
    Simulate {
        /// Number of bet cycles to run
        #[arg(long, default_value = "25")]
        bets: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(&cli.config)?;

    match cli.command {
        Commands::Run {
            ticks,
            interval_secs,
        } => run_engine(config, cli.seed, ticks, interval_secs).await,
        Commands::Analyze {
            player,
            metric,
            odds,
        } => analyze(config, cli.seed, &player, &metric, odds).await,
        Commands::Simulate { bets } => simulate(config, cli.seed, bets).await,
    }
}

async fn run_engine(
    mut config: EngineConfig,
    seed: u64,
    ticks: u64,
    interval_secs: Option<u64>,
) -> anyhow::Result<()> {
    if let Some(secs) = interval_secs {
        config.automation.tick_interval_secs = secs;
    }

    let repository: Option<Arc<dyn ProfileRepository>> =
        config.automation.profile_store_path.as_ref().map(|path| {
            let expanded = shellexpand::tilde(path).to_string();
            Arc::new(JsonProfileRepository::new(expanded)) as Arc<dyn ProfileRepository>
        });

    let sim = Arc::new(SimulatedProvider::new(seed));
    let outcomes: Arc<dyn OutcomeFeed> = Arc::new(sim.outcome_feed());
    let provider: Arc<dyn PredictionProvider> = sim;

    let ctx = EngineContext::new(config, Arc::clone(&provider));
    ctx.events.subscribe(|event| match event {
        EngineEvent::NewDecision(decision) => {
            tracing::info!(
                player = %decision.context.player_id,
                metric = %decision.context.metric,
                confidence = decision.confidence,
                stake_fraction = %decision.recommended_stake,
                "decision"
            );
        }
        EngineEvent::HighRisk { event_id, metrics } => {
            tracing::warn!(
                %event_id,
                kelly = metrics.kelly_criterion,
                edge = metrics.edge,
                "high risk, skipped"
            );
        }
        EngineEvent::StopLoss { current, threshold } => {
            tracing::warn!(%current, %threshold, "stop-loss breached");
        }
        EngineEvent::TakeProfit { current, threshold } => {
            tracing::info!(%current, %threshold, "take-profit reached");
        }
        EngineEvent::Error { source, message } => {
            tracing::warn!(%source, %message, "engine error");
        }
        EngineEvent::MetricsUpdated(_) => {}
    });

    let engine = Arc::new(AutomationEngine::new(
        ctx,
        provider,
        outcomes,
        Arc::new(TracingNotifier),
        repository,
    ));
    engine.start().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, shutting down");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                if engine.state() == EngineState::Stopped {
                    tracing::info!("engine stopped itself, exiting");
                    break;
                }
                if ticks > 0 && engine.ticks() >= ticks {
                    break;
                }
            }
        }
    }
    engine.stop().await;

    let risk = engine.context().risk.read().await;
    let bankroll = risk.bankroll();
    println!("\nRun summary\n");
    println!("Ticks completed:    {}", engine.ticks());
    println!("Initial bankroll:   {:.2}", bankroll.initial);
    println!("Final bankroll:     {:.2}", bankroll.current);
    println!(
        "Bets:               {} placed, {} won",
        bankroll.total_bets, bankroll.winning_bets
    );
    println!("Total profit:       {:.2}", bankroll.total_profit);
    println!("ROI:                {:.2}%", bankroll.roi);
    println!("Open at shutdown:   {}", engine.open_bet_count());

    Ok(())
}

async fn analyze(
    config: EngineConfig,
    seed: u64,
    player: &str,
    metric: &str,
    odds: Decimal,
) -> anyhow::Result<()> {
    let provider: Arc<dyn PredictionProvider> = Arc::new(SimulatedProvider::new(seed));
    let ctx = EngineContext::new(config, provider);

    let context = DecisionContext {
        player_id: player.to_string(),
        metric: metric.to_string(),
        market_state: MarketState {
            odds,
            volatility: 0.3,
            momentum: 0.0,
            liquidity: 0.8,
        },
        correlation_factors: HashMap::new(),
    };

    let Some(decision) = ctx.decisions.analyze(&context).await else {
        println!("No decision: prediction confidence is below the configured floor.");
        return Ok(());
    };

    let risk = ctx.risk.read().await;
    let bankroll = risk.bankroll().current;
    let proposed = (bankroll * decision.recommended_stake).round_dp(2);
    let metrics = risk.evaluate_stake(&decision.prediction, odds, proposed);

    println!("\nDecision for {player} / {metric} at odds {odds}\n");
    println!("Confidence:         {:.1}%", decision.confidence * 100.0);
    println!("Stake fraction:     {}", decision.recommended_stake);
    println!("Proposed stake:     {:.2} of {:.2}", proposed, bankroll);
    println!("Risk level:         {}", metrics.risk_level);
    println!("Kelly criterion:    {:.4}", metrics.kelly_criterion);
    println!("Edge:               {:.4}", metrics.edge);
    println!("Expected value:     {:.2}", metrics.expected_value);
    println!("Sharpe ratio:       {:.4}", metrics.sharpe_ratio);

    Ok(())
}

async fn simulate(config: EngineConfig, seed: u64, bets: usize) -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut evaluator = RiskEvaluator::new(config.risk.clone(), config.initial_bankroll);
    let mut skipped = 0usize;

    for n in 0..bets {
        let probability = rng.random_range(0.40..0.85);
        let quoted = (1.0 / probability) * rng.random_range(0.92..1.10);
        let odds = Decimal::from_f64(quoted)
            .unwrap_or_else(|| Decimal::new(19, 1))
            .round_dp(2)
            .max(Decimal::new(101, 2));

        let prediction = Prediction {
            event_id: format!("cycle-{n}"),
            model_id: "sim-v1".to_string(),
            confidence: (probability + rng.random_range(-0.05..0.05)).clamp(0.05, 0.98),
            predicted_value: rng.random_range(5.0..35.0),
            recommended_stake: None,
            factors: Vec::new(),
            market_factors: HashMap::new(),
            temporal_factors: HashMap::new(),
            timestamp: Utc::now(),
        };

        let metrics = evaluator.evaluate(&prediction, odds);
        if metrics.recommended_stake <= Decimal::ZERO {
            skipped += 1;
            continue;
        }

        let bet = evaluator.place_bet(BetRequest {
            recommendation_id: prediction.event_id.clone(),
            amount: metrics.recommended_stake,
            kind: BetType::Straight,
            odds,
        })?;
        let won = rng.random_bool(probability);
        evaluator.resolve_bet(bet.id, won)?;
    }

    let bankroll = evaluator.bankroll();
    let stats = evaluator.ledger_stats();
    println!("\nSimulation summary ({bets} cycles, {skipped} skipped)\n");
    println!("Initial bankroll:   {:.2}", bankroll.initial);
    println!("Final bankroll:     {:.2}", bankroll.current);
    println!("Bets placed:        {}", bankroll.total_bets);
    println!("Win rate:           {:.1}%", bankroll.win_rate() * 100.0);
    println!("Average bet:        {:.2}", stats.average_bet_size);
    println!("Net profit:         {:.2}", stats.net_profit);
    println!("ROI:                {:.2}%", bankroll.roi);
    println!("Largest win:        {:.2}", stats.largest_win);
    println!("Largest loss:       {:.2}", stats.largest_loss);
    println!("Best streak:        {}", stats.best_streak);
    println!("Worst streak:       {}", stats.worst_streak);

    Ok(())
}
