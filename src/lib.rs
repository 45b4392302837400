//! Personalized Betting Risk & Decision Engine
//!
//! A Rust engine that turns model predictions about sports prop markets into
//! sized, risk-classified bets, personalized per bettor profile.
//!
//! ## Architecture
//!
//! ```text
//! Provider (predictions/markets) → Decision Core → Risk Evaluator → Ledger
//!                                        ↑               ↑
//!                         Personalizer (profiles, clustering)
//!                                        ↑
//!              Automation Loop (ticks, outcome feed, stop-loss/take-profit)
//! ```
//!
//! Every stage publishes `EngineEvent`s on a shared bus; the CLI and any
//! notification sink subscribe rather than polling engine state.

pub mod automation;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod personalize;
pub mod providers;
pub mod risk;
pub mod sim;
pub mod types;

#[cfg(test)]
mod types_tests;
