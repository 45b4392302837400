//! Bankroll ledger: append-only transaction log.
//!
//! The log is the source of truth. Balance and statistics are folds over
//! the transactions; there are no hidden mutable counters. Transactions are
//! never mutated after creation.

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Bet,
    Win,
    Loss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
}

impl Transaction {
    fn new(kind: TransactionKind, amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            amount,
            timestamp: Utc::now(),
            status: TransactionStatus::Completed,
        }
    }

    /// Contribution of this transaction to the balance. Losses contribute
    /// zero: the stake already left the balance at placement.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionKind::Deposit | TransactionKind::Win => self.amount,
            TransactionKind::Withdrawal | TransactionKind::Bet => -self.amount,
            TransactionKind::Loss => Decimal::ZERO,
        }
    }
}

/// Statistics folded from the transaction log alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    /// Win payouts minus bet stakes.
    pub net_profit: Decimal,
    pub win_rate: f64,
    pub average_bet_size: Decimal,
    /// Largest single win payout seen in the log.
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    /// Positive for a run of wins, negative for a run of losses.
    pub current_streak: i32,
    pub best_streak: u32,
    pub worst_streak: u32,
}

/// Append-only bankroll ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankrollLedger {
    initial: Decimal,
    transactions: Vec<Transaction>,
}

impl BankrollLedger {
    pub fn new(initial: Decimal) -> Self {
        Self {
            initial,
            transactions: Vec::new(),
        }
    }

    pub fn initial(&self) -> Decimal {
        self.initial
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Current balance: initial plus the signed sum of the log.
    pub fn balance(&self) -> Decimal {
        self.initial
            + self
                .transactions
                .iter()
                .map(Transaction::signed_amount)
                .sum::<Decimal>()
    }

    pub fn total_deposits(&self) -> Decimal {
        self.transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Deposit)
            .map(|t| t.amount)
            .sum()
    }

    pub fn deposit(&mut self, amount: Decimal) -> Result<Transaction> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::Internal(
                "deposit amount must be positive".into(),
            ));
        }
        let tx = Transaction::new(TransactionKind::Deposit, amount);
        info!(%amount, balance = %(self.balance() + amount), "deposit");
        self.transactions.push(tx.clone());
        Ok(tx)
    }

    pub fn withdraw(&mut self, amount: Decimal) -> Result<Transaction> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::Internal(
                "withdrawal amount must be positive".into(),
            ));
        }
        let available = self.balance();
        if amount > available {
            return Err(EngineError::InsufficientFunds {
                requested: amount,
                available,
            });
        }
        let tx = Transaction::new(TransactionKind::Withdrawal, amount);
        info!(%amount, balance = %(available - amount), "withdrawal");
        self.transactions.push(tx.clone());
        Ok(tx)
    }

    /// Records a stake leaving the balance. The funds check here is the
    /// ledger's own guard; callers are expected to have validated already.
    pub fn record_bet(&mut self, stake: Decimal) -> Result<Transaction> {
        if stake <= Decimal::ZERO {
            return Err(EngineError::Internal("stake must be positive".into()));
        }
        let available = self.balance();
        if stake > available {
            return Err(EngineError::InsufficientFunds {
                requested: stake,
                available,
            });
        }
        let tx = Transaction::new(TransactionKind::Bet, stake);
        debug!(%stake, "bet recorded");
        self.transactions.push(tx.clone());
        Ok(tx)
    }

    pub fn record_win(&mut self, payout: Decimal) -> Transaction {
        let tx = Transaction::new(TransactionKind::Win, payout);
        debug!(%payout, "win recorded");
        self.transactions.push(tx.clone());
        tx
    }

    pub fn record_loss(&mut self, stake: Decimal) -> Transaction {
        let tx = Transaction::new(TransactionKind::Loss, stake);
        debug!(%stake, "loss recorded");
        self.transactions.push(tx.clone());
        tx
    }

    /// Clears the log and starts over from a fresh initial balance.
    pub fn reset(&mut self, initial: Decimal) {
        info!(%initial, "ledger reset");
        self.initial = initial;
        self.transactions.clear();
    }

    /// Pure fold over the log; recomputable at any time.
    pub fn stats(&self) -> LedgerStats {
        let mut total_deposits = Decimal::ZERO;
        let mut total_withdrawals = Decimal::ZERO;
        let mut total_staked = Decimal::ZERO;
        let mut total_payouts = Decimal::ZERO;
        let mut bet_count = 0u32;
        let mut wins = 0u32;
        let mut losses = 0u32;
        let mut largest_win = Decimal::ZERO;
        let mut largest_loss = Decimal::ZERO;
        let mut current_streak = 0i32;
        let mut best_streak = 0u32;
        let mut worst_streak = 0u32;

        for tx in &self.transactions {
            match tx.kind {
                TransactionKind::Deposit => total_deposits += tx.amount,
                TransactionKind::Withdrawal => total_withdrawals += tx.amount,
                TransactionKind::Bet => {
                    total_staked += tx.amount;
                    bet_count += 1;
                }
                TransactionKind::Win => {
                    wins += 1;
                    total_payouts += tx.amount;
                    largest_win = largest_win.max(tx.amount);
                    current_streak = if current_streak > 0 {
                        current_streak + 1
                    } else {
                        1
                    };
                    best_streak = best_streak.max(current_streak as u32);
                }
                TransactionKind::Loss => {
                    losses += 1;
                    largest_loss = largest_loss.max(tx.amount);
                    current_streak = if current_streak < 0 {
                        current_streak - 1
                    } else {
                        -1
                    };
                    worst_streak = worst_streak.max(current_streak.unsigned_abs());
                }
            }
        }

        let resolved = wins + losses;
        LedgerStats {
            total_deposits,
            total_withdrawals,
            net_profit: total_payouts - total_staked,
            win_rate: if resolved > 0 {
                f64::from(wins) / f64::from(resolved)
            } else {
                0.0
            },
            average_bet_size: if bet_count > 0 {
                total_staked / Decimal::from(bet_count)
            } else {
                Decimal::ZERO
            },
            largest_win,
            largest_loss,
            current_streak,
            best_streak,
            worst_streak,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn balance_is_initial_plus_signed_sum() {
        let mut ledger = BankrollLedger::new(dec!(100));
        ledger.deposit(dec!(50)).unwrap();
        ledger.record_bet(dec!(30)).unwrap();
        ledger.record_win(dec!(75));
        ledger.withdraw(dec!(20)).unwrap();

        assert_eq!(ledger.balance(), dec!(175));

        let signed: Decimal = ledger
            .transactions()
            .iter()
            .map(Transaction::signed_amount)
            .sum();
        assert_eq!(ledger.balance(), ledger.initial() + signed);
    }

    #[test]
    fn withdrawal_beyond_balance_is_rejected() {
        let mut ledger = BankrollLedger::new(dec!(100));
        let err = ledger.withdraw(dec!(101)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientFunds { requested, available }
                if requested == dec!(101) && available == dec!(100)
        ));
        // Rejected operations leave no trace in the log.
        assert!(ledger.transactions().is_empty());
    }

    #[test]
    fn losses_do_not_move_the_balance() {
        let mut ledger = BankrollLedger::new(dec!(100));
        ledger.record_bet(dec!(40)).unwrap();
        assert_eq!(ledger.balance(), dec!(60));
        ledger.record_loss(dec!(40));
        assert_eq!(ledger.balance(), dec!(60));
    }

    #[test]
    fn stats_fold_matches_history() {
        let mut ledger = BankrollLedger::new(dec!(0));
        ledger.deposit(dec!(1000)).unwrap();
        ledger.record_bet(dec!(50)).unwrap();
        ledger.record_win(dec!(125));
        ledger.record_bet(dec!(100)).unwrap();
        ledger.record_loss(dec!(100));
        ledger.record_bet(dec!(50)).unwrap();
        ledger.record_win(dec!(90));
        ledger.withdraw(dec!(15)).unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.total_deposits, dec!(1000));
        assert_eq!(stats.total_withdrawals, dec!(15));
        assert_eq!(stats.net_profit, dec!(15));
        assert!((stats.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(stats.average_bet_size, dec!(200) / dec!(3));
        assert_eq!(stats.largest_win, dec!(125));
        assert_eq!(stats.largest_loss, dec!(100));
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.best_streak, 1);
        assert_eq!(stats.worst_streak, 1);
    }

    #[test]
    fn streak_fold_tracks_runs() {
        let mut ledger = BankrollLedger::new(dec!(1000));
        for won in [true, true, false, false, false, true] {
            ledger.record_bet(dec!(10)).unwrap();
            if won {
                ledger.record_win(dec!(20));
            } else {
                ledger.record_loss(dec!(10));
            }
        }

        let stats = ledger.stats();
        assert_eq!(stats.best_streak, 2);
        assert_eq!(stats.worst_streak, 3);
        assert_eq!(stats.current_streak, 1);
    }

    #[test]
    fn reset_clears_the_log() {
        let mut ledger = BankrollLedger::new(dec!(500));
        ledger.record_bet(dec!(100)).unwrap();
        ledger.reset(dec!(1000));
        assert_eq!(ledger.balance(), dec!(1000));
        assert!(ledger.transactions().is_empty());
        assert_eq!(ledger.stats().net_profit, Decimal::ZERO);
    }
}
