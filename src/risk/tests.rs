//! Unit tests for the risk module.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::RiskConfig;
    use crate::types::Prediction;
    use std::collections::HashMap;

    fn make_prediction(confidence: f64) -> Prediction {
        Prediction {
            event_id: "evt-1".into(),
            model_id: "model-a".into(),
            confidence,
            predicted_value: 24.5,
            recommended_stake: None,
            factors: Vec::new(),
            market_factors: HashMap::new(),
            temporal_factors: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    fn make_evaluator(initial: Decimal) -> RiskEvaluator {
        RiskEvaluator::new(RiskConfig::default(), initial)
    }

    fn straight(amount: Decimal, odds: Decimal) -> BetRequest {
        BetRequest {
            recommendation_id: "rec-1".into(),
            amount,
            kind: BetType::Straight,
            odds,
        }
    }

    #[test]
    fn kelly_reference_point() {
        // p = 0.6 at even odds must give a 20% full-Kelly fraction.
        assert!((kelly_fraction(0.6, 1.0) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn kelly_without_edge_is_not_positive() {
        assert_eq!(kelly_fraction(0.5, 1.0), 0.0);
        assert!(kelly_fraction(0.4, 1.0) < 0.0);
        assert_eq!(kelly_fraction(0.9, 0.0), 0.0);
    }

    #[test]
    fn edge_is_probability_over_implied() {
        assert!((edge(0.6, 2.0) - 0.1).abs() < 1e-9);
        assert!(edge(0.3, 2.0) < 0.0);
        assert!(edge(0.9, 0.0) <= 0.0);
    }

    #[test]
    fn negative_kelly_zeroes_stake_and_flags_high() {
        let evaluator = make_evaluator(dec!(1000));
        let metrics = evaluator.evaluate(&make_prediction(0.4), dec!(1.5));

        assert!(metrics.kelly_criterion < 0.0);
        assert_eq!(metrics.recommended_stake, Decimal::ZERO);
        assert_eq!(metrics.risk_level, RiskLevel::High);
        assert_eq!(metrics.expected_value, Decimal::ZERO);
        assert_eq!(metrics.sharpe_ratio, Decimal::ZERO);
    }

    #[test]
    fn recommended_stake_never_exceeds_five_percent() {
        let evaluator = make_evaluator(dec!(1000));
        let ceiling = dec!(1000) * dec!(0.05);

        for confidence in [0.55, 0.65, 0.75, 0.85, 0.95] {
            for odds in [dec!(1.2), dec!(2.0), dec!(3.5), dec!(10.0)] {
                let metrics = evaluator.evaluate(&make_prediction(confidence), odds);
                assert!(
                    metrics.recommended_stake <= ceiling,
                    "stake {} above ceiling for conf {confidence} odds {odds}",
                    metrics.recommended_stake
                );
                assert!(metrics.recommended_stake <= metrics.max_stake);
                assert_eq!(metrics.max_stake, ceiling);
            }
        }
    }

    #[test]
    fn proposed_stake_is_capped_at_ceiling() {
        let evaluator = make_evaluator(dec!(1000));
        let metrics = evaluator.evaluate_stake(&make_prediction(0.7), dec!(2.0), dec!(500));
        assert_eq!(metrics.recommended_stake, dec!(50));
    }

    #[test]
    fn tiering_first_match() {
        let evaluator = make_evaluator(dec!(1000));

        // 0.8% of bankroll, high confidence, edge 0.225.
        let low = evaluator.evaluate_stake(&make_prediction(0.85), dec!(1.6), dec!(8));
        assert_eq!(low.risk_level, RiskLevel::Low);

        // Kelly-sized stake lands on the 5% cap; edge 0.094.
        let medium = evaluator.evaluate(&make_prediction(0.65), dec!(1.8));
        assert_eq!(medium.risk_level, RiskLevel::Medium);

        // Edge 0.032 clears neither tier.
        let high = evaluator.evaluate(&make_prediction(0.62), dec!(1.7));
        assert_eq!(high.risk_level, RiskLevel::High);
    }

    #[test]
    fn expected_value_variance_and_sharpe() {
        let evaluator = make_evaluator(dec!(1000));
        let metrics = evaluator.evaluate_stake(&make_prediction(0.6), dec!(2.5), dec!(50));

        // win 75, loss 50: ev = 0.6*75 - 0.4*50 = 25
        assert_eq!(metrics.expected_value, dec!(25));
        // var = 0.6*(75-25)^2 + 0.4*(-50-25)^2 = 3750
        assert_eq!(metrics.variance, dec!(3750));
        // sharpe = 25 / sqrt(3750)
        assert!((metrics.sharpe_ratio - dec!(0.408248)).abs() < dec!(0.000001));
    }

    #[test]
    fn rejected_placement_leaves_no_trace() {
        let mut evaluator = make_evaluator(dec!(100));
        let err = evaluator
            .place_bet(straight(dec!(150), dec!(2.0)))
            .unwrap_err();

        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
        assert!(evaluator.bets().is_empty());
        assert_eq!(evaluator.bankroll().current, dec!(100));
        assert!(evaluator.ledger().transactions().is_empty());
    }

    #[test]
    fn deposit_bet_and_win_flow() {
        let mut evaluator = make_evaluator(Decimal::ZERO);
        evaluator.deposit(dec!(1000)).unwrap();

        let bet = evaluator.place_bet(straight(dec!(50), dec!(2.5))).unwrap();
        assert_eq!(evaluator.bankroll().current, dec!(950));

        let resolved = evaluator.resolve_bet(bet.id, true).unwrap();
        assert_eq!(resolved.status, BetStatus::Won);
        assert_eq!(resolved.payout, Some(dec!(125)));

        let bankroll = evaluator.bankroll();
        assert_eq!(bankroll.current, dec!(1075));
        assert_eq!(bankroll.total_profit, dec!(75));
        assert_eq!(bankroll.roi, dec!(7.5));
        assert_eq!(bankroll.winning_bets, 1);
        assert_eq!(bankroll.current, evaluator.ledger().balance());
    }

    #[test]
    fn resolution_is_single_shot() {
        let mut evaluator = make_evaluator(dec!(1000));
        let bet = evaluator.place_bet(straight(dec!(10), dec!(2.0))).unwrap();

        evaluator.resolve_bet(bet.id, false).unwrap();
        let err = evaluator.resolve_bet(bet.id, true).unwrap_err();
        assert!(matches!(err, EngineError::InvalidBetState(_)));

        let err = evaluator.resolve_bet(Uuid::new_v4(), true).unwrap_err();
        assert!(matches!(err, EngineError::InvalidBetState(_)));
    }

    #[test]
    fn streaks_follow_outcome_runs() {
        let mut evaluator = make_evaluator(dec!(1000));
        for won in [true, true, false, true] {
            let bet = evaluator.place_bet(straight(dec!(10), dec!(2.0))).unwrap();
            evaluator.resolve_bet(bet.id, won).unwrap();
        }

        let bankroll = evaluator.bankroll();
        assert_eq!(bankroll.win_streak, 2);
        assert_eq!(bankroll.loss_streak, 1);
        assert_eq!(bankroll.current_streak, 1);
        assert_eq!(bankroll.current_streak_type, Some(StreakType::Win));
    }

    #[test]
    fn reset_restores_a_fresh_state() {
        let mut evaluator = make_evaluator(dec!(500));
        let bet = evaluator.place_bet(straight(dec!(100), dec!(3.0))).unwrap();
        evaluator.resolve_bet(bet.id, true).unwrap();

        evaluator.reset_bankroll(dec!(1000));

        let bankroll = evaluator.bankroll();
        assert_eq!(bankroll.current, dec!(1000));
        assert_eq!(bankroll.total_bets, 0);
        assert_eq!(bankroll.roi, Decimal::ZERO);
        assert!(evaluator.bets().is_empty());
        assert!(evaluator.ledger().transactions().is_empty());
    }

    #[test]
    fn balance_conservation_across_mixed_operations() {
        let mut evaluator = make_evaluator(dec!(250));
        let conserve = |e: &RiskEvaluator| assert_eq!(e.bankroll().current, e.ledger().balance());

        evaluator.deposit(dec!(750)).unwrap();
        conserve(&evaluator);
        evaluator.withdraw(dec!(100)).unwrap();
        conserve(&evaluator);

        let winner = evaluator.place_bet(straight(dec!(40), dec!(3.0))).unwrap();
        conserve(&evaluator);
        let loser = evaluator.place_bet(straight(dec!(60), dec!(1.8))).unwrap();
        conserve(&evaluator);

        evaluator.resolve_bet(winner.id, true).unwrap();
        conserve(&evaluator);
        evaluator.resolve_bet(loser.id, false).unwrap();
        conserve(&evaluator);

        // 250 + 750 - 100 - 40 - 60 + 120
        assert_eq!(evaluator.bankroll().current, dec!(920));
    }

    #[test]
    fn average_and_largest_bet_tracking() {
        let mut evaluator = make_evaluator(dec!(1000));
        for amount in [dec!(10), dec!(20), dec!(30)] {
            evaluator.place_bet(straight(amount, dec!(2.0))).unwrap();
        }

        let bankroll = evaluator.bankroll();
        assert_eq!(bankroll.average_bet_size, dec!(20));
        assert_eq!(bankroll.largest_bet, dec!(30));
        assert_eq!(bankroll.total_bets, 3);
    }
}
