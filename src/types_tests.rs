//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    #[test]
    fn test_implied_probability() {
        let state = create_market_state(dec!(2.5));
        assert!((state.implied_probability() - 0.4).abs() < 1e-9);

        let state = create_market_state(dec!(1.25));
        assert!((state.implied_probability() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_implied_probability_degenerate_odds() {
        // Odds at or below even money carry no payout; treat as certainty.
        let state = create_market_state(dec!(1));
        assert_eq!(state.implied_probability(), 1.0);

        let state = create_market_state(dec!(0.5));
        assert_eq!(state.implied_probability(), 1.0);
    }

    #[test]
    fn test_cache_key_format() {
        let context = create_context("jokic", "rebounds");
        assert_eq!(context.cache_key(), "jokic:rebounds");
    }

    #[test]
    fn test_cache_key_ignores_market_state() {
        let mut a = create_context("doncic", "points");
        let mut b = create_context("doncic", "points");
        a.market_state.odds = dec!(1.8);
        b.market_state.odds = dec!(3.4);
        b.market_state.volatility = 0.9;

        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_win_probability_clamps_confidence() {
        let prediction = create_prediction(0.75);
        assert_eq!(prediction.win_probability(), 0.75);

        let prediction = create_prediction(1.7);
        assert_eq!(prediction.win_probability(), 1.0);

        let prediction = create_prediction(-0.2);
        assert_eq!(prediction.win_probability(), 0.0);
    }

    #[test]
    fn test_prediction_serialization() {
        let prediction = create_prediction(0.82);
        let json = serde_json::to_string(&prediction).unwrap();

        assert!(json.contains("\"event_id\":\"evt-1\""));
        assert!(json.contains("\"model_id\":\"model-a\""));
        assert!(json.contains("\"confidence\":0.82"));

        let parsed: Prediction = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, prediction);
    }

    #[test]
    fn test_decision_holds_its_inputs() {
        let context = create_context("tatum", "threes");
        let prediction = create_prediction(0.7);
        let decision = BettingDecision {
            confidence: prediction.confidence,
            recommended_stake: dec!(0.014),
            factors: prediction.factors.clone(),
            prediction: prediction.clone(),
            timestamp: Utc::now(),
            context: context.clone(),
        };

        assert_eq!(decision.confidence, 0.7);
        assert_eq!(decision.recommended_stake, dec!(0.014));
        assert_eq!(decision.prediction, prediction);
        assert_eq!(decision.context.cache_key(), "tatum:threes");
    }

    #[test]
    fn test_factor_weights_are_plain_data() {
        let factor = Factor {
            name: "recent_form".to_string(),
            weight: 0.6,
            value: 0.85,
        };
        let json = serde_json::to_string(&factor).unwrap();
        let parsed: Factor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, factor);
    }

    // Helper functions

    fn create_market_state(odds: Decimal) -> MarketState {
        MarketState {
            odds,
            volatility: 0.3,
            momentum: 0.1,
            liquidity: 0.8,
        }
    }

    fn create_context(player_id: &str, metric: &str) -> DecisionContext {
        DecisionContext {
            player_id: player_id.to_string(),
            metric: metric.to_string(),
            market_state: create_market_state(dec!(1.9)),
            correlation_factors: HashMap::new(),
        }
    }

    fn create_prediction(confidence: f64) -> Prediction {
        Prediction {
            event_id: "evt-1".to_string(),
            model_id: "model-a".to_string(),
            confidence,
            predicted_value: 27.4,
            recommended_stake: None,
            factors: vec![Factor {
                name: "form".to_string(),
                weight: 1.0,
                value: 0.5,
            }],
            market_factors: HashMap::new(),
            temporal_factors: HashMap::new(),
            timestamp: Utc::now(),
        }
    }
}
