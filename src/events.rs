//! Typed engine events and the subscription bus.
//!
//! Consumers register plain callbacks; there is no emitter inheritance and
//! no global bus. The orchestrator owns the instance and shares it with the
//! components that emit.

use crate::decision::DecisionMetrics;
use crate::risk::RiskMetrics;
use crate::types::BettingDecision;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;

/// Events emitted by the engine while it runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    NewDecision(BettingDecision),
    MetricsUpdated(DecisionMetrics),
    HighRisk {
        event_id: String,
        metrics: RiskMetrics,
    },
    StopLoss {
        current: Decimal,
        threshold: Decimal,
    },
    TakeProfit {
        current: Decimal,
        threshold: Decimal,
    },
    Error {
        source: String,
        message: String,
    },
}

type EventCallback = Box<dyn Fn(&EngineEvent) + Send + Sync>;

/// Synchronous fan-out bus. Callbacks run inline on the emitting task;
/// they must be cheap and non-blocking.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<EventCallback>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Box::new(callback));
    }

    pub fn emit(&self, event: EngineEvent) {
        for callback in self.subscribers.read().iter() {
            callback(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fans_out_to_all_subscribers() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            bus.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.emit(EngineEvent::Error {
            source: "test".into(),
            message: "boom".into(),
        });

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(bus.subscriber_count(), 3);
    }

    #[test]
    fn emit_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.emit(EngineEvent::StopLoss {
            current: Decimal::ZERO,
            threshold: Decimal::ZERO,
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = EngineEvent::Error {
            source: "provider".into(),
            message: "unreachable".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["source"], "provider");
    }
}
