// ============================================================================
// Event Sink Interface
// Observer hooks for swaps, liquidity changes and order lifecycle
// ============================================================================

use primitive_types::U256;

use crate::domain::coin::{Address, CoinId};
use crate::domain::order::{OrderId, Side};
use crate::domain::pair::PairKey;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Events emitted by the engine. Informational only: consensus state never
/// depends on whether anyone listens.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SwapEvent {
    PairCreated {
        pair: PairKey,
        id: u32,
    },
    Swap {
        pair: PairKey,
        coin_in: CoinId,
        coin_out: CoinId,
        amount_in: U256,
        amount_out: U256,
    },
    LiquidityAdded {
        pair: PairKey,
        amount0: U256,
        amount1: U256,
        minted: U256,
    },
    LiquidityRemoved {
        pair: PairKey,
        amount0: U256,
        amount1: U256,
        burned: U256,
    },
    OrderPlaced {
        id: OrderId,
        pair: PairKey,
        side: Side,
        want_buy: U256,
        want_sell: U256,
        owner: Address,
    },
    OrderFilled {
        id: OrderId,
        taken: U256,
        given: U256,
        complete: bool,
    },
    OrderCancelled {
        id: OrderId,
        refund_coin: CoinId,
        refund: U256,
    },
    /// Dust closure or height-based expiry
    OrderExpired {
        id: OrderId,
        refund_coin: CoinId,
        refund: U256,
    },
}

/// Receives engine events.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &SwapEvent);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn on_event(&self, _event: &SwapEvent) {}
}

/// Sink that logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn on_event(&self, event: &SwapEvent) {
        match event {
            SwapEvent::Swap {
                pair,
                amount_in,
                amount_out,
                ..
            } => {
                tracing::info!(?pair, %amount_in, %amount_out, "swap executed");
            }
            SwapEvent::PairCreated { pair, id } => {
                tracing::info!(?pair, id, "pair created");
            }
            other => {
                tracing::debug!(event = ?other, "swap event");
            }
        }
    }
}

/// Sink that buffers events for later inspection. Used by tests and by
/// hosts that fold events into their own transaction receipts.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::Mutex<Vec<SwapEvent>>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<SwapEvent> {
        std::mem::take(&mut self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for CollectingEventSink {
    fn on_event(&self, event: &SwapEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coin::CoinId;

    #[test]
    fn test_collecting_sink_buffers_in_order() {
        let sink = CollectingEventSink::new();
        let (pair, _) = PairKey::ordered(CoinId::new(1), CoinId::new(2)).unwrap();
        sink.on_event(&SwapEvent::PairCreated { pair, id: 1 });
        sink.on_event(&SwapEvent::OrderCancelled {
            id: OrderId::new(4),
            refund_coin: CoinId::new(2),
            refund: U256::from(10u64),
        });
        let events = sink.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SwapEvent::PairCreated { id: 1, .. }));
        assert!(sink.is_empty());
    }
}
