//! Event plumbing for the daemon.
//!
//! - [`DaemonEvent`]: inputs for a strategy runner (candles, quotes,
//!   signals, order updates). One runner consumes them from an mpsc
//!   channel, in arrival order.
//! - [`EventBus`]: fan-out of the domain events the engine emits, for
//!   logging or any other observer. Uses tokio broadcast channels.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use warden_domain::{Candle, Event, OrderUpdate, Quote, SignalIntent};

use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Runner Inputs
// =============================================================================

/// Inputs that drive a strategy runner.
///
/// Serialized as newline-delimited JSON tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonEvent {
    /// Bar update
    Candle(Candle),

    /// Best bid/ask update
    Quote(Quote),

    /// Signal evaluator output
    Signal {
        /// What the evaluator wants
        intent: SignalIntent,
        /// Price the signal was computed at
        reference_price: Decimal,
    },

    /// Gateway notification
    OrderUpdate(OrderUpdate),

    /// Stop the runner
    Shutdown,
}

impl DaemonEvent {
    /// Decode one NDJSON line.
    pub fn from_json_line(line: &str) -> DaemonResult<Self> {
        serde_json::from_str(line.trim()).map_err(|e| DaemonError::Input(e.to_string()))
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            DaemonEvent::Candle(_) => "candle",
            DaemonEvent::Quote(_) => "quote",
            DaemonEvent::Signal { .. } => "signal",
            DaemonEvent::OrderUpdate(_) => "order_update",
            DaemonEvent::Shutdown => "shutdown",
        }
    }
}

// =============================================================================
// Event Bus
// =============================================================================

/// Broadcast of emitted domain events.
///
/// Multiple producers can send events, and multiple consumers can receive.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with specified capacity.
    ///
    /// Capacity determines how many events can be buffered before
    /// slow receivers start missing events (lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// Returns 0 if there are no active receivers.
    pub fn publish(&self, event: Event) -> usize {
        // send() returns Err if there are no receivers, but we don't care
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events.
    ///
    /// Returns a receiver that will receive all events sent after subscription.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Receiver for emitted domain events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Event>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped.
    /// Returns an error if the receiver lagged (missed events).
    pub async fn recv(&mut self) -> Option<DaemonResult<Event>> {
        match self.receiver.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => Some(Err(DaemonError::EventBus(
                format!("Receiver lagged, missed {} events", count),
            ))),
        }
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is immediately available.
    pub fn try_recv(&mut self) -> Option<DaemonResult<Event>> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => Some(Err(DaemonError::EventBus(
                format!("Receiver lagged, missed {} events", count),
            ))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use warden_domain::{SkipReason, Symbol, UpdateStatus};

    fn skipped() -> Event {
        Event::VolumeSkipped {
            symbol: Symbol::new("BTCUSDT").unwrap(),
            reason: SkipReason::ZeroVolume,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_recv() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        let event = skipped();
        assert_eq!(bus.publish(event.clone()), 1);

        let received = receiver.recv().await.unwrap().unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn test_event_bus_multiple_receivers() {
        let bus = EventBus::new(10);
        let mut receiver1 = bus.subscribe();
        let mut receiver2 = bus.subscribe();

        assert_eq!(bus.receiver_count(), 2);
        bus.publish(skipped());

        assert!(receiver1.recv().await.unwrap().is_ok());
        assert!(receiver2.recv().await.unwrap().is_ok());
    }

    #[test]
    fn test_event_bus_no_receivers() {
        let bus = EventBus::new(10);
        assert_eq!(bus.publish(skipped()), 0);
    }

    #[test]
    fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn test_decode_input_lines() {
        let candle = DaemonEvent::from_json_line(
            r#"{"type":"candle","symbol":"BTCUSDT","open_time":"2024-01-01T00:00:00Z","open":"100","high":"106","low":"99","close":"105"}"#,
        )
        .unwrap();
        match candle {
            DaemonEvent::Candle(c) => {
                assert_eq!(c.high, dec!(106));
                assert!(c.is_final);
            },
            other => panic!("Expected candle, got {:?}", other),
        }

        let signal = DaemonEvent::from_json_line(
            r#"{"type":"signal","intent":"enter_long","reference_price":"100"}"#,
        )
        .unwrap();
        assert_eq!(signal.kind(), "signal");

        let update = DaemonEvent::from_json_line(
            r#"{"type":"order_update","order_id":"0190a0b0-0000-7000-8000-000000000001","filled_volume":"0","filled_price":null,"status":"rejected"}"#,
        )
        .unwrap();
        assert!(matches!(update, DaemonEvent::OrderUpdate(u) if u.status == UpdateStatus::Rejected));

        assert_eq!(
            DaemonEvent::from_json_line(r#"{"type":"shutdown"}"#).unwrap(),
            DaemonEvent::Shutdown
        );
        assert!(matches!(
            DaemonEvent::from_json_line("not json"),
            Err(DaemonError::Input(_))
        ));
    }
}
