//! Execution layer port definitions.
//!
//! The gateway port is the only outward-facing interface of the engine.
//! Adapters implement it for a concrete venue; `StubGateway` implements
//! it for tests and dry runs. Simulated venues also implement
//! [`MarketDataPort`] so they see the same bars and quotes as the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_domain::{Candle, OrderId, OrderRequest, Quote, Symbol};

use crate::error::ExecError;

// =============================================================================
// Order Gateway Port
// =============================================================================

/// Port for order routing.
///
/// `submit` returns once the gateway has accepted or refused the request.
/// Fills, cancels and late rejections arrive asynchronously as
/// `OrderUpdate`s keyed by the client order id.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit an order.
    ///
    /// # Arguments
    ///
    /// * `request` - What to trade
    /// * `client_order_id` - Engine order id, used for idempotency and to
    ///   correlate updates
    ///
    /// # Errors
    ///
    /// `ExecError::OrderRejected` if refused, `ExecError::Gateway` if the
    /// gateway could not be reached. Either way the order does not exist.
    async fn submit(
        &self,
        request: &OrderRequest,
        client_order_id: OrderId,
    ) -> Result<GatewayAck, ExecError>;

    /// Cancel a live order by client order id.
    ///
    /// # Errors
    ///
    /// `ExecError::CancelFailed` if the order may still be live.
    async fn cancel(&self, symbol: &Symbol, client_order_id: OrderId) -> Result<(), ExecError>;

    /// Check if the gateway is healthy/connected.
    async fn health_check(&self) -> Result<(), ExecError>;
}

// =============================================================================
// Market Data Port
// =============================================================================

/// Port through which a simulated venue observes market data.
///
/// A live venue has its own feed and does not need this. A simulated one
/// uses it to move its fill price and to trigger resting orders the market
/// traded through.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// A bar finished.
    async fn on_candle(&self, candle: &Candle) -> Result<(), ExecError>;

    /// Best bid/ask changed.
    async fn on_quote(&self, quote: &Quote) -> Result<(), ExecError>;
}

/// Gateway acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAck {
    /// Venue-assigned order ID
    pub exchange_order_id: String,
    /// Engine order id echoed back
    pub client_order_id: OrderId,
    /// When the gateway accepted the order
    pub accepted_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================
