//! Stub gateway for tests and dry runs.
//!
//! Market orders fill immediately at the configured price. Stop and Limit
//! orders rest until [`StubGateway::trigger`] fills them, or until a bar or
//! quote seen through [`MarketDataPort`] trades through their price. Order
//! updates are pushed to an optional channel, the way a venue's user-data
//! stream would deliver them.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use warden_domain::{
    Candle, OrderId, OrderRequest, OrderSide, OrderType, OrderUpdate, Quote, Symbol,
};

use crate::error::ExecError;
use crate::ports::{GatewayAck, MarketDataPort, OrderGateway};

/// Stub order gateway.
pub struct StubGateway {
    /// Fill prices by symbol
    prices: RwLock<HashMap<String, Decimal>>,
    /// Fill price for unknown symbols
    default_price: Decimal,
    /// Order counter for generating IDs
    order_counter: RwLock<u64>,
    /// Reject the next submit
    fail_next: RwLock<bool>,
    /// Fail the next cancel
    fail_next_cancel: RwLock<bool>,
    /// Stop/Limit orders waiting for a trigger
    resting: RwLock<HashMap<OrderId, OrderRequest>>,
    /// Every accepted submission, in order
    submitted: RwLock<Vec<(OrderId, OrderRequest)>>,
    /// Every successful cancel, in order
    cancelled: RwLock<Vec<OrderId>>,
    /// Where order updates are delivered
    updates: Option<mpsc::UnboundedSender<OrderUpdate>>,
}

impl StubGateway {
    /// Create a stub filling market orders at `default_price`.
    pub fn new(default_price: Decimal) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            default_price,
            order_counter: RwLock::new(0),
            fail_next: RwLock::new(false),
            fail_next_cancel: RwLock::new(false),
            resting: RwLock::new(HashMap::new()),
            submitted: RwLock::new(Vec::new()),
            cancelled: RwLock::new(Vec::new()),
            updates: None,
        }
    }

    /// Create a stub together with the receiving end of its update stream.
    pub fn with_updates(default_price: Decimal) -> (Self, mpsc::UnboundedReceiver<OrderUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gateway = Self {
            updates: Some(tx),
            ..Self::new(default_price)
        };
        (gateway, rx)
    }

    /// Set the fill price for a symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.insert(symbol.to_string(), price);
    }

    /// Fill price for a symbol (or the default).
    pub fn price(&self, symbol: &str) -> Decimal {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        prices.get(symbol).copied().unwrap_or(self.default_price)
    }

    /// Reject the next submit.
    pub fn set_fail_next(&self, fail: bool) {
        *self.fail_next.write().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Fail the next cancel.
    pub fn set_fail_next_cancel(&self, fail: bool) {
        *self.fail_next_cancel.write().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Accepted submissions, oldest first.
    pub fn submitted(&self) -> Vec<(OrderId, OrderRequest)> {
        self.submitted.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Successfully cancelled orders, oldest first.
    pub fn cancelled(&self) -> Vec<OrderId> {
        self.cancelled.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Orders currently resting.
    pub fn resting(&self) -> Vec<(OrderId, OrderRequest)> {
        let mut resting: Vec<_> = self
            .resting
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, request)| (*id, request.clone()))
            .collect();
        resting.sort_by_key(|(id, _)| *id);
        resting
    }

    /// Fill a resting order at `price`.
    ///
    /// Returns false if the order is not resting.
    pub fn trigger(&self, client_order_id: OrderId, price: Decimal) -> bool {
        let request = self
            .resting
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&client_order_id);

        match request {
            Some(request) => {
                debug!(%client_order_id, %price, "Stub: resting order triggered");
                self.publish(OrderUpdate::fill(
                    client_order_id,
                    request.volume.as_decimal(),
                    price,
                    true,
                ));
                true
            },
            None => false,
        }
    }

    /// Fill every resting order on `symbol` whose price lies in the traded
    /// range. Sells trade in `[sell_low, sell_high]`, buys in
    /// `[buy_low, buy_high]`. Orders fill at their own price, oldest first.
    ///
    /// Returns the number of orders filled.
    fn trigger_crossed(&self, symbol: &Symbol, sells: Option<(Decimal, Decimal)>, buys: Option<(Decimal, Decimal)>) -> usize {
        let crossed: Vec<(OrderId, Decimal)> = self
            .resting()
            .into_iter()
            .filter(|(_, request)| &request.symbol == symbol)
            .filter_map(|(id, request)| {
                let price = request.price?.as_decimal();
                let (low, high) = match request.side {
                    OrderSide::Sell => sells?,
                    OrderSide::Buy => buys?,
                };
                let hit = match (request.order_type, request.side) {
                    (OrderType::Stop, OrderSide::Sell) | (OrderType::Limit, OrderSide::Buy) => low <= price,
                    (OrderType::Stop, OrderSide::Buy) | (OrderType::Limit, OrderSide::Sell) => high >= price,
                    (OrderType::Market, _) => false,
                };
                hit.then_some((id, price))
            })
            .collect();

        crossed
            .into_iter()
            .filter(|(id, price)| self.trigger(*id, *price))
            .count()
    }

    fn next_order_id(&self) -> String {
        let mut counter = self.order_counter.write().unwrap_or_else(PoisonError::into_inner);
        *counter += 1;
        format!("STUB-{}", *counter)
    }

    fn take_flag(flag: &RwLock<bool>) -> bool {
        let mut flag = flag.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *flag)
    }

    fn publish(&self, update: OrderUpdate) {
        if let Some(tx) = &self.updates {
            // Receiver gone means nobody is listening any more
            let _ = tx.send(update);
        }
    }
}

#[async_trait]
impl OrderGateway for StubGateway {
    async fn submit(
        &self,
        request: &OrderRequest,
        client_order_id: OrderId,
    ) -> Result<GatewayAck, ExecError> {
        if Self::take_flag(&self.fail_next) {
            return Err(ExecError::OrderRejected("Simulated gateway rejection".to_string()));
        }

        let exchange_order_id = self.next_order_id();
        self.submitted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((client_order_id, request.clone()));
        self.publish(OrderUpdate::accepted(client_order_id));

        match request.order_type {
            OrderType::Market => {
                let price = self.price(request.symbol.as_str());
                self.publish(OrderUpdate::fill(
                    client_order_id,
                    request.volume.as_decimal(),
                    price,
                    true,
                ));
            },
            OrderType::Limit | OrderType::Stop => {
                self.resting
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(client_order_id, request.clone());
            },
        }

        Ok(GatewayAck {
            exchange_order_id,
            client_order_id,
            accepted_at: Utc::now(),
        })
    }

    async fn cancel(&self, _symbol: &Symbol, client_order_id: OrderId) -> Result<(), ExecError> {
        if Self::take_flag(&self.fail_next_cancel) {
            return Err(ExecError::CancelFailed {
                order_id: client_order_id,
                reason: "Simulated cancel failure".to_string(),
            });
        }

        self.resting
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&client_order_id);
        self.cancelled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(client_order_id);
        self.publish(OrderUpdate::cancelled(client_order_id));

        debug!(%client_order_id, "Stub: order cancelled");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ExecError> {
        Ok(())
    }
}

#[async_trait]
impl MarketDataPort for StubGateway {
    async fn on_candle(&self, candle: &Candle) -> Result<(), ExecError> {
        self.set_price(candle.symbol.as_str(), candle.close);
        let range = Some((candle.low, candle.high));
        let filled = self.trigger_crossed(&candle.symbol, range, range);
        if filled > 0 {
            debug!(symbol = %candle.symbol, filled, "Stub: bar triggered resting orders");
        }
        Ok(())
    }

    async fn on_quote(&self, quote: &Quote) -> Result<(), ExecError> {
        let last = match (quote.bid, quote.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            (bid, ask) => bid.or(ask),
        };
        if let Some(last) = last {
            self.set_price(quote.symbol.as_str(), last);
        }
        // Sells execute against the bid, buys against the ask
        self.trigger_crossed(
            &quote.symbol,
            quote.bid.map(|bid| (bid, bid)),
            quote.ask.map(|ask| (ask, ask)),
        );
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use warden_domain::{OrderSide, Price, UpdateStatus, Volume};

    fn request(order_type: OrderType) -> OrderRequest {
        OrderRequest {
            symbol: Symbol::new("BTCUSDT").unwrap(),
            side: OrderSide::Sell,
            volume: Volume::new(dec!(0.5)).unwrap(),
            order_type,
            price: match order_type {
                OrderType::Market => None,
                _ => Some(Price::new(dec!(95)).unwrap()),
            },
        }
    }

    #[tokio::test]
    async fn test_market_order_fills_immediately() {
        let (gateway, mut updates) = StubGateway::with_updates(dec!(100));
        let id = uuid::Uuid::now_v7();

        let ack = gateway.submit(&request(OrderType::Market), id).await.unwrap();
        assert_eq!(ack.exchange_order_id, "STUB-1");
        assert_eq!(ack.client_order_id, id);

        assert_eq!(updates.recv().await.unwrap().status, UpdateStatus::Accepted);
        let fill = updates.recv().await.unwrap();
        assert_eq!(fill.status, UpdateStatus::Filled);
        assert_eq!(fill.filled_price, Some(dec!(100)));
        assert_eq!(fill.filled_volume, dec!(0.5));
    }

    #[tokio::test]
    async fn test_stop_order_rests_until_triggered() {
        let (gateway, mut updates) = StubGateway::with_updates(dec!(100));
        let id = uuid::Uuid::now_v7();

        gateway.submit(&request(OrderType::Stop), id).await.unwrap();
        assert_eq!(gateway.resting().len(), 1);
        updates.recv().await.unwrap();
        assert!(updates.try_recv().is_err());

        assert!(gateway.trigger(id, dec!(94.5)));
        assert!(!gateway.trigger(id, dec!(94.5)));
        assert_eq!(updates.recv().await.unwrap().filled_price, Some(dec!(94.5)));
    }

    #[tokio::test]
    async fn test_simulated_failures() {
        let gateway = StubGateway::new(dec!(100));
        let id = uuid::Uuid::now_v7();
        let symbol = Symbol::new("BTCUSDT").unwrap();

        gateway.set_fail_next(true);
        assert!(matches!(
            gateway.submit(&request(OrderType::Market), id).await,
            Err(ExecError::OrderRejected(_))
        ));
        assert!(gateway.submit(&request(OrderType::Market), id).await.is_ok());

        gateway.set_fail_next_cancel(true);
        assert!(matches!(gateway.cancel(&symbol, id).await, Err(ExecError::CancelFailed { .. })));
        assert!(gateway.cancel(&symbol, id).await.is_ok());
        assert_eq!(gateway.cancelled(), vec![id]);
    }

    #[tokio::test]
    async fn test_bar_triggers_crossed_resting_orders() {
        let (gateway, mut updates) = StubGateway::with_updates(dec!(100));
        let stop = uuid::Uuid::now_v7();
        let take = uuid::Uuid::now_v7();
        let mut limit = request(OrderType::Limit);
        limit.price = Some(Price::new(dec!(110)).unwrap());

        gateway.submit(&request(OrderType::Stop), stop).await.unwrap();
        gateway.submit(&limit, take).await.unwrap();
        while updates.try_recv().is_ok() {}

        let symbol = Symbol::new("BTCUSDT").unwrap();
        let quiet = Candle::new(symbol.clone(), Utc::now(), dec!(100), dec!(104), dec!(96), dec!(102));
        gateway.on_candle(&quiet).await.unwrap();
        assert_eq!(gateway.price("BTCUSDT"), dec!(102));
        assert_eq!(gateway.resting().len(), 2);
        assert!(updates.try_recv().is_err());

        let through = Candle::new(symbol, Utc::now(), dec!(100), dec!(101), dec!(94), dec!(96));
        gateway.on_candle(&through).await.unwrap();
        let fill = updates.recv().await.unwrap();
        assert_eq!(fill.order_id, stop);
        assert_eq!(fill.filled_price, Some(dec!(95)));
        assert_eq!(gateway.resting().len(), 1);
    }

    #[tokio::test]
    async fn test_quote_uses_bid_for_sells() {
        let (gateway, mut updates) = StubGateway::with_updates(dec!(100));
        let stop = uuid::Uuid::now_v7();
        gateway.submit(&request(OrderType::Stop), stop).await.unwrap();
        updates.recv().await.unwrap();

        let symbol = Symbol::new("BTCUSDT").unwrap();
        let ask_only = Quote { symbol: symbol.clone(), bid: None, ask: Some(dec!(94)), timestamp: Utc::now() };
        gateway.on_quote(&ask_only).await.unwrap();
        assert_eq!(gateway.resting().len(), 1);

        let bid_through = Quote { symbol, bid: Some(dec!(94.9)), ask: Some(dec!(95.1)), timestamp: Utc::now() };
        gateway.on_quote(&bid_through).await.unwrap();
        assert!(gateway.resting().is_empty());
        assert_eq!(gateway.price("BTCUSDT"), dec!(95));
        assert_eq!(updates.recv().await.unwrap().order_id, stop);
    }

    #[tokio::test]
    async fn test_per_symbol_price() {
        let gateway = StubGateway::new(dec!(100));
        gateway.set_price("ETHUSDT", dec!(3000));
        assert_eq!(gateway.price("ETHUSDT"), dec!(3000));
        assert_eq!(gateway.price("BTCUSDT"), dec!(100));
    }
}
