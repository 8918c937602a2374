//! Order book: every order the engine issued, keyed by `OrderId`.
//!
//! The book tracks lifecycle status only. Fill application and state
//! machine transitions belong to the engine.

use std::collections::HashMap;

use warden_domain::{Order, OrderId, OrderRole, OrderStatus, ProtectiveKind};

/// Registry of engine orders
#[derive(Debug, Default)]
pub struct OrderBook {
    orders: HashMap<OrderId, Order>,
}

impl OrderBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created order
    pub fn submit(&mut self, order: Order) {
        debug_assert!(order.status == OrderStatus::Pending, "submitted order must be Pending");
        self.orders.insert(order.id, order);
    }

    /// Look up an order by ID
    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Mutable lookup
    pub fn get_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.get_mut(&id)
    }

    /// Orders that may still fill
    pub fn live(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| o.status.is_live())
    }

    /// Live resting protective order of the given kind
    ///
    /// At most one exists per kind at any time.
    pub fn live_protective(&self, kind: ProtectiveKind) -> Option<&Order> {
        self.live()
            .find(|o| matches!(o.role, OrderRole::Protective { kind: k } if k == kind))
    }

    /// IDs of live orders matching `predicate`, oldest first
    pub fn live_ids_where(&self, predicate: impl Fn(&Order) -> bool) -> Vec<OrderId> {
        let mut matching: Vec<&Order> = self.live().filter(|o| predicate(o)).collect();
        matching.sort_by_key(|o| o.id);
        matching.into_iter().map(|o| o.id).collect()
    }

    /// Assume an order cancelled without waiting for confirmation
    ///
    /// A late fill is still accepted and reconciled by the engine.
    pub fn mark_cancelled(&mut self, id: OrderId) -> Option<&Order> {
        let order = self.orders.get_mut(&id)?;
        if order.status.is_live() {
            order.status = OrderStatus::Cancelled;
        }
        Some(order)
    }

    /// Forget an order the venue confirmed dead
    pub fn remove(&mut self, id: OrderId) -> Option<Order> {
        self.orders.remove(&id)
    }

    /// Drop every order that can no longer change the position
    ///
    /// Filled and rejected orders go, as do cancelled reduce-only orders:
    /// a late fill on those is capped to the position anyway. Cancelled
    /// entries are kept so a late fill can still be matched.
    pub fn prune(&mut self) {
        self.orders.retain(|_, o| match o.status {
            OrderStatus::Filled | OrderStatus::Rejected => false,
            OrderStatus::Cancelled => !o.role.is_reduce_only(),
            OrderStatus::Pending | OrderStatus::Active => true,
        });
    }

    /// Number of orders held
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// True when no order is held
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use warden_domain::{OrderSide, Symbol, Volume};

    fn order(role: OrderRole) -> Order {
        Order::market(
            Symbol::new("BTCUSDT").unwrap(),
            OrderSide::Buy,
            Volume::new(dec!(1)).unwrap(),
            role,
        )
    }

    #[test]
    fn test_submit_and_lookup() {
        let mut book = OrderBook::new();
        let entry = order(OrderRole::Entry);
        let id = entry.id;
        book.submit(entry);

        assert_eq!(book.get(id).unwrap().status, OrderStatus::Pending);
        assert_eq!(book.live().count(), 1);
    }

    #[test]
    fn test_live_protective_by_kind() {
        let mut book = OrderBook::new();
        let stop = order(OrderRole::Protective { kind: ProtectiveKind::Stop });
        let stop_id = stop.id;
        book.submit(stop);
        book.submit(order(OrderRole::Entry));

        assert_eq!(book.live_protective(ProtectiveKind::Stop).map(|o| o.id), Some(stop_id));
        assert!(book.live_protective(ProtectiveKind::Take).is_none());

        book.mark_cancelled(stop_id);
        assert!(book.live_protective(ProtectiveKind::Stop).is_none());
    }

    #[test]
    fn test_prune_keeps_only_cancelled_entries() {
        let mut book = OrderBook::new();
        let filled = order(OrderRole::Entry);
        let cancelled = order(OrderRole::Entry);
        let stop = order(OrderRole::Protective { kind: ProtectiveKind::Stop });
        let (filled_id, cancelled_id, stop_id) = (filled.id, cancelled.id, stop.id);
        book.submit(filled);
        book.submit(cancelled);
        book.submit(stop);

        book.get_mut(filled_id).unwrap().record_fill(dec!(1)).unwrap();
        book.mark_cancelled(cancelled_id);
        book.mark_cancelled(stop_id);
        book.prune();

        assert!(book.get(filled_id).is_none());
        assert!(book.get(stop_id).is_none());
        assert!(book.get(cancelled_id).is_some());
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut book = OrderBook::new();
        let stop = order(OrderRole::Protective { kind: ProtectiveKind::Stop });
        let id = stop.id;
        book.submit(stop);

        assert_eq!(book.remove(id).map(|o| o.id), Some(id));
        assert!(book.is_empty());
        assert!(book.remove(id).is_none());
    }

    #[test]
    fn test_mark_cancelled_ignores_terminal() {
        let mut book = OrderBook::new();
        let entry = order(OrderRole::Entry);
        let id = entry.id;
        book.submit(entry);
        book.get_mut(id).unwrap().record_fill(dec!(1)).unwrap();

        assert_eq!(book.mark_cancelled(id).unwrap().status, OrderStatus::Filled);
    }
}
