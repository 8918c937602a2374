//! Engine: per-instrument position risk decisions.
//!
//! The engine owns one position tracker, the protective levels of the open
//! position, the sizing policy and the order book. Every external event
//! (signal, candle, quote, order update) goes in; an [`EngineDecision`]
//! listing orders to place, orders to cancel and events to emit comes out.
//!
//! Pure and synchronous: no I/O, no awaits. The caller must apply order
//! updates before feeding the next candle.
//!
//! # Lifecycle
//!
//! ```text
//! Flat ──entry──► Opening ──fill──► Open ──tier──► PartialExit ──fill──► Open
//!                    │                 │                                   │
//!                 reject              exit ──► Closing ──fill──► Flat      │
//!                    ▼                 ▲          │                        │
//!                  Flat                └─reject───┘◄───────────────────────┘
//! ```

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use warden_domain::{
    Candle, ClosedCycle, Event, ExitReason, LifecycleState, Order, OrderId, OrderRequest,
    OrderRole, OrderSide, OrderStatus, OrderType, OrderUpdate, PositionTracker, Price,
    ProtectiveKind, ProtectiveLevels, Quote, Side, SignalIntent, SizingPolicy, SkipReason,
    StopMoveReason, Symbol, TierExit, UpdateStatus, Volume,
};

use crate::error::EngineResult;
use crate::orders::OrderBook;
use crate::settings::{ProtectionMode, RiskSettings, SizingMode};

// =============================================================================
// Decisions
// =============================================================================

/// Action the engine asks the execution layer to perform
#[derive(Debug, Clone)]
pub enum EngineAction {
    /// Submit a new order (the order id doubles as client order id)
    PlaceOrder(Order),
    /// Cancel a live order; the engine already treats it as cancelled
    CancelOrder {
        /// Order to cancel
        order_id: OrderId,
        /// Instrument
        symbol: Symbol,
        /// What the order was for
        role: OrderRole,
    },
    /// Emit a domain event
    EmitEvent(Event),
}

/// Ordered list of actions produced by one engine call
///
/// Actions must be executed in order: a cancel preceding a placement of the
/// same protective kind is a replacement.
#[derive(Debug, Clone, Default)]
pub struct EngineDecision {
    /// Actions, in execution order
    pub actions: Vec<EngineAction>,
}

impl EngineDecision {
    /// Empty decision
    pub fn none() -> Self {
        Self::default()
    }

    /// True when there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Orders to place
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.actions.iter().filter_map(|a| match a {
            EngineAction::PlaceOrder(order) => Some(order),
            _ => None,
        })
    }

    /// Orders to cancel
    pub fn cancellations(&self) -> impl Iterator<Item = OrderId> + '_ {
        self.actions.iter().filter_map(|a| match a {
            EngineAction::CancelOrder { order_id, .. } => Some(*order_id),
            _ => None,
        })
    }

    /// Events to emit
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.actions.iter().filter_map(|a| match a {
            EngineAction::EmitEvent(event) => Some(event),
            _ => None,
        })
    }

    /// Append the actions of another decision
    pub fn extend(&mut self, other: EngineDecision) {
        self.actions.extend(other.actions);
    }

    fn emit(&mut self, event: Event) {
        self.actions.push(EngineAction::EmitEvent(event));
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Position risk and order lifecycle engine for one instrument
#[derive(Debug)]
pub struct Engine {
    symbol: Symbol,
    settings: RiskSettings,
    tracker: PositionTracker,
    levels: Option<ProtectiveLevels>,
    sizing: SizingPolicy,
    orders: OrderBook,
    state: LifecycleState,
    pending_tiers: Vec<usize>,
}

impl Engine {
    /// Create an engine, validating the settings
    ///
    /// # Errors
    /// Returns an `EngineError` if the settings are inconsistent.
    pub fn new(symbol: Symbol, settings: RiskSettings) -> EngineResult<Self> {
        settings.validate()?;
        let sizing = SizingPolicy::new(settings.sizing)?;

        info!(
            %symbol,
            protection = ?settings.protection_mode,
            sizing = ?settings.sizing_mode,
            "Engine created"
        );

        Ok(Self {
            symbol,
            settings,
            tracker: PositionTracker::new(),
            levels: None,
            sizing,
            orders: OrderBook::new(),
            state: LifecycleState::Flat,
            pending_tiers: Vec::new(),
        })
    }

    /// Instrument
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Settings in force
    pub fn settings(&self) -> &RiskSettings {
        &self.settings
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Position tracker
    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    /// Protective levels of the open position
    pub fn levels(&self) -> Option<&ProtectiveLevels> {
        self.levels.as_ref()
    }

    /// Sizing policy (martingale state included)
    pub fn sizing(&self) -> &SizingPolicy {
        &self.sizing
    }

    /// Order book
    pub fn orders(&self) -> &OrderBook {
        &self.orders
    }

    // =========================================================================
    // Signals
    // =========================================================================

    /// Act on the external signal evaluator's intent
    ///
    /// `reference_price` is the price the signal was computed at; it sizes
    /// equity-risk entries and labels exit events.
    pub fn on_signal(&mut self, intent: SignalIntent, reference_price: Decimal) -> EngineDecision {
        let mut decision = EngineDecision::none();

        if let Some(order_id) = self.state.pending_order() {
            debug!(symbol = %self.symbol, %order_id, ?intent, "Order in flight, signal ignored");
            return decision;
        }

        match intent {
            SignalIntent::None => {},
            SignalIntent::Exit => {
                if !self.tracker.is_flat() {
                    self.exit_position(ExitReason::Signal, reference_price, &mut decision);
                }
            },
            SignalIntent::EnterLong | SignalIntent::EnterShort => {
                let Some(target) = intent.entry_side() else {
                    return decision;
                };
                match self.tracker.side() {
                    None => self.open_position(target, reference_price, &mut decision),
                    Some(current) if current == target => {
                        debug!(symbol = %self.symbol, side = %target, "Already positioned, signal ignored");
                    },
                    Some(_) => self.reverse_position(target, reference_price, &mut decision),
                }
            },
        }

        decision
    }

    fn entry_volume(&self, reference_price: Decimal) -> Decimal {
        match self.settings.sizing_mode {
            SizingMode::Fixed => self.sizing.compute_entry_volume(),
            SizingMode::EquityRisk { equity, risk_percent } => {
                let stop_distance = self
                    .settings
                    .protective
                    .stop_distance
                    .map(|d| d.resolve(reference_price, self.settings.instrument().price_step))
                    .unwrap_or(Decimal::ZERO);
                self.sizing.compute_risk_volume(equity, risk_percent, stop_distance)
            },
        }
    }

    /// Clamp new exposure in one direction to `sizing.exposure_cap`
    fn within_exposure_cap(&self, volume: Decimal) -> Decimal {
        match self.settings.sizing.exposure_cap {
            Some(cap) if volume > cap => {
                let capped = self.settings.instrument().normalize_volume(cap);
                debug!(symbol = %self.symbol, requested = %volume, %capped, "Entry volume clamped by exposure cap");
                capped
            },
            _ => volume,
        }
    }

    fn open_position(&mut self, side: Side, reference_price: Decimal, decision: &mut EngineDecision) {
        let volume = self.within_exposure_cap(self.entry_volume(reference_price));
        let Ok(volume) = Volume::new(volume) else {
            self.skip(SkipReason::ZeroVolume, decision);
            return;
        };

        let order = Order::market(self.symbol.clone(), side.entry_action(), volume, OrderRole::Entry);
        info!(
            symbol = %self.symbol,
            order_id = %order.id,
            %side,
            %volume,
            multiplier = %self.sizing.effective_multiplier(),
            "Placing entry order"
        );

        self.state = LifecycleState::Opening { order_id: order.id };
        self.place(order, decision);
    }

    fn reverse_position(&mut self, target: Side, reference_price: Decimal, decision: &mut EngineDecision) {
        let held = self.tracker.net_volume();
        let raw = match self.settings.sizing_mode {
            SizingMode::Fixed => self.sizing.compute_reversal_volume(held),
            SizingMode::EquityRisk { .. } => {
                let entry = self.entry_volume(reference_price);
                if entry.is_zero() {
                    Decimal::ZERO
                } else {
                    entry + held.abs()
                }
            },
        };
        // Only the part beyond the flattening volume opens new exposure
        let raw = match raw - held.abs() {
            opening if opening > Decimal::ZERO => held.abs() + self.within_exposure_cap(opening),
            _ => Decimal::ZERO,
        };

        let Ok(volume) = Volume::new(raw) else {
            self.skip(SkipReason::ZeroVolume, decision);
            return;
        };

        self.cancel_resting_protection(decision);

        let order = Order::market(self.symbol.clone(), target.entry_action(), volume, OrderRole::Reversal);
        info!(
            symbol = %self.symbol,
            order_id = %order.id,
            side = %target,
            %volume,
            flattening = %held.abs(),
            "Placing reversal order"
        );

        decision.emit(Event::ExitTriggered {
            symbol: self.symbol.clone(),
            reason: ExitReason::Reversal,
            level: reference_price,
            volume: held.abs(),
            timestamp: Utc::now(),
        });
        self.state = LifecycleState::Opening { order_id: order.id };
        self.place(order, decision);
    }

    fn exit_position(&mut self, reason: ExitReason, level: Decimal, decision: &mut EngineDecision) {
        let Some(side) = self.tracker.side() else {
            return;
        };
        let Ok(volume) = Volume::new(self.tracker.abs_volume()) else {
            return;
        };

        self.cancel_resting_protection(decision);

        let order = Order::market(self.symbol.clone(), side.exit_action(), volume, OrderRole::Exit { reason });
        info!(
            symbol = %self.symbol,
            order_id = %order.id,
            ?reason,
            %level,
            %volume,
            "Placing exit order"
        );

        decision.emit(Event::ExitTriggered {
            symbol: self.symbol.clone(),
            reason,
            level,
            volume: volume.as_decimal(),
            timestamp: Utc::now(),
        });
        self.state = LifecycleState::Closing { order_id: order.id, reason };
        self.place(order, decision);
    }

    // =========================================================================
    // Market data
    // =========================================================================

    /// Evaluate a candle against the open position
    ///
    /// Order: stop/take (polled mode) → tiers → break-even → trailing.
    /// Break-even and trailing use the bar close; a stop moved here is
    /// checked from the next bar on.
    pub fn on_candle(&mut self, candle: &Candle) -> EngineDecision {
        let mut decision = EngineDecision::none();

        if candle.symbol != self.symbol {
            warn!(expected = %self.symbol, got = %candle.symbol, "Candle for another symbol ignored");
            return decision;
        }
        if !candle.is_final {
            return decision;
        }
        if !candle.is_well_formed() {
            warn!(symbol = %self.symbol, open_time = %candle.open_time, "Malformed candle ignored");
            return decision;
        }
        if self.state != LifecycleState::Open {
            debug!(symbol = %self.symbol, state = self.state.name(), "Not evaluating candle");
            return decision;
        }
        let Some(side) = self.tracker.side() else {
            return decision;
        };

        // 1. Stop / take
        if self.settings.protection_mode == ProtectionMode::Polled {
            let exit = self
                .levels
                .as_ref()
                .and_then(|levels| levels.evaluate(candle.low, candle.high, candle.close));
            if let Some(exit) = exit {
                self.exit_position(exit.reason, exit.level, &mut decision);
                return decision;
            }
        }

        // 2. Partial tiers
        let held = self.tracker.abs_volume();
        let tier_exits = match self.levels.as_mut() {
            Some(levels) => levels.evaluate_tiers(candle.high, candle.low, held),
            None => Vec::new(),
        };
        if !tier_exits.is_empty() {
            self.place_tier_order(side, &tier_exits, &mut decision);
        }

        // 3. Break-even and trailing
        self.advance_stop_on_close(candle.close, &mut decision);

        decision
    }

    /// Trail the stop on a quote tick
    ///
    /// Longs trail on the bid, shorts on the ask. A missing side skips the
    /// update; candle evaluation is unaffected.
    pub fn on_quote(&mut self, quote: &Quote) -> EngineDecision {
        let mut decision = EngineDecision::none();

        if quote.symbol != self.symbol {
            return decision;
        }
        if !matches!(self.state, LifecycleState::Open | LifecycleState::PartialExit { .. }) {
            return decision;
        }
        let Some(side) = self.tracker.side() else {
            return decision;
        };
        let Some(price) = quote.exit_price(side) else {
            debug!(symbol = %self.symbol, %side, "Quote side missing, trailing skipped");
            return decision;
        };

        let update = self.levels.as_mut().and_then(|levels| {
            let rule = levels.trailing_rule()?;
            levels.apply_trailing(price, rule.distance, rule.step)
        });

        if let Some(update) = update {
            debug!(
                symbol = %self.symbol,
                previous = ?update.previous_stop,
                new = %update.new_stop,
                %price,
                "Trailing stop advanced on quote"
            );
            decision.emit(Event::StopMoved {
                symbol: self.symbol.clone(),
                previous_stop: update.previous_stop,
                new_stop: update.new_stop,
                reason: StopMoveReason::Trailing,
                timestamp: quote.timestamp,
            });
            self.replace_resting_stop(&mut decision);
        }

        decision
    }

    fn place_tier_order(&mut self, side: Side, exits: &[TierExit], decision: &mut EngineDecision) {
        let now = Utc::now();
        for exit in exits {
            info!(
                symbol = %self.symbol,
                tier = exit.index,
                trigger = %exit.trigger_price,
                volume = %exit.volume,
                "Partial tier hit"
            );
            decision.emit(Event::TierHit {
                symbol: self.symbol.clone(),
                index: exit.index,
                trigger_price: exit.trigger_price,
                volume: exit.volume,
                timestamp: now,
            });
        }

        let raw: Decimal = exits.iter().map(|e| e.volume).sum();
        let normalized = self
            .settings
            .instrument()
            .normalize_volume(raw.min(self.tracker.abs_volume()));
        let Ok(volume) = Volume::new(normalized) else {
            // Tiers stay consumed: the dust below the volume step is left to stop/take
            self.skip(SkipReason::ZeroVolume, decision);
            return;
        };

        let last = exits.last().map(|e| e.index).unwrap_or_default();
        self.cancel_resting_protection(decision);

        let order = Order::market(self.symbol.clone(), side.exit_action(), volume, OrderRole::Tier { index: last });
        self.pending_tiers = exits.iter().map(|e| e.index).collect();
        self.state = LifecycleState::PartialExit { order_id: order.id, tier: last };
        self.place(order, decision);
    }

    fn advance_stop_on_close(&mut self, close: Decimal, decision: &mut EngineDecision) {
        let Some(levels) = self.levels.as_mut() else {
            return;
        };

        let previous = levels.stop_price;
        let (breakeven, trailing) = levels.apply_rules(close);
        let now = Utc::now();
        let mut moved = false;

        if let Some(new_stop) = breakeven {
            info!(symbol = %self.symbol, previous = ?previous, new = %new_stop, "Stop moved to break-even");
            decision.emit(Event::StopMoved {
                symbol: self.symbol.clone(),
                previous_stop: previous,
                new_stop,
                reason: StopMoveReason::Breakeven,
                timestamp: now,
            });
            moved = true;
        }

        if let Some(update) = trailing {
            debug!(
                symbol = %self.symbol,
                previous = ?update.previous_stop,
                new = %update.new_stop,
                %close,
                "Trailing stop advanced"
            );
            decision.emit(Event::StopMoved {
                symbol: self.symbol.clone(),
                previous_stop: update.previous_stop,
                new_stop: update.new_stop,
                reason: StopMoveReason::Trailing,
                timestamp: now,
            });
            moved = true;
        }

        if moved {
            self.replace_resting_stop(decision);
        }
    }

    // =========================================================================
    // Order updates
    // =========================================================================

    /// Apply a gateway notification
    ///
    /// Fills update the tracker immediately. Rejections roll the state
    /// machine back as if the order never existed.
    pub fn on_order_update(&mut self, update: OrderUpdate) -> EngineDecision {
        let mut decision = EngineDecision::none();

        let Some(order) = self.orders.get(update.order_id) else {
            warn!(symbol = %self.symbol, order_id = %update.order_id, status = ?update.status, "Update for unknown order ignored");
            return decision;
        };
        let (role, side) = (order.role, order.side);

        match update.status {
            UpdateStatus::Accepted => {
                if let Some(order) = self.orders.get_mut(update.order_id) {
                    if order.status == OrderStatus::Pending {
                        order.status = OrderStatus::Active;
                    }
                }
            },
            UpdateStatus::PartiallyFilled | UpdateStatus::Filled => {
                match (update.has_fill(), update.filled_price) {
                    (true, Some(price)) => self.apply_fill(
                        update.order_id,
                        role,
                        side,
                        price,
                        update.filled_volume,
                        &mut decision,
                    ),
                    _ => warn!(
                        symbol = %self.symbol,
                        order_id = %update.order_id,
                        "Fill notification without usable volume/price ignored"
                    ),
                }
            },
            UpdateStatus::Cancelled => {
                self.orders.mark_cancelled(update.order_id);
                self.on_order_dead(update.order_id, role, &mut decision);
                // Confirmed dead: no late fill can follow
                self.orders.remove(update.order_id);
            },
            UpdateStatus::Rejected => {
                if let Some(order) = self.orders.get_mut(update.order_id) {
                    if order.status.is_live() {
                        order.status = OrderStatus::Rejected;
                    }
                }
                warn!(symbol = %self.symbol, order_id = %update.order_id, ?role, "Order rejected");
                decision.emit(Event::OrderRejected {
                    symbol: self.symbol.clone(),
                    order_id: update.order_id,
                    role,
                    timestamp: Utc::now(),
                });
                self.on_order_dead(update.order_id, role, &mut decision);
            },
        }

        decision
    }

    /// The gateway refused a cancel: treat the order as live again
    ///
    /// The next replacement of the same protective kind cancels it first.
    pub fn on_cancel_failed(&mut self, order_id: OrderId) {
        if let Some(order) = self.orders.get_mut(order_id) {
            if order.status == OrderStatus::Cancelled {
                order.status = OrderStatus::Active;
                warn!(symbol = %self.symbol, %order_id, role = ?order.role, "Cancel failed, order still live");
            }
        }
    }

    fn apply_fill(
        &mut self,
        order_id: OrderId,
        role: OrderRole,
        side: OrderSide,
        price: Decimal,
        volume: Decimal,
        decision: &mut EngineDecision,
    ) {
        let order_done = match self.orders.get_mut(order_id) {
            Some(order) => match order.record_fill(volume) {
                Ok(()) => order.status == OrderStatus::Filled,
                Err(e) => {
                    warn!(symbol = %self.symbol, %order_id, error = %e, "Duplicate fill ignored");
                    return;
                },
            },
            None => return,
        };

        let volume = self.reducible_volume(order_id, role, side, volume);
        if volume <= Decimal::ZERO {
            self.settle_after_fill(order_id, role, order_done, decision);
            return;
        }

        let outcome = self.tracker.on_fill(side, price, volume);
        if outcome.ignored {
            return;
        }

        info!(
            symbol = %self.symbol,
            %order_id,
            %side,
            %price,
            %volume,
            net = %self.tracker.net_volume(),
            "Fill applied"
        );
        decision.emit(Event::FillApplied {
            symbol: self.symbol.clone(),
            order_id,
            side,
            price,
            volume,
            net_volume: self.tracker.net_volume(),
            timestamp: Utc::now(),
        });

        if let Some(closed) = outcome.closed {
            self.close_cycle(closed, order_id, decision);
        }

        if let Some(opened) = outcome.opened {
            self.arm_levels(opened, decision);
        } else if self.state.pending_order() == Some(order_id)
            && matches!(role, OrderRole::Entry | OrderRole::Reversal)
            && self.tracker.side() == Some(side.opens())
        {
            // Entry still filling: levels follow the new average
            self.rebuild_levels();
        }

        self.settle_after_fill(order_id, role, order_done, decision);
        self.resize_resting_protection(decision);
    }

    /// Cap a reduce-only fill at the volume actually held
    fn reducible_volume(&self, order_id: OrderId, role: OrderRole, side: OrderSide, volume: Decimal) -> Decimal {
        if !role.is_reduce_only() {
            return volume;
        }
        let held = match self.tracker.side() {
            Some(held_side) if held_side.exit_action() == side => self.tracker.abs_volume(),
            _ => Decimal::ZERO,
        };
        if volume > held {
            warn!(
                symbol = %self.symbol,
                %order_id,
                ?role,
                %volume,
                %held,
                "Reduce-only fill exceeds position, capped"
            );
            return held;
        }
        volume
    }

    fn arm_levels(&mut self, side: Side, decision: &mut EngineDecision) {
        let Some(entry) = self.tracker.average_price() else {
            return;
        };

        let levels = ProtectiveLevels::from_config(
            entry,
            side,
            &self.settings.protective,
            self.settings.instrument().price_step,
        );

        info!(
            symbol = %self.symbol,
            %side,
            %entry,
            stop = ?levels.stop_price,
            take = ?levels.take_price,
            tiers = levels.tiers.len(),
            "Position opened"
        );
        decision.emit(Event::PositionOpened {
            symbol: self.symbol.clone(),
            side,
            volume: self.tracker.abs_volume(),
            entry_price: entry,
            stop_price: levels.stop_price,
            take_price: levels.take_price,
            timestamp: Utc::now(),
        });

        self.levels = Some(levels);
    }

    fn rebuild_levels(&mut self) {
        if let (Some(side), Some(entry)) = (self.tracker.side(), self.tracker.average_price()) {
            self.levels = Some(ProtectiveLevels::from_config(
                entry,
                side,
                &self.settings.protective,
                self.settings.instrument().price_step,
            ));
        }
    }

    fn close_cycle(&mut self, closed: ClosedCycle, filled: OrderId, decision: &mut EngineDecision) {
        let next_multiplier = self.sizing.on_position_closed(closed.realized_pnl);

        info!(
            symbol = %self.symbol,
            side = %closed.side,
            exit = %closed.exit_price,
            pnl = %closed.realized_pnl,
            next_multiplier = %next_multiplier,
            "Position closed"
        );
        decision.emit(Event::PositionClosed {
            symbol: self.symbol.clone(),
            side: closed.side,
            exit_price: closed.exit_price,
            realized_pnl: closed.realized_pnl,
            next_multiplier,
            timestamp: Utc::now(),
        });

        self.levels = None;
        self.pending_tiers.clear();

        // Nothing left to protect or reduce
        let stale = self.orders.live_ids_where(|o| {
            o.id != filled && !matches!(o.role, OrderRole::Entry | OrderRole::Reversal)
        });
        for order_id in stale {
            self.cancel(order_id, decision);
        }
        self.orders.prune();
    }

    fn settle_after_fill(
        &mut self,
        order_id: OrderId,
        role: OrderRole,
        order_done: bool,
        decision: &mut EngineDecision,
    ) {
        match self.state.pending_order() {
            Some(pending) if pending == order_id => {
                if !order_done {
                    return;
                }
                if matches!(role, OrderRole::Tier { .. }) {
                    self.pending_tiers.clear();
                }
                if self.tracker.is_flat() {
                    self.state = LifecycleState::Flat;
                } else {
                    self.enter_open(decision);
                }
            },
            Some(_) => {
                // Another order flattened the position under an in-flight exit
                if self.tracker.is_flat()
                    && matches!(
                        self.state,
                        LifecycleState::Closing { .. } | LifecycleState::PartialExit { .. }
                    )
                {
                    self.state = LifecycleState::Flat;
                }
            },
            None => {
                if self.tracker.is_flat() {
                    self.state = LifecycleState::Flat;
                } else if self.state == LifecycleState::Flat {
                    warn!(symbol = %self.symbol, %order_id, "Late fill reopened a position");
                    self.enter_open(decision);
                }
            },
        }
    }

    fn on_order_dead(&mut self, order_id: OrderId, role: OrderRole, decision: &mut EngineDecision) {
        if self.state.pending_order() != Some(order_id) {
            if let OrderRole::Protective { kind } = role {
                debug!(symbol = %self.symbol, %order_id, ?kind, "Protective order no longer live");
            }
            return;
        }

        if matches!(role, OrderRole::Tier { .. }) {
            if let Some(levels) = self.levels.as_mut() {
                for index in self.pending_tiers.drain(..) {
                    levels.rearm_tier(index);
                }
            }
            self.pending_tiers.clear();
        }

        if self.tracker.is_flat() {
            self.state = LifecycleState::Flat;
        } else {
            self.enter_open(decision);
        }
        info!(symbol = %self.symbol, %order_id, state = self.state.name(), "Rolled back after order failure");
    }

    // =========================================================================
    // Resting protection
    // =========================================================================

    fn enter_open(&mut self, decision: &mut EngineDecision) {
        let was_open = self.state == LifecycleState::Open;
        self.state = LifecycleState::Open;
        if !was_open {
            self.arm_resting_protection(decision);
        }
    }

    fn arm_resting_protection(&mut self, decision: &mut EngineDecision) {
        if self.settings.protection_mode != ProtectionMode::Resting {
            return;
        }
        self.cancel_resting_protection(decision);
        self.place_protective(ProtectiveKind::Stop, decision);
        self.place_protective(ProtectiveKind::Take, decision);
    }

    fn cancel_resting_protection(&mut self, decision: &mut EngineDecision) {
        let live = self
            .orders
            .live_ids_where(|o| matches!(o.role, OrderRole::Protective { .. }));
        for order_id in live {
            self.cancel(order_id, decision);
        }
    }

    /// Shrink resting orders that would close more than the position holds
    fn resize_resting_protection(&mut self, decision: &mut EngineDecision) {
        if self.settings.protection_mode != ProtectionMode::Resting
            || self.state != LifecycleState::Open
        {
            return;
        }
        let held = self.tracker.abs_volume();
        for kind in [ProtectiveKind::Stop, ProtectiveKind::Take] {
            let oversized = self
                .orders
                .live_protective(kind)
                .filter(|o| o.remaining_volume() > held)
                .map(|o| o.id);
            if let Some(old) = oversized {
                info!(symbol = %self.symbol, order_id = %old, ?kind, %held, "Resizing resting protective order");
                self.cancel(old, decision);
                self.place_protective(kind, decision);
            }
        }
    }

    /// Cancel-then-submit the resting stop after it moved
    fn replace_resting_stop(&mut self, decision: &mut EngineDecision) {
        if self.settings.protection_mode != ProtectionMode::Resting
            || self.state != LifecycleState::Open
        {
            return;
        }
        if let Some(old) = self.orders.live_protective(ProtectiveKind::Stop).map(|o| o.id) {
            self.cancel(old, decision);
        }
        self.place_protective(ProtectiveKind::Stop, decision);
    }

    fn place_protective(&mut self, kind: ProtectiveKind, decision: &mut EngineDecision) {
        let (Some(levels), Some(side)) = (self.levels.as_ref(), self.tracker.side()) else {
            return;
        };
        let level = match kind {
            ProtectiveKind::Stop => levels.stop_price,
            ProtectiveKind::Take => levels.take_price,
        };
        let Some(level) = level else {
            return;
        };

        let (Ok(price), Ok(volume)) = (Price::new(level), Volume::new(self.tracker.abs_volume())) else {
            warn!(symbol = %self.symbol, ?kind, %level, "Protective level cannot be placed");
            return;
        };

        let order_type = match kind {
            ProtectiveKind::Stop => OrderType::Stop,
            ProtectiveKind::Take => OrderType::Limit,
        };
        let request = OrderRequest {
            symbol: self.symbol.clone(),
            side: side.exit_action(),
            volume,
            order_type,
            price: Some(price),
        };
        let order = Order::new(request, OrderRole::Protective { kind });
        debug!(symbol = %self.symbol, order_id = %order.id, ?kind, %price, "Placing resting protective order");
        self.place(order, decision);
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Cancel every outstanding order without waiting for confirmation
    ///
    /// Orders are marked cancelled locally; a late fill is still applied.
    /// The position itself is left as is.
    pub fn shutdown(&mut self) -> EngineDecision {
        let mut decision = EngineDecision::none();

        let live = self.orders.live_ids_where(|_| true);
        let count = live.len();
        for order_id in live {
            self.cancel(order_id, &mut decision);
        }

        self.pending_tiers.clear();
        self.state = if self.tracker.is_flat() {
            LifecycleState::Flat
        } else {
            LifecycleState::Open
        };

        info!(
            symbol = %self.symbol,
            cancelled = count,
            net = %self.tracker.net_volume(),
            "Engine shut down"
        );
        decision
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn place(&mut self, order: Order, decision: &mut EngineDecision) {
        self.orders.submit(order.clone());
        decision.actions.push(EngineAction::PlaceOrder(order));
    }

    fn cancel(&mut self, order_id: OrderId, decision: &mut EngineDecision) {
        if let Some(order) = self.orders.mark_cancelled(order_id) {
            decision.actions.push(EngineAction::CancelOrder {
                order_id,
                symbol: order.symbol.clone(),
                role: order.role,
            });
        }
    }

    fn skip(&self, reason: SkipReason, decision: &mut EngineDecision) {
        debug!(symbol = %self.symbol, ?reason, "Order skipped");
        decision.emit(Event::VolumeSkipped {
            symbol: self.symbol.clone(),
            reason,
            timestamp: Utc::now(),
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
