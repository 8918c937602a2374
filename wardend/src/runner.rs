//! Strategy runner: one engine, one executor, one input channel.
//!
//! The runner is the only owner of its engine. Inputs are handled one at a
//! time; gateway updates already delivered are applied before the next
//! input so risk levels always see the true position. Rejections the
//! executor reports synchronously are fed back before returning.
//!
//! With a simulated venue attached through [`MarketDataPort`], each bar or
//! quote reaches the venue first, so fills it causes are applied before
//! the engine evaluates the same bar.
//!
//! # Flow
//!
//! ```text
//! stdin / feeds ──► mpsc ──► StrategyRunner ──► Engine ──► Executor ──► Gateway
//!                                 ▲                                      │
//!                                 └──────── order updates ◄──────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use warden_domain::OrderUpdate;
use warden_engine::{Engine, EngineDecision};
use warden_exec::{ActionResult, Executor, MarketDataPort, OrderGateway};

use crate::error::DaemonResult;
use crate::event_bus::{DaemonEvent, EventBus};

/// Drives one engine from its inputs.
pub struct StrategyRunner<G: OrderGateway> {
    engine: Engine,
    executor: Executor<G>,
    updates: mpsc::UnboundedReceiver<OrderUpdate>,
    event_bus: Arc<EventBus>,
    market: Option<Arc<dyn MarketDataPort>>,
}

/// Rejection feedback rounds before giving up on a decision
const MAX_FEEDBACK_ROUNDS: usize = 4;

enum Next {
    Update(OrderUpdate),
    Input(Option<DaemonEvent>),
}

impl<G: OrderGateway> StrategyRunner<G> {
    /// Create a runner.
    ///
    /// `updates` is the gateway's order update stream.
    pub fn new(
        engine: Engine,
        executor: Executor<G>,
        updates: mpsc::UnboundedReceiver<OrderUpdate>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            engine,
            executor,
            updates,
            event_bus,
            market: None,
        }
    }

    /// Forward candles and quotes to a simulated venue.
    pub fn with_market_data(mut self, market: Arc<dyn MarketDataPort>) -> Self {
        self.market = Some(market);
        self
    }

    /// The engine (read-only).
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The executor.
    pub fn executor(&self) -> &Executor<G> {
        &self.executor
    }

    /// Run until the input channel closes or a `Shutdown` input arrives.
    ///
    /// Outstanding orders are cancelled on the way out.
    pub async fn run(mut self, mut inputs: mpsc::Receiver<DaemonEvent>) -> DaemonResult<Engine> {
        info!(symbol = %self.engine.symbol(), "Strategy runner started");

        loop {
            let next = tokio::select! {
                biased;
                Some(update) = self.updates.recv() => Next::Update(update),
                input = inputs.recv() => Next::Input(input),
            };

            match next {
                Next::Update(update) => self.apply_update(update).await?,
                Next::Input(Some(DaemonEvent::Shutdown)) | Next::Input(None) => break,
                Next::Input(Some(input)) => {
                    self.drain_updates().await?;
                    self.handle(input).await?;
                },
            }
        }

        self.shutdown().await?;
        Ok(self.engine)
    }

    /// Handle one input.
    pub async fn handle(&mut self, input: DaemonEvent) -> DaemonResult<()> {
        debug!(kind = input.kind(), "Handling input");

        if let Some(market) = self.market.clone() {
            match &input {
                DaemonEvent::Candle(candle) => market.on_candle(candle).await?,
                DaemonEvent::Quote(quote) => market.on_quote(quote).await?,
                _ => {},
            }
            self.drain_updates().await?;
        }

        let decision = match input {
            DaemonEvent::Candle(candle) => self.engine.on_candle(&candle),
            DaemonEvent::Quote(quote) => self.engine.on_quote(&quote),
            DaemonEvent::Signal { intent, reference_price } => {
                self.engine.on_signal(intent, reference_price)
            },
            DaemonEvent::OrderUpdate(update) => self.engine.on_order_update(update),
            DaemonEvent::Shutdown => self.engine.shutdown(),
        };

        self.apply(decision).await
    }

    /// Apply every gateway update already delivered.
    pub async fn drain_updates(&mut self) -> DaemonResult<()> {
        while let Ok(update) = self.updates.try_recv() {
            self.apply_update(update).await?;
        }
        Ok(())
    }

    /// Cancel everything outstanding.
    pub async fn shutdown(&mut self) -> DaemonResult<()> {
        let decision = self.engine.shutdown();
        self.apply(decision).await?;
        info!(
            symbol = %self.engine.symbol(),
            net = %self.engine.tracker().net_volume(),
            "Strategy runner stopped"
        );
        Ok(())
    }

    async fn apply_update(&mut self, update: OrderUpdate) -> DaemonResult<()> {
        let decision = self.engine.on_order_update(update);
        self.apply(decision).await
    }

    /// Execute a decision and feed synchronous failures back until the
    /// engine has nothing more to say.
    async fn apply(&mut self, decision: EngineDecision) -> DaemonResult<()> {
        let mut pending = decision;

        for round in 0.. {
            if pending.is_empty() {
                break;
            }
            if round == MAX_FEEDBACK_ROUNDS {
                warn!(
                    symbol = %self.engine.symbol(),
                    dropped = pending.actions.len(),
                    "Gateway keeps refusing, follow-up actions dropped"
                );
                break;
            }

            let results = self.executor.execute(pending).await?;
            let mut follow_up = EngineDecision::none();

            for result in results {
                match result {
                    ActionResult::EventEmitted(event) => {
                        self.event_bus.publish(event);
                    },
                    ActionResult::CancelFailed { order_id, .. } => {
                        self.engine.on_cancel_failed(order_id);
                    },
                    ref other => {
                        if let Some(order_id) = other.rejected_order() {
                            warn!(%order_id, "Order did not reach the gateway, rolling back");
                            follow_up.extend(self.engine.on_order_update(OrderUpdate::rejected(order_id)));
                        }
                    },
                }
            }

            pending = follow_up;
        }

        Ok(())
    }
}
