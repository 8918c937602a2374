//! Executor: Orchestrates engine decisions to gateway calls.
//!
//! The Executor is the bridge between the pure Engine (decisions) and
//! the impure gateway (I/O). It ensures idempotent execution via the
//! intent journal and serializes protective order replacement.
//!
//! # Flow
//!
//! ```text
//! Engine Decision → Executor → Intent Journal → Gateway → Result
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use warden_domain::{Event, Order, OrderId, OrderRole, ProtectiveKind, Symbol};
use warden_engine::{EngineAction, EngineDecision};

use crate::error::{ExecError, ExecResult};
use crate::intent::{Intent, IntentAction, IntentJournal, IntentResult};
use crate::ports::{GatewayAck, OrderGateway};

// =============================================================================
// Execution Result
// =============================================================================

/// Result of executing an engine action.
#[derive(Debug, Clone)]
pub enum ActionResult {
    /// Order accepted by the gateway
    Submitted(GatewayAck),
    /// Order refused by the gateway; it never existed
    Rejected {
        /// Refused order
        order_id: OrderId,
        /// Gateway explanation
        reason: String,
    },
    /// Cancel acknowledged
    Cancelled(OrderId),
    /// Cancel failed; the order may still be live
    CancelFailed {
        /// Order that could not be cancelled
        order_id: OrderId,
        /// Gateway explanation
        reason: String,
    },
    /// Protective replacement not submitted because the previous order of
    /// the same kind could not be cancelled
    SkippedReplacement(OrderId),
    /// Event emitted (no gateway interaction)
    EventEmitted(Event),
    /// Order already submitted (idempotent skip)
    AlreadyProcessed(OrderId),
}

impl ActionResult {
    /// Order the engine must treat as rejected
    pub fn rejected_order(&self) -> Option<OrderId> {
        match self {
            ActionResult::Rejected { order_id, .. } => Some(*order_id),
            ActionResult::SkippedReplacement(order_id) => Some(*order_id),
            _ => None,
        }
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Executes engine actions with idempotency guarantees.
///
/// The Executor:
/// 1. Receives actions from the Engine, in order
/// 2. Records intents before execution
/// 3. Executes via the gateway port
/// 4. Records results for audit trail
///
/// Gateway failures do not abort the batch: they are reported per action
/// so the engine can roll back. Journal failures do.
pub struct Executor<G: OrderGateway> {
    /// Gateway port for routing orders
    gateway: Arc<G>,
    /// Intent journal for idempotency
    journal: Arc<IntentJournal>,
}

impl<G: OrderGateway> Executor<G> {
    /// Create a new executor.
    pub fn new(gateway: Arc<G>, journal: Arc<IntentJournal>) -> Self {
        Self { gateway, journal }
    }

    /// Execute every action of a decision, in order.
    pub async fn execute(&self, decision: EngineDecision) -> ExecResult<Vec<ActionResult>> {
        let mut results = Vec::with_capacity(decision.actions.len());
        let mut failed_cancels: HashSet<ProtectiveKind> = HashSet::new();

        for action in decision.actions {
            let result = self.execute_action(action, &mut failed_cancels).await?;
            results.push(result);
        }

        Ok(results)
    }

    async fn execute_action(
        &self,
        action: EngineAction,
        failed_cancels: &mut HashSet<ProtectiveKind>,
    ) -> ExecResult<ActionResult> {
        match action {
            EngineAction::PlaceOrder(order) => {
                if let OrderRole::Protective { kind } = order.role {
                    if failed_cancels.contains(&kind) {
                        return self.skip_replacement(order, kind);
                    }
                }
                self.submit_order(order).await
            },

            EngineAction::CancelOrder { order_id, symbol, role } => {
                let result = self.cancel_order(order_id, symbol, role).await?;
                if let (ActionResult::CancelFailed { .. }, OrderRole::Protective { kind }) =
                    (&result, role)
                {
                    failed_cancels.insert(kind);
                }
                Ok(result)
            },

            EngineAction::EmitEvent(event) => {
                debug!(
                    symbol = %event.symbol(),
                    event_type = event.event_type(),
                    "Emitting event"
                );
                Ok(ActionResult::EventEmitted(event))
            },
        }
    }

    /// Submit an order with idempotency.
    async fn submit_order(&self, order: Order) -> ExecResult<ActionResult> {
        let order_id = order.id;

        // 1. Check idempotency (order id is the intent ID)
        if self.journal.is_processed(order_id)? {
            info!(%order_id, "Order already submitted, skipping");
            return Ok(ActionResult::AlreadyProcessed(order_id));
        }

        // 2. Record intent
        let request = order.request();
        let intent = Intent::new(
            order_id,
            order.symbol.clone(),
            IntentAction::Submit { request: request.clone(), role: order.role },
        );
        match self.journal.record(intent) {
            Ok(()) | Err(ExecError::AlreadyProcessed(_)) => {},
            Err(e) => return Err(e),
        }

        // 3. Mark as executing
        self.journal.mark_executing(order_id)?;

        info!(
            %order_id,
            symbol = %order.symbol,
            side = %order.side,
            volume = %order.volume,
            order_type = ?order.order_type,
            role = ?order.role,
            "Submitting order"
        );

        // 4. Execute on gateway
        match self.gateway.submit(&request, order_id).await {
            Ok(ack) => {
                debug!(%order_id, exchange_order_id = %ack.exchange_order_id, "Order accepted");
                self.journal.complete(order_id, IntentResult::Submitted(ack.clone()))?;
                Ok(ActionResult::Submitted(ack))
            },
            Err(e) => {
                error!(%order_id, error = %e, "Order submission failed");
                self.journal.complete(order_id, IntentResult::Failed(e.to_string()))?;
                Ok(ActionResult::Rejected { order_id, reason: e.to_string() })
            },
        }
    }

    /// Cancel an order, journaled under a fresh intent id.
    async fn cancel_order(
        &self,
        order_id: OrderId,
        symbol: Symbol,
        role: OrderRole,
    ) -> ExecResult<ActionResult> {
        let intent_id = Uuid::now_v7();
        self.journal
            .record(Intent::new(intent_id, symbol.clone(), IntentAction::Cancel { order_id }))?;
        self.journal.mark_executing(intent_id)?;

        debug!(%order_id, %symbol, ?role, "Cancelling order");

        match self.gateway.cancel(&symbol, order_id).await {
            Ok(()) => {
                self.journal.complete(intent_id, IntentResult::Cancelled)?;
                Ok(ActionResult::Cancelled(order_id))
            },
            Err(e) => {
                warn!(%order_id, %symbol, ?role, error = %e, "Cancel failed");
                self.journal.complete(intent_id, IntentResult::Failed(e.to_string()))?;
                Ok(ActionResult::CancelFailed { order_id, reason: e.to_string() })
            },
        }
    }

    fn skip_replacement(&self, order: Order, kind: ProtectiveKind) -> ExecResult<ActionResult> {
        warn!(
            order_id = %order.id,
            symbol = %order.symbol,
            ?kind,
            "Previous protective order still live, replacement not submitted"
        );
        self.journal.record(Intent::new(
            order.id,
            order.symbol.clone(),
            IntentAction::Submit { request: order.request(), role: order.role },
        ))?;
        self.journal.complete(
            order.id,
            IntentResult::Skipped("previous protective order not cancelled".to_string()),
        )?;
        Ok(ActionResult::SkippedReplacement(order.id))
    }

    /// Get the intent journal (for inspection).
    pub fn journal(&self) -> &IntentJournal {
        &self.journal
    }

    /// Get the gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}

// =============================================================================
// Tests
// =============================================================================
