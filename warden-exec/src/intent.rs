//! Intent journal for idempotent execution.
//!
//! Every gateway call is recorded as an intent before it is made and
//! completed with its result afterwards. Submissions are keyed by the
//! engine's order id, so replaying a decision never submits twice.
//!
//! # Flow
//!
//! 1. Record intent (before execution)
//! 2. Execute action (submit, cancel)
//! 3. Complete intent (with result)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use warden_domain::{OrderId, OrderRequest, OrderRole, Symbol};

use crate::error::{ExecError, ExecResult};
use crate::ports::GatewayAck;

// =============================================================================
// Intent Types
// =============================================================================

/// A gateway call, recorded before it is made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    /// Intent identifier (the order id for submissions)
    pub id: Uuid,
    /// Instrument
    pub symbol: Symbol,
    /// The gateway call
    pub action: IntentAction,
    /// Current status
    pub status: IntentStatus,
    /// When the intent was created
    pub created_at: DateTime<Utc>,
    /// When the intent was completed (if completed)
    pub completed_at: Option<DateTime<Utc>>,
    /// Result of execution (if completed)
    pub result: Option<IntentResult>,
}

impl Intent {
    /// Create a new pending intent.
    pub fn new(id: Uuid, symbol: Symbol, action: IntentAction) -> Self {
        Self {
            id,
            symbol,
            action,
            status: IntentStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
        }
    }

    /// Check if intent is still pending.
    pub fn is_pending(&self) -> bool {
        matches!(self.status, IntentStatus::Pending)
    }

    /// Check if intent was successful.
    pub fn is_success(&self) -> bool {
        matches!(self.status, IntentStatus::Completed)
            && matches!(self.result, Some(IntentResult::Submitted(_) | IntentResult::Cancelled))
    }
}

/// Gateway calls that can be recorded as intents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IntentAction {
    /// Submit an order
    Submit {
        /// Order request
        request: OrderRequest,
        /// What the order is for
        role: OrderRole,
    },

    /// Cancel an order
    Cancel {
        /// Order to cancel
        order_id: OrderId,
    },
}

/// Status of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentStatus {
    /// Intent recorded, not yet executed
    Pending,
    /// Execution in progress
    Executing,
    /// Execution completed (check result for success/failure)
    Completed,
}

/// Result of intent execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IntentResult {
    /// Order accepted by the gateway
    Submitted(GatewayAck),
    /// Cancel acknowledged
    Cancelled,
    /// Gateway call failed
    Failed(String),
    /// Intent was skipped without calling the gateway
    Skipped(String),
}

// =============================================================================
// Intent Journal
// =============================================================================

/// Journal for tracking intents and ensuring idempotent execution.
///
/// In-memory only; nothing survives a restart.
pub struct IntentJournal {
    intents: RwLock<HashMap<Uuid, Intent>>,
}

impl IntentJournal {
    /// Create a new intent journal.
    pub fn new() -> Self {
        Self {
            intents: RwLock::new(HashMap::new()),
        }
    }

    /// Record a new intent before execution.
    ///
    /// Returns error if intent with same ID already exists.
    pub fn record(&self, intent: Intent) -> ExecResult<()> {
        let mut intents = self.intents.write().map_err(|e| {
            ExecError::IntentJournal(format!("Failed to acquire write lock: {}", e))
        })?;

        if intents.contains_key(&intent.id) {
            return Err(ExecError::AlreadyProcessed(intent.id));
        }

        intents.insert(intent.id, intent);
        Ok(())
    }

    /// Check if intent exists and get its current state.
    pub fn get(&self, intent_id: Uuid) -> ExecResult<Option<Intent>> {
        let intents = self.intents.read().map_err(|e| {
            ExecError::IntentJournal(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(intents.get(&intent_id).cloned())
    }

    /// Check if intent was already processed (completed or executing).
    pub fn is_processed(&self, intent_id: Uuid) -> ExecResult<bool> {
        let intents = self.intents.read().map_err(|e| {
            ExecError::IntentJournal(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(intents.get(&intent_id).map(|i| !i.is_pending()).unwrap_or(false))
    }

    /// Mark intent as executing.
    pub fn mark_executing(&self, intent_id: Uuid) -> ExecResult<()> {
        let mut intents = self.intents.write().map_err(|e| {
            ExecError::IntentJournal(format!("Failed to acquire write lock: {}", e))
        })?;

        let intent = intents.get_mut(&intent_id).ok_or_else(|| {
            ExecError::IntentJournal(format!("Intent not found: {}", intent_id))
        })?;

        intent.status = IntentStatus::Executing;
        Ok(())
    }

    /// Complete an intent with result.
    pub fn complete(&self, intent_id: Uuid, result: IntentResult) -> ExecResult<()> {
        let mut intents = self.intents.write().map_err(|e| {
            ExecError::IntentJournal(format!("Failed to acquire write lock: {}", e))
        })?;

        let intent = intents.get_mut(&intent_id).ok_or_else(|| {
            ExecError::IntentJournal(format!("Intent not found: {}", intent_id))
        })?;

        intent.status = IntentStatus::Completed;
        intent.completed_at = Some(Utc::now());
        intent.result = Some(result);

        Ok(())
    }

    /// Get all pending intents.
    pub fn get_pending(&self) -> ExecResult<Vec<Intent>> {
        let intents = self.intents.read().map_err(|e| {
            ExecError::IntentJournal(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(intents.values().filter(|i| i.is_pending()).cloned().collect())
    }

    /// Get intents for a specific instrument, oldest first.
    pub fn get_by_symbol(&self, symbol: &Symbol) -> ExecResult<Vec<Intent>> {
        let intents = self.intents.read().map_err(|e| {
            ExecError::IntentJournal(format!("Failed to acquire read lock: {}", e))
        })?;

        let mut matching: Vec<Intent> =
            intents.values().filter(|i| &i.symbol == symbol).cloned().collect();
        matching.sort_by_key(|i| i.created_at);
        Ok(matching)
    }

    /// Number of recorded intents.
    pub fn len(&self) -> usize {
        self.intents.read().map(|i| i.len()).unwrap_or(0)
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IntentJournal {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use warden_domain::{OrderSide, Volume};

    fn symbol() -> Symbol {
        Symbol::new("BTCUSDT").unwrap()
    }

    fn create_test_intent() -> Intent {
        Intent::new(
            Uuid::now_v7(),
            symbol(),
            IntentAction::Submit {
                request: OrderRequest::market(symbol(), OrderSide::Buy, Volume::new(dec!(0.1)).unwrap()),
                role: OrderRole::Entry,
            },
        )
    }

    #[test]
    fn test_record_and_get() {
        let journal = IntentJournal::new();
        let intent = create_test_intent();
        let id = intent.id;

        journal.record(intent).unwrap();

        let retrieved = journal.get(id).unwrap().unwrap();
        assert_eq!(retrieved.id, id);
        assert!(retrieved.is_pending());
    }

    #[test]
    fn test_duplicate_intent_rejected() {
        let journal = IntentJournal::new();
        let intent = create_test_intent();
        let id = intent.id;

        journal.record(intent).unwrap();

        let result = journal.record(Intent::new(id, symbol(), IntentAction::Cancel { order_id: id }));
        assert!(matches!(result, Err(ExecError::AlreadyProcessed(dup)) if dup == id));
    }

    #[test]
    fn test_complete_intent() {
        let journal = IntentJournal::new();
        let intent = create_test_intent();
        let id = intent.id;

        journal.record(intent).unwrap();
        journal.mark_executing(id).unwrap();

        let ack = GatewayAck {
            exchange_order_id: "STUB-1".to_string(),
            client_order_id: id,
            accepted_at: Utc::now(),
        };
        journal.complete(id, IntentResult::Submitted(ack)).unwrap();

        let completed = journal.get(id).unwrap().unwrap();
        assert!(!completed.is_pending());
        assert!(completed.is_success());
        assert!(completed.completed_at.is_some());
    }

    #[test]
    fn test_is_processed() {
        let journal = IntentJournal::new();
        let intent = create_test_intent();
        let id = intent.id;

        assert!(!journal.is_processed(id).unwrap());

        journal.record(intent).unwrap();
        assert!(!journal.is_processed(id).unwrap());

        journal.mark_executing(id).unwrap();
        assert!(journal.is_processed(id).unwrap());
    }

    #[test]
    fn test_get_pending_and_by_symbol() {
        let journal = IntentJournal::new();

        let intent1 = create_test_intent();
        let intent2 = create_test_intent();
        let id1 = intent1.id;

        journal.record(intent1).unwrap();
        journal.record(intent2).unwrap();
        assert_eq!(journal.get_pending().unwrap().len(), 2);

        journal.mark_executing(id1).unwrap();
        journal.complete(id1, IntentResult::Failed("rejected".to_string())).unwrap();

        assert_eq!(journal.get_pending().unwrap().len(), 1);
        assert_eq!(journal.get_by_symbol(&symbol()).unwrap().len(), 2);
        assert!(!journal.get(id1).unwrap().unwrap().is_success());
    }
}
