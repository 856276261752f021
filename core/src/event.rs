//! Audit events: one per committed desk mutation.
//!
//! Events are appended to event_log inside the same SQLite transaction as
//! the change they describe. They are a record, never an input:
//! aggregates are always rebuilt from transactions, not replayed events.

use crate::{
    ledger::AccountVector,
    types::{Amount, CaseId, EstablishmentCode, TxnId},
};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeskEvent {
    CaseCreated {
        case_id: CaseId,
        establishment_code: EstablishmentCode,
        case_number: String,
        basis: String,
        demand_total: Amount,
    },
    DemandEdited {
        case_id: CaseId,
        fields: Vec<String>,
        basis: String,
        demand_total: Amount,
    },
    CaseDeleted {
        case_id: CaseId,
    },
    RecoveryCostSet {
        establishment_code: EstablishmentCode,
        charged: Amount,
        received: Amount,
        cases_updated: usize,
    },

    // ── Transactions ───────────────────────────────
    TransactionSubmitted {
        case_id: CaseId,
        txn_id: TxnId,
        amount: Amount,
        cost_only: Amount,
        manual: bool,
        allocation: AccountVector,
    },
    TransactionEdited {
        case_id: CaseId,
        txn_id: TxnId,
        amount: Amount,
        cost_only: Amount,
        manual: bool,
        allocation: AccountVector,
        previous_allocation: AccountVector,
    },
    TransactionDeleted {
        case_id: CaseId,
        txn_id: TxnId,
        amount: Amount,
    },
}

impl DeskEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            DeskEvent::CaseCreated { .. } => "case_created",
            DeskEvent::DemandEdited { .. } => "demand_edited",
            DeskEvent::CaseDeleted { .. } => "case_deleted",
            DeskEvent::RecoveryCostSet { .. } => "recovery_cost_set",
            DeskEvent::TransactionSubmitted { .. } => "transaction_submitted",
            DeskEvent::TransactionEdited { .. } => "transaction_edited",
            DeskEvent::TransactionDeleted { .. } => "transaction_deleted",
        }
    }

    /// The case this event belongs to, if it is case-scoped.
    pub fn case_id(&self) -> Option<CaseId> {
        match self {
            DeskEvent::CaseCreated { case_id, .. }
            | DeskEvent::DemandEdited { case_id, .. }
            | DeskEvent::CaseDeleted { case_id }
            | DeskEvent::TransactionSubmitted { case_id, .. }
            | DeskEvent::TransactionEdited { case_id, .. }
            | DeskEvent::TransactionDeleted { case_id, .. } => Some(*case_id),
            DeskEvent::RecoveryCostSet { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let e = DeskEvent::TransactionDeleted {
            case_id: 4,
            txn_id: "t-1".into(),
            amount: 1_500,
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "transaction_deleted");
        assert_eq!(json["case_id"], 4);
        assert_eq!(e.type_name(), "transaction_deleted");
    }

    #[test]
    fn cost_events_are_establishment_scoped() {
        let e = DeskEvent::RecoveryCostSet {
            establishment_code: "EST-1".into(),
            charged: 10,
            received: 0,
            cases_updated: 2,
        };
        assert_eq!(e.case_id(), None);
    }
}
