use crate::{
    allocation::AllocationProposal,
    desk::{DemandEdit, NewCase, RecoveryDesk, TransactionReceipt, TransactionRequest},
    error::DeskResult,
    establishment::EstablishmentSummary,
    reconciliation::CaseAggregates,
    store::{EventLogEntry, RecoveryTransaction},
    types::{Amount, CaseId, EstablishmentCode, TxnId},
};
use serde::{Deserialize, Serialize};

/// All operator-issued commands.
/// Variants are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DeskCommand {
    // ── Cases ─────────────────────────────────────
    CreateCase(NewCase),
    EditDemand {
        case_id: CaseId,
        #[serde(flatten)]
        edit: DemandEdit,
    },
    DeleteCase {
        case_id: CaseId,
    },
    SetRecoveryCost {
        establishment_code: EstablishmentCode,
        charged: Amount,
        received: Amount,
    },
    Recompute {
        case_id: CaseId,
    },

    // ── Transactions ──────────────────────────────
    SubmitTransaction(TransactionRequest),
    EditTransaction {
        txn_id: TxnId,
        request: TransactionRequest,
    },
    DeleteTransaction {
        txn_id: TxnId,
    },

    // ── Reads ─────────────────────────────────────
    PreviewAllocation {
        case_id: CaseId,
        amount: Amount,
        #[serde(default)]
        cost_only: Amount,
    },
    ReadCase {
        case_id: CaseId,
    },
    FindCase {
        establishment_code: EstablishmentCode,
        case_number: String,
    },
    ListTransactions {
        case_id: CaseId,
    },
    ReadEstablishment {
        establishment_code: EstablishmentCode,
    },
    ListEstablishments,
    CaseEvents {
        case_id: CaseId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "data", rename_all = "snake_case")]
pub enum DeskReply {
    Case(CaseAggregates),
    Deleted,
    Establishment(EstablishmentSummary),
    Establishments(Vec<EstablishmentCode>),
    Receipt(Box<TransactionReceipt>),
    Proposal(AllocationProposal),
    Transactions(Vec<RecoveryTransaction>),
    Events(Vec<EventLogEntry>),
}

impl RecoveryDesk {
    /// Dispatch one command to the matching desk operation.
    pub fn execute(&mut self, command: DeskCommand) -> DeskResult<DeskReply> {
        log::debug!("execute: {command:?}");
        let reply = match command {
            DeskCommand::CreateCase(req) => DeskReply::Case(self.create_case(&req)?),
            DeskCommand::EditDemand { case_id, edit } => {
                DeskReply::Case(self.edit_demand(case_id, &edit)?)
            }
            DeskCommand::DeleteCase { case_id } => {
                self.delete_case(case_id)?;
                DeskReply::Deleted
            }
            DeskCommand::SetRecoveryCost {
                establishment_code,
                charged,
                received,
            } => DeskReply::Establishment(self.set_recovery_cost(
                &establishment_code,
                charged,
                received,
            )?),
            DeskCommand::Recompute { case_id } => DeskReply::Case(self.recompute(case_id)?),
            DeskCommand::SubmitTransaction(req) => {
                DeskReply::Receipt(Box::new(self.submit_transaction(&req)?))
            }
            DeskCommand::EditTransaction { txn_id, request } => {
                DeskReply::Receipt(Box::new(self.edit_transaction(&txn_id, &request)?))
            }
            DeskCommand::DeleteTransaction { txn_id } => {
                DeskReply::Case(self.delete_transaction(&txn_id)?)
            }
            DeskCommand::PreviewAllocation {
                case_id,
                amount,
                cost_only,
            } => DeskReply::Proposal(self.preview_allocation(case_id, amount, cost_only)?),
            DeskCommand::ReadCase { case_id } => DeskReply::Case(self.read_case(case_id)?),
            DeskCommand::FindCase {
                establishment_code,
                case_number,
            } => DeskReply::Case(self.find_case(&establishment_code, &case_number)?),
            DeskCommand::ListTransactions { case_id } => {
                DeskReply::Transactions(self.list_transactions(case_id)?)
            }
            DeskCommand::ReadEstablishment { establishment_code } => {
                DeskReply::Establishment(self.read_establishment(&establishment_code)?)
            }
            DeskCommand::ListEstablishments => {
                DeskReply::Establishments(self.list_establishments()?)
            }
            DeskCommand::CaseEvents { case_id } => {
                DeskReply::Events(self.events_for_case(case_id)?)
            }
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> DeskCommand {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn commands_parse_from_tagged_json() {
        let cmd = parse(
            r#"{"cmd":"create_case","establishment_code":"EST-1","case_number":"7A/01",
                "basis":"A+C","demand":{"A1":50000}}"#,
        );
        assert!(matches!(cmd, DeskCommand::CreateCase(ref c) if c.case_number == "7A/01"));

        let cmd = parse(r#"{"cmd":"edit_demand","case_id":3,"fields":{"a1_demand":null}}"#);
        match cmd {
            DeskCommand::EditDemand { case_id, edit } => {
                assert_eq!(case_id, 3);
                assert_eq!(edit.fields.get("a1_demand"), Some(&None));
                assert!(edit.basis.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }

        let cmd = parse(r#"{"cmd":"preview_allocation","case_id":1,"amount":900}"#);
        assert!(matches!(
            cmd,
            DeskCommand::PreviewAllocation { cost_only: 0, amount: 900, .. }
        ));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<DeskCommand>(r#"{"cmd":"drop_tables"}"#).is_err());
    }

    #[test]
    fn execute_routes_to_the_desk() {
        let mut desk = RecoveryDesk::in_memory_test().unwrap();
        let reply = desk
            .execute(parse(
                r#"{"cmd":"create_case","establishment_code":"EST-1","case_number":"C-1",
                    "basis":"A","demand":{"A1":1000}}"#,
            ))
            .unwrap();
        let case_id = match reply {
            DeskReply::Case(agg) => agg.case_id(),
            other => panic!("unexpected {other:?}"),
        };

        let reply = desk.execute(DeskCommand::ListEstablishments).unwrap();
        assert_eq!(reply, DeskReply::Establishments(vec!["EST-1".to_string()]));

        let reply = desk.execute(DeskCommand::DeleteCase { case_id }).unwrap();
        assert_eq!(reply, DeskReply::Deleted);
        assert!(desk.execute(DeskCommand::ReadCase { case_id }).is_err());
    }

    #[test]
    fn replies_carry_tag_and_data() {
        let json = serde_json::to_value(DeskReply::Deleted).unwrap();
        assert_eq!(json["reply"], "deleted");
    }
}
