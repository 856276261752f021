//! The recovery desk: every operation an outer layer may invoke.
//!
//! WRITE PATH (fixed, every mutating operation):
//!   1. Open an IMMEDIATE store transaction (write lock held from here).
//!   2. Validate against the live case and its current transaction set.
//!   3. Write the change.
//!   4. Reconcile the affected case(s) from the full live transaction set
//!      and persist the aggregates.
//!   5. Append the audit event.
//!   6. Commit. Any error before this rolls everything back.
//!
//! RULES:
//!   - Derived figures come only from reconciliation::reconcile.
//!   - Reads return persisted aggregates; they never recompute.
//!   - One desk is single-writer (`&mut self`); across processes SQLite's
//!     write lock serializes writers.

use crate::{
    allocation::{propose_allocation, settle_remainder, validate_manual, AllocationProposal},
    config::DeskConfig,
    error::{DeskError, DeskResult},
    establishment::{aggregate, EstablishmentSummary},
    event::DeskEvent,
    ledger::AccountVector,
    reconciliation::{reconcile, CaseAggregates, RawDemand, RecoveryCost},
    schema::{LedgerField, Mutability, StatutoryBasis, SubAccount},
    store::{CaseRow, CaseStore, EventLogEntry, NewCaseRow, RecoveryTransaction},
    types::{format_amount, Amount, CaseId, EstablishmentCode},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ── Requests and replies ─────────────────────────────────────────

/// Demand intake for a new case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCase {
    pub establishment_code: EstablishmentCode,
    pub case_number: String,
    pub basis: StatutoryBasis,
    /// Demand per sub-account; only applicable sections may be nonzero.
    #[serde(default)]
    pub demand: AccountVector,
}

/// Operator correction of demand fields, addressed by ledger field name
/// (`a1_demand`). `null` clears a field. An optional new basis is applied
/// first; demand under sections it drops is cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemandEdit {
    #[serde(default)]
    pub fields: BTreeMap<String, Option<Amount>>,
    #[serde(default)]
    pub basis: Option<StatutoryBasis>,
}

/// Submit or edit a recovery transaction.
/// Without `allocation` the waterfall proposes one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub case_id: CaseId,
    pub amount: Amount,
    #[serde(default)]
    pub allocation: Option<AccountVector>,
    #[serde(default)]
    pub cost_only: Option<Amount>,
    pub date: NaiveDate,
    pub reference: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction: RecoveryTransaction,
    pub case: CaseAggregates,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

// ── Desk ─────────────────────────────────────────────────────────

pub struct RecoveryDesk {
    pub store: CaseStore,
    config: DeskConfig,
}

impl RecoveryDesk {
    pub fn new(store: CaseStore, config: DeskConfig) -> Self {
        Self { store, config }
    }

    /// Open (or create) the database at `path` and apply migrations.
    pub fn open(path: &str, config: DeskConfig) -> DeskResult<Self> {
        let store = CaseStore::open(path, config.busy_timeout_ms)?;
        store.migrate()?;
        Ok(Self::new(store, config))
    }

    /// Migrated in-memory desk with DeskConfig::default_test().
    pub fn in_memory_test() -> DeskResult<Self> {
        let store = CaseStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, DeskConfig::default_test()))
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    // ── Cases ────────────────────────────────────────────────────

    pub fn create_case(&mut self, req: &NewCase) -> DeskResult<CaseAggregates> {
        let code = req.establishment_code.trim();
        let number = req.case_number.trim();
        if code.is_empty() {
            return Err(DeskError::validation("establishment_code", "must not be empty"));
        }
        if number.is_empty() {
            return Err(DeskError::validation("case_number", "must not be empty"));
        }
        let demand = intake_demand(&req.demand, req.basis)?;

        let now = now();
        let tx = self.store.begin_write()?;
        if self.store.case_key_taken(code, number)? {
            return Err(DeskError::validation(
                "case_number",
                format!("case {number} already exists for establishment {code}"),
            ));
        }
        // New cases inherit the establishment's replicated cost ledger.
        let cost = self.store.establishment_cost(code)?.unwrap_or_default();
        let case_id = self.store.insert_case(&NewCaseRow {
            establishment_code: code,
            case_number: number,
            basis: req.basis,
            demand: &demand,
            cost,
            created_at: &now,
        })?;
        let agg = self.recompute_in_tx(case_id, &now)?;
        self.record(
            code,
            DeskEvent::CaseCreated {
                case_id,
                establishment_code: code.to_string(),
                case_number: number.to_string(),
                basis: req.basis.tag(),
                demand_total: agg.demand_total,
            },
            &now,
        )?;
        tx.commit()?;

        log::info!(
            "case={case_id} created: establishment={code} number={number} basis={} demand={}",
            req.basis,
            format_amount(agg.demand_total)
        );
        Ok(agg)
    }

    pub fn edit_demand(
        &mut self,
        case_id: CaseId,
        edit: &DemandEdit,
    ) -> DeskResult<CaseAggregates> {
        let now = now();
        let tx = self.store.begin_write()?;
        let case = self.live_case(case_id)?;

        let basis = edit.basis.unwrap_or(case.header.basis);
        if basis != case.header.basis {
            self.check_basis_change(case_id, basis)?;
        }

        let mut demand = case.demand;
        for account in SubAccount::all() {
            let section = account.section();
            if !basis.applies(section) {
                demand.set(account, None);
            } else if !case.header.basis.applies(section) && demand.get(account).is_none() {
                demand.set(account, Some(0));
            }
        }
        for (name, value) in &edit.fields {
            let field = LedgerField::parse(name)?;
            if field.mutability() != Mutability::Operator {
                return Err(DeskError::validation(
                    name.as_str(),
                    "computed field; written only by reconciliation",
                ));
            }
            if !basis.applies(field.section()) {
                return Err(DeskError::validation(
                    name.as_str(),
                    format!("section {} does not apply (basis {basis})", field.section()),
                ));
            }
            if let Some(amount) = value {
                if *amount < 0 {
                    return Err(DeskError::validation(name.as_str(), "demand must not be negative"));
                }
            }
            demand.set(field.account, *value);
        }

        self.store.update_demand(case_id, &demand, basis, &now)?;
        let agg = self.recompute_in_tx(case_id, &now)?;
        self.record(
            &case.header.establishment_code,
            DeskEvent::DemandEdited {
                case_id,
                fields: edit.fields.keys().cloned().collect(),
                basis: basis.tag(),
                demand_total: agg.demand_total,
            },
            &now,
        )?;
        tx.commit()?;

        log::info!(
            "case={case_id} demand edited: {} field(s), basis={basis}, outstanding={}",
            edit.fields.len(),
            format_amount(agg.outstanding_total)
        );
        Ok(agg)
    }

    /// Soft-delete a case. Its transactions stay on file; the case drops
    /// out of establishment totals.
    pub fn delete_case(&mut self, case_id: CaseId) -> DeskResult<()> {
        let now = now();
        let tx = self.store.begin_write()?;
        let case = self.live_case(case_id)?;
        self.store.mark_case_deleted(case_id, &now)?;
        self.record(
            &case.header.establishment_code,
            DeskEvent::CaseDeleted { case_id },
            &now,
        )?;
        tx.commit()?;
        log::info!("case={case_id} deleted");
        Ok(())
    }

    /// Set the establishment's recovery cost ledger on all of its cases and
    /// reconcile each live one.
    pub fn set_recovery_cost(
        &mut self,
        establishment_code: &str,
        charged: Amount,
        received: Amount,
    ) -> DeskResult<EstablishmentSummary> {
        for (field, value) in [("charged", charged), ("received", received)] {
            if value < 0 {
                return Err(DeskError::validation(
                    format!("recovery_cost_{field}"),
                    "must not be negative",
                ));
            }
        }

        let now = now();
        let tx = self.store.begin_write()?;
        let case_ids = self.store.live_case_ids(establishment_code)?;
        if case_ids.is_empty() {
            return Err(DeskError::not_found("establishment", establishment_code));
        }
        let cases_updated = self.store.set_establishment_cost(
            establishment_code,
            RecoveryCost { charged, received },
            &now,
        )?;
        for case_id in &case_ids {
            self.recompute_in_tx(*case_id, &now)?;
        }
        self.record(
            establishment_code,
            DeskEvent::RecoveryCostSet {
                establishment_code: establishment_code.to_string(),
                charged,
                received,
                cases_updated,
            },
            &now,
        )?;
        tx.commit()?;

        log::info!(
            "establishment={establishment_code} recovery cost set: \
             charged={} received={} cases={cases_updated}",
            format_amount(charged),
            format_amount(received)
        );
        self.read_establishment(establishment_code)
    }

    /// Force a full reconciliation pass on one case.
    pub fn recompute(&mut self, case_id: CaseId) -> DeskResult<CaseAggregates> {
        let now = now();
        let tx = self.store.begin_write()?;
        let agg = self.recompute_in_tx(case_id, &now)?;
        tx.commit()?;
        Ok(agg)
    }

    // ── Transactions ─────────────────────────────────────────────

    pub fn submit_transaction(
        &mut self,
        req: &TransactionRequest,
    ) -> DeskResult<TransactionReceipt> {
        check_metadata(req)?;
        let now = now();
        let tx = self.store.begin_write()?;
        let case = self.live_case(req.case_id)?;

        let current = self.reconcile_excluding(&case, None)?;
        let (allocation, cost_only, manual) =
            self.resolve_allocation(&case, &current.outstanding, req)?;

        let transaction = RecoveryTransaction {
            txn_id: Uuid::new_v4().to_string(),
            case_id: req.case_id,
            amount: req.amount,
            cost_only,
            date: req.date,
            reference: req.reference.trim().to_string(),
            mode: req.mode.clone(),
            remarks: req.remarks.clone(),
            allocation,
            manual,
            deleted: false,
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        self.store.insert_txn(&transaction)?;
        let agg = self.recompute_in_tx(req.case_id, &now)?;
        self.record(
            &case.header.establishment_code,
            DeskEvent::TransactionSubmitted {
                case_id: req.case_id,
                txn_id: transaction.txn_id.clone(),
                amount: transaction.amount,
                cost_only,
                manual,
                allocation,
            },
            &now,
        )?;
        tx.commit()?;

        log::info!(
            "case={} txn={} submitted: amount={} manual={manual} outstanding={}",
            req.case_id,
            transaction.txn_id,
            format_amount(req.amount),
            format_amount(agg.outstanding_total)
        );
        Ok(TransactionReceipt {
            transaction,
            case: agg,
        })
    }

    /// Replace amount, allocation and metadata of an existing transaction.
    ///
    /// A proposed allocation is computed as if this transaction had never
    /// been booked, so its own earlier share is available again.
    pub fn edit_transaction(
        &mut self,
        txn_id: &str,
        req: &TransactionRequest,
    ) -> DeskResult<TransactionReceipt> {
        check_metadata(req)?;
        let now = now();
        let tx = self.store.begin_write()?;
        let existing = self
            .store
            .txn(txn_id)?
            .ok_or_else(|| DeskError::not_found("transaction", txn_id))?;
        if existing.case_id != req.case_id {
            return Err(DeskError::validation(
                "case_id",
                format!(
                    "transaction {txn_id} belongs to case {}, not {}",
                    existing.case_id, req.case_id
                ),
            ));
        }
        let case = self.live_case(existing.case_id)?;

        let without = self.reconcile_excluding(&case, Some(txn_id))?;
        let (allocation, cost_only, manual) =
            self.resolve_allocation(&case, &without.outstanding, req)?;

        let updated = RecoveryTransaction {
            amount: req.amount,
            cost_only,
            date: req.date,
            reference: req.reference.trim().to_string(),
            mode: req.mode.clone(),
            remarks: req.remarks.clone(),
            allocation,
            manual,
            updated_at: now.clone(),
            ..existing.clone()
        };
        self.store.update_txn(&updated)?;
        let agg = self.recompute_in_tx(case.header.case_id, &now)?;
        self.record(
            &case.header.establishment_code,
            DeskEvent::TransactionEdited {
                case_id: case.header.case_id,
                txn_id: txn_id.to_string(),
                amount: req.amount,
                cost_only,
                manual,
                allocation,
                previous_allocation: existing.allocation,
            },
            &now,
        )?;
        tx.commit()?;

        log::info!(
            "case={} txn={txn_id} edited: amount {} -> {}",
            case.header.case_id,
            format_amount(existing.amount),
            format_amount(req.amount)
        );
        Ok(TransactionReceipt {
            transaction: updated,
            case: agg,
        })
    }

    pub fn delete_transaction(&mut self, txn_id: &str) -> DeskResult<CaseAggregates> {
        let now = now();
        let tx = self.store.begin_write()?;
        let existing = self
            .store
            .txn(txn_id)?
            .ok_or_else(|| DeskError::not_found("transaction", txn_id))?;
        let case = self.live_case(existing.case_id)?;
        self.store.mark_txn_deleted(txn_id, &now)?;
        let agg = self.recompute_in_tx(existing.case_id, &now)?;
        self.record(
            &case.header.establishment_code,
            DeskEvent::TransactionDeleted {
                case_id: existing.case_id,
                txn_id: txn_id.to_string(),
                amount: existing.amount,
            },
            &now,
        )?;
        tx.commit()?;

        log::info!(
            "case={} txn={txn_id} deleted: outstanding={}",
            existing.case_id,
            format_amount(agg.outstanding_total)
        );
        Ok(agg)
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Waterfall proposal for a candidate amount. Nothing is written and
    /// the remainder is reported as is, whatever the over-recovery policy.
    pub fn preview_allocation(
        &self,
        case_id: CaseId,
        amount: Amount,
        cost_only: Amount,
    ) -> DeskResult<AllocationProposal> {
        let _snapshot = self.store.begin_read()?;
        let case = self.live_case(case_id)?;
        let current = self.reconcile_excluding(&case, None)?;
        propose_allocation(&current.outstanding, amount, cost_only, case.header.basis)
    }

    pub fn read_case(&self, case_id: CaseId) -> DeskResult<CaseAggregates> {
        self.store
            .load_aggregates(case_id)?
            .ok_or_else(|| DeskError::not_found("case", case_id))
    }

    pub fn find_case(
        &self,
        establishment_code: &str,
        case_number: &str,
    ) -> DeskResult<CaseAggregates> {
        let _snapshot = self.store.begin_read()?;
        let case_id = self
            .store
            .find_case_id(establishment_code, case_number)?
            .ok_or_else(|| {
                DeskError::not_found("case", format!("{establishment_code}/{case_number}"))
            })?;
        self.read_case(case_id)
    }

    pub fn list_transactions(&self, case_id: CaseId) -> DeskResult<Vec<RecoveryTransaction>> {
        let _snapshot = self.store.begin_read()?;
        self.live_case(case_id)?;
        self.store.live_txns(case_id)
    }

    pub fn read_establishment(&self, establishment_code: &str) -> DeskResult<EstablishmentSummary> {
        let _snapshot = self.store.begin_read()?;
        let cases = self.store.establishment_aggregates(establishment_code)?;
        if cases.is_empty() {
            return Err(DeskError::not_found("establishment", establishment_code));
        }
        let cost = self
            .store
            .establishment_cost(establishment_code)?
            .unwrap_or_default();
        Ok(aggregate(establishment_code, cost, &cases))
    }

    pub fn list_establishments(&self) -> DeskResult<Vec<EstablishmentCode>> {
        self.store.establishment_codes()
    }

    pub fn events_for_case(&self, case_id: CaseId) -> DeskResult<Vec<EventLogEntry>> {
        self.store.events_for_case(case_id)
    }

    // ── Internals ────────────────────────────────────────────────

    fn live_case(&self, case_id: CaseId) -> DeskResult<CaseRow> {
        match self.store.case_row(case_id)? {
            Some(row) if !row.deleted => Ok(row),
            _ => Err(DeskError::not_found("case", case_id)),
        }
    }

    /// Reconcile without persisting, optionally leaving one transaction out.
    fn reconcile_excluding(
        &self,
        case: &CaseRow,
        exclude: Option<&str>,
    ) -> DeskResult<CaseAggregates> {
        let txns = self.store.live_txns(case.header.case_id)?;
        let allocations: Vec<&AccountVector> = txns
            .iter()
            .filter(|t| Some(t.txn_id.as_str()) != exclude)
            .map(|t| &t.allocation)
            .collect();
        Ok(reconcile(case.header.clone(), &case.demand, case.cost, allocations))
    }

    /// Full reconciliation of one case, persisted. Must run inside an open
    /// write transaction.
    fn recompute_in_tx(&self, case_id: CaseId, now: &str) -> DeskResult<CaseAggregates> {
        let case = self.live_case(case_id)?;
        let allocations = self.store.live_allocations(case_id)?;
        let agg = reconcile(case.header, &case.demand, case.cost, &allocations);
        for notice in &agg.notices {
            log::warn!("case={case_id} consistency: {}: {}", notice.field, notice.detail);
        }
        self.store.write_aggregates(&agg, now)?;
        log::debug!(
            "case={case_id} reconciled: txns={} recovered={} outstanding={} with_cost={}",
            agg.transaction_count,
            format_amount(agg.recovered_total),
            format_amount(agg.outstanding_total),
            format_amount(agg.outstanding_with_cost)
        );
        Ok(agg)
    }

    /// Decide the allocation vector for a request: the operator's own
    /// (validated) or the waterfall's (remainder settled per config).
    /// Returns (allocation, cost_only, manual).
    fn resolve_allocation(
        &self,
        case: &CaseRow,
        outstanding: &AccountVector,
        req: &TransactionRequest,
    ) -> DeskResult<(AccountVector, Amount, bool)> {
        let basis = case.header.basis;
        let cost_only = req.cost_only.unwrap_or(0);
        match &req.allocation {
            Some(manual) => {
                validate_manual(manual, cost_only, req.amount, basis)?;
                Ok((*manual, cost_only, true))
            }
            None => {
                let proposal = propose_allocation(outstanding, req.amount, cost_only, basis)?;
                let settled = settle_remainder(proposal, basis, self.config.over_recovery)?;
                Ok((settled.allocation, settled.cost_only, false))
            }
        }
    }

    /// A basis may only shrink if no live transaction allocates to a
    /// section it drops.
    fn check_basis_change(&self, case_id: CaseId, basis: StatutoryBasis) -> DeskResult<()> {
        for txn in self.store.live_txns(case_id)? {
            if let Some((account, _)) = txn
                .allocation
                .nonzero()
                .find(|(account, _)| !basis.applies(account.section()))
            {
                return Err(DeskError::validation(
                    "basis",
                    format!(
                        "transaction {} allocates to {account} in section {}",
                        txn.txn_id,
                        account.section()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn record(&self, establishment_code: &str, event: DeskEvent, now: &str) -> DeskResult<()> {
        self.store.append_event(&EventLogEntry {
            id: None,
            case_id: event.case_id(),
            establishment_code: establishment_code.to_string(),
            event_type: event.type_name().to_string(),
            payload: serde_json::to_string(&event)?,
            operator: self.config.operator.clone(),
            created_at: now.to_string(),
        })
    }
}

fn check_metadata(req: &TransactionRequest) -> DeskResult<()> {
    if req.reference.trim().is_empty() {
        return Err(DeskError::validation("reference", "must not be empty"));
    }
    Ok(())
}

/// Stored demand for a new case: applicable accounts get a value (zero if
/// not given), the rest stay null.
fn intake_demand(demand: &AccountVector, basis: StatutoryBasis) -> DeskResult<RawDemand> {
    let mut raw = RawDemand::default();
    for (account, amount) in demand.iter() {
        if amount < 0 {
            return Err(DeskError::validation(
                format!("{}_demand", account.code().to_ascii_lowercase()),
                "demand must not be negative",
            ));
        }
        if basis.applies(account.section()) {
            raw.set(account, Some(amount));
        } else if amount != 0 {
            return Err(DeskError::validation(
                format!("{}_demand", account.code().to_ascii_lowercase()),
                format!("section {} does not apply (basis {basis})", account.section()),
            ));
        }
    }
    Ok(raw)
}
