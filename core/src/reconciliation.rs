//! Ledger reconciliation: derives every recovered/outstanding figure of a
//! case from its demand and its full live transaction set.
//!
//! Design:
//!   - recovered[account]   = Σ allocation[account] over live transactions
//!   - outstanding[account] = demand[account] − recovered[account] (signed)
//!   - section and grand totals are sums over applicable sections only
//!   - cost_outstanding      = charged − received (establishment-scoped)
//!   - outstanding_with_cost = grand outstanding + cost_outstanding
//!
//! Always a full pass, never a delta. The same inputs give the same output.
//! Nothing in here fails: malformed demand becomes zero plus a notice, and
//! sums saturate at the i64 bounds.

use crate::{
    ledger::AccountVector,
    schema::{Section, StatutoryBasis, SubAccount, ACCOUNT_COUNT},
    types::{sum_amounts, Amount, CaseId, EstablishmentCode},
};
use serde::{Deserialize, Serialize};

/// Demand as stored: a column may be null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawDemand(pub [Option<Amount>; ACCOUNT_COUNT]);

impl RawDemand {
    pub fn get(&self, account: SubAccount) -> Option<Amount> {
        self.0[account.index()]
    }

    pub fn set(&mut self, account: SubAccount, amount: Option<Amount>) {
        self.0[account.index()] = amount;
    }
}

impl From<&AccountVector> for RawDemand {
    fn from(v: &AccountVector) -> Self {
        let mut raw = RawDemand::default();
        for (account, amount) in v.iter() {
            raw.set(account, Some(amount));
        }
        raw
    }
}

/// Establishment-scoped recovery cost ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoveryCost {
    pub charged: Amount,
    pub received: Amount,
}

impl RecoveryCost {
    pub fn outstanding(&self) -> Amount {
        self.charged.saturating_sub(self.received)
    }
}

/// Identity of the case being reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseHeader {
    pub case_id: CaseId,
    pub establishment_code: EstablishmentCode,
    pub case_number: String,
    pub basis: StatutoryBasis,
}

/// Business data that was unusual enough to report but not to reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyNotice {
    pub field: String,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTotals {
    pub section: Section,
    pub demand: Amount,
    pub recovered: Amount,
    pub outstanding: Amount,
}

/// Every derived figure of one case. Produced only by `reconcile`
/// (or read back from what `reconcile` persisted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseAggregates {
    #[serde(flatten)]
    pub header: CaseHeader,
    pub demand: AccountVector,
    pub recovered: AccountVector,
    pub outstanding: AccountVector,
    /// Applicable sections only, in A, B, C order.
    pub sections: Vec<SectionTotals>,
    pub demand_total: Amount,
    pub recovered_total: Amount,
    pub outstanding_total: Amount,
    pub cost: RecoveryCost,
    pub cost_outstanding: Amount,
    pub outstanding_with_cost: Amount,
    pub transaction_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<ConsistencyNotice>,
}

impl CaseAggregates {
    pub fn case_id(&self) -> CaseId {
        self.header.case_id
    }

    pub fn section(&self, section: Section) -> Option<&SectionTotals> {
        self.sections.iter().find(|s| s.section == section)
    }
}

/// Demand with nulls replaced by zero, plus notices for what was replaced
/// or ignored.
pub fn normalize_demand(
    raw: &RawDemand,
    basis: StatutoryBasis,
) -> (AccountVector, Vec<ConsistencyNotice>) {
    let mut demand = AccountVector::zero();
    let mut notices = Vec::new();
    for account in SubAccount::all() {
        let applies = basis.applies(account.section());
        match raw.get(account) {
            Some(amount) => {
                if !applies && amount != 0 {
                    notices.push(ConsistencyNotice {
                        field: format!("{}_demand", account.code().to_ascii_lowercase()),
                        detail: format!(
                            "{} demand recorded under section {}, which does not apply; \
                             excluded from totals",
                            account.fund(),
                            account.section()
                        ),
                    });
                }
                demand.set(account, amount);
            }
            None if applies => notices.push(ConsistencyNotice {
                field: format!("{}_demand", account.code().to_ascii_lowercase()),
                detail: format!("missing {} demand read as zero", account.fund()),
            }),
            None => {}
        }
    }
    (demand, notices)
}

/// Full recompute of a case from its live allocation vectors.
pub fn reconcile<'a>(
    header: CaseHeader,
    raw_demand: &RawDemand,
    cost: RecoveryCost,
    allocations: impl IntoIterator<Item = &'a AccountVector>,
) -> CaseAggregates {
    let basis = header.basis;
    let (demand, notices) = normalize_demand(raw_demand, basis);

    let mut recovered = AccountVector::zero();
    let mut transaction_count = 0;
    for allocation in allocations {
        recovered.accumulate(allocation);
        transaction_count += 1;
    }

    let mut outstanding = AccountVector::zero();
    for account in SubAccount::all() {
        outstanding.set(account, demand.get(account).saturating_sub(recovered.get(account)));
    }

    let sections: Vec<SectionTotals> = basis
        .sections()
        .into_iter()
        .map(|section| SectionTotals {
            section,
            demand: demand.section_total(section),
            recovered: recovered.section_total(section),
            outstanding: outstanding.section_total(section),
        })
        .collect();

    let demand_total = sum_amounts(sections.iter().map(|s| s.demand));
    let recovered_total = sum_amounts(sections.iter().map(|s| s.recovered));
    let outstanding_total = sum_amounts(sections.iter().map(|s| s.outstanding));
    let cost_outstanding = cost.outstanding();

    CaseAggregates {
        header,
        demand,
        recovered,
        outstanding,
        sections,
        demand_total,
        recovered_total,
        outstanding_total,
        cost,
        cost_outstanding,
        outstanding_with_cost: outstanding_total.saturating_add(cost_outstanding),
        transaction_count,
        notices,
    }
}
