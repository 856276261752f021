//! Establishment aggregator: consolidated liability across all live cases
//! of one establishment.
//!
//! Read-time only: sums already persisted case aggregates, nothing is
//! stored. Each case's outstanding-with-cost already carries the
//! establishment's cost outstanding, so the consolidated figure is the sum
//! of those per-case figures and the cost is never added on top again.

use crate::{
    reconciliation::{CaseAggregates, RecoveryCost},
    types::{Amount, EstablishmentCode},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstablishmentSummary {
    pub establishment_code: EstablishmentCode,
    pub case_count: usize,
    pub demand_total: Amount,
    pub recovered_total: Amount,
    pub outstanding_total: Amount,
    pub cost_outstanding: Amount,
    pub outstanding_with_cost_total: Amount,
}

/// Combine the cases of one establishment.
///
/// `cost` is the establishment's (replicated) recovery cost ledger; it is
/// reported as is and not folded in a second time.
pub fn aggregate<'a>(
    establishment_code: &str,
    cost: RecoveryCost,
    cases: impl IntoIterator<Item = &'a CaseAggregates>,
) -> EstablishmentSummary {
    let mut summary = EstablishmentSummary {
        establishment_code: establishment_code.to_string(),
        case_count: 0,
        demand_total: 0,
        recovered_total: 0,
        outstanding_total: 0,
        cost_outstanding: cost.outstanding(),
        outstanding_with_cost_total: 0,
    };
    for case in cases {
        summary.case_count += 1;
        summary.demand_total = summary.demand_total.saturating_add(case.demand_total);
        summary.recovered_total = summary.recovered_total.saturating_add(case.recovered_total);
        summary.outstanding_total =
            summary.outstanding_total.saturating_add(case.outstanding_total);
        summary.outstanding_with_cost_total = summary
            .outstanding_with_cost_total
            .saturating_add(case.outstanding_with_cost);
    }
    summary
}
