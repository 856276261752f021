//! Allocation engine: splits an incoming recovery across sub-accounts.
//!
//! Pure computation: no storage, no logging.
//!
//! Proposed split (strict waterfall):
//!   - Sections in statutory PRIORITY (A, C, B), skipping sections the
//!     case's basis does not cover.
//!   - Sub-accounts inside a section in schema declaration order.
//!   - Each account takes min(remaining, outstanding); an account that is
//!     already at or below zero outstanding takes nothing.
//!   - Whatever is left is returned as `unallocated`, never dropped.
//!
//! Manual split: only the exact-sum and section checks apply. Operators
//! may knowingly drive an account negative.

use crate::{
    error::{DeskError, DeskResult},
    ledger::AccountVector,
    schema::{StatutoryBasis, SubAccount},
    types::{format_amount, Amount},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationProposal {
    pub allocation: AccountVector,
    /// Amount set aside for the recovery-cost ledger.
    pub cost_only: Amount,
    /// Part of the amount no applicable sub-account could absorb.
    pub unallocated: Amount,
}

impl AllocationProposal {
    pub fn is_complete(&self) -> bool {
        self.unallocated == 0
    }
}

/// What the desk does with a waterfall remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverRecoveryPolicy {
    /// Refuse the transaction.
    #[default]
    Reject,
    /// Book the remainder on the first applicable sub-account in priority
    /// order, leaving it with negative outstanding.
    FirstAccount,
    /// Book the remainder as recovery cost.
    Cost,
}

fn check_non_negative(field: &str, amount: Amount) -> DeskResult<()> {
    if amount < 0 {
        return Err(DeskError::validation(
            field,
            format!("must not be negative (got {})", format_amount(amount)),
        ));
    }
    Ok(())
}

/// Propose a split of `amount` over `outstanding`.
///
/// `cost_only` is carved off first and never enters the waterfall.
pub fn propose_allocation(
    outstanding: &AccountVector,
    amount: Amount,
    cost_only: Amount,
    basis: StatutoryBasis,
) -> DeskResult<AllocationProposal> {
    check_non_negative("amount", amount)?;
    check_non_negative("cost_only", cost_only)?;
    if cost_only > amount {
        return Err(DeskError::validation(
            "cost_only",
            format!(
                "{} exceeds transaction amount {}",
                format_amount(cost_only),
                format_amount(amount)
            ),
        ));
    }

    let mut allocation = AccountVector::zero();
    let mut remaining = amount - cost_only;

    'sections: for section in basis.in_priority() {
        for account in section.accounts() {
            if remaining == 0 {
                break 'sections;
            }
            let room = outstanding.get(account).max(0);
            let applied = remaining.min(room);
            allocation.set(account, applied);
            remaining -= applied;
        }
    }

    Ok(AllocationProposal {
        allocation,
        cost_only,
        unallocated: remaining,
    })
}

/// Settle a waterfall remainder according to `policy`.
/// Returns a proposal with `unallocated == 0` or a validation error.
pub fn settle_remainder(
    mut proposal: AllocationProposal,
    basis: StatutoryBasis,
    policy: OverRecoveryPolicy,
) -> DeskResult<AllocationProposal> {
    if proposal.is_complete() {
        return Ok(proposal);
    }
    let rest = proposal.unallocated;
    match policy {
        OverRecoveryPolicy::Reject => {
            return Err(DeskError::validation(
                "amount",
                format!(
                    "{} exceeds the applicable outstanding balance",
                    format_amount(rest)
                ),
            ))
        }
        OverRecoveryPolicy::FirstAccount => {
            let first = first_applicable_account(basis)
                .ok_or_else(|| DeskError::validation("basis", "no applicable sub-account"))?;
            proposal.allocation.add(first, rest);
        }
        OverRecoveryPolicy::Cost => {
            proposal.cost_only += rest;
        }
    }
    proposal.unallocated = 0;
    Ok(proposal)
}

fn first_applicable_account(basis: StatutoryBasis) -> Option<SubAccount> {
    basis.in_priority().flat_map(|s| s.accounts()).next()
}

/// Validate an operator-supplied split.
///
/// Exact sum, non-negative entries and section membership only; there is
/// no per-account cap.
pub fn validate_manual(
    allocation: &AccountVector,
    cost_only: Amount,
    amount: Amount,
    basis: StatutoryBasis,
) -> DeskResult<()> {
    check_non_negative("amount", amount)?;
    check_non_negative("cost_only", cost_only)?;

    for (account, value) in allocation.nonzero() {
        if value < 0 {
            return Err(DeskError::validation(
                account.code(),
                format!("allocates {} which is negative", format_amount(value)),
            ));
        }
        if !basis.applies(account.section()) {
            return Err(DeskError::validation(
                account.code(),
                format!(
                    "allocates {} to section {} which does not apply to this case (basis {basis})",
                    format_amount(value),
                    account.section()
                ),
            ));
        }
    }

    let allocated = allocation.checked_total();
    let total = allocated.and_then(|a| a.checked_add(cost_only));
    let (Some(allocated), Some(total)) = (allocated, total) else {
        return Err(DeskError::validation(
            "allocation",
            format!(
                "allocation + cost overflows; transaction amount is {}",
                format_amount(amount)
            ),
        ));
    };
    if total != amount {
        return Err(DeskError::validation(
            "allocation",
            format!(
                "allocation {} + cost {} = {} but transaction amount is {}",
                format_amount(allocated),
                format_amount(cost_only),
                format_amount(total),
                format_amount(amount)
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Section;

    fn acct(code: &str) -> SubAccount {
        SubAccount::from_code(code).unwrap()
    }

    fn basis(sections: &[Section]) -> StatutoryBasis {
        StatutoryBasis::new(sections).unwrap()
    }

    #[test]
    fn waterfall_fills_in_order() {
        let outstanding =
            AccountVector::from_pairs([(acct("A1"), 100), (acct("A2"), 50), (acct("A3"), 0)]);
        let p = propose_allocation(&outstanding, 120, 0, StatutoryBasis::ALL_SECTIONS).unwrap();
        assert_eq!(p.allocation.get(acct("A1")), 100);
        assert_eq!(p.allocation.get(acct("A2")), 20);
        assert_eq!(p.allocation.get(acct("A3")), 0);
        assert_eq!(p.unallocated, 0);
    }

    #[test]
    fn overflow_is_returned_not_dropped() {
        let outstanding = AccountVector::from_pairs([(acct("A1"), 50), (acct("C1"), 30)]);
        let p = propose_allocation(&outstanding, 100, 0, StatutoryBasis::ALL_SECTIONS).unwrap();
        assert_eq!(p.allocation.total(), 80);
        assert_eq!(p.unallocated, 20);
    }

    #[test]
    fn section_c_before_section_b() {
        let outstanding = AccountVector::from_pairs([(acct("B1"), 40), (acct("C1"), 40)]);
        let p = propose_allocation(&outstanding, 50, 0, StatutoryBasis::ALL_SECTIONS).unwrap();
        assert_eq!(p.allocation.get(acct("C1")), 40);
        assert_eq!(p.allocation.get(acct("B1")), 10);
    }

    #[test]
    fn skips_sections_outside_basis() {
        let outstanding = AccountVector::from_pairs([(acct("A1"), 40), (acct("B1"), 40)]);
        let p = propose_allocation(&outstanding, 60, 0, basis(&[Section::B])).unwrap();
        assert_eq!(p.allocation.get(acct("A1")), 0);
        assert_eq!(p.allocation.get(acct("B1")), 40);
        assert_eq!(p.unallocated, 20);
    }

    #[test]
    fn never_exceeds_outstanding_and_ignores_negative_balances() {
        let outstanding = AccountVector::from_pairs([(acct("A1"), -30), (acct("A2"), 10)]);
        let p = propose_allocation(&outstanding, 25, 0, StatutoryBasis::ALL_SECTIONS).unwrap();
        assert_eq!(p.allocation.get(acct("A1")), 0);
        assert_eq!(p.allocation.get(acct("A2")), 10);
        assert_eq!(p.unallocated, 15);
    }

    #[test]
    fn cost_only_is_carved_off_first() {
        let outstanding = AccountVector::from_pairs([(acct("A1"), 100)]);
        let p = propose_allocation(&outstanding, 100, 25, StatutoryBasis::ALL_SECTIONS).unwrap();
        assert_eq!(p.cost_only, 25);
        assert_eq!(p.allocation.get(acct("A1")), 75);
        assert_eq!(p.allocation.total() + p.cost_only, 100);
    }

    #[test]
    fn negative_amount_is_rejected() {
        let err = propose_allocation(&AccountVector::zero(), -1, 0, StatutoryBasis::ALL_SECTIONS)
            .unwrap_err();
        assert!(matches!(err, DeskError::Validation { ref field, .. } if field == "amount"));
    }

    #[test]
    fn remainder_policies() {
        let b = basis(&[Section::B, Section::C]);
        let outstanding = AccountVector::from_pairs([(acct("C1"), 10)]);
        let p = propose_allocation(&outstanding, 15, 0, b).unwrap();

        assert!(settle_remainder(p.clone(), b, OverRecoveryPolicy::Reject).is_err());

        let first = settle_remainder(p.clone(), b, OverRecoveryPolicy::FirstAccount).unwrap();
        assert_eq!(first.allocation.get(acct("C1")), 15);
        assert_eq!(first.unallocated, 0);

        let cost = settle_remainder(p, b, OverRecoveryPolicy::Cost).unwrap();
        assert_eq!(cost.cost_only, 5);
        assert_eq!(cost.allocation.total() + cost.cost_only, 15);
    }

    #[test]
    fn manual_override_may_exceed_outstanding() {
        let manual = AccountVector::from_pairs([(acct("A1"), 500)]);
        assert!(validate_manual(&manual, 0, 500, StatutoryBasis::ALL_SECTIONS).is_ok());
    }

    #[test]
    fn manual_override_off_by_one_paisa_is_rejected() {
        let manual = AccountVector::from_pairs([(acct("A1"), 10_000), (acct("A2"), 2_000)]);
        let err = validate_manual(&manual, 0, 12_001, StatutoryBasis::ALL_SECTIONS).unwrap_err();
        assert!(matches!(err, DeskError::Validation { ref field, .. } if field == "allocation"));
    }

    #[test]
    fn manual_override_outside_basis_names_the_account() {
        let manual = AccountVector::from_pairs([(acct("A1"), 10), (acct("B4"), 5)]);
        let err = validate_manual(&manual, 0, 15, basis(&[Section::A])).unwrap_err();
        match err {
            DeskError::Validation { field, reason } => {
                assert_eq!(field, "B4");
                assert!(reason.contains("section B"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn manual_override_sum_overflow_is_rejected() {
        let manual = AccountVector::from_pairs([(acct("A1"), Amount::MAX), (acct("A2"), 1)]);
        let err = validate_manual(&manual, 0, 100, StatutoryBasis::ALL_SECTIONS).unwrap_err();
        assert!(matches!(err, DeskError::Validation { ref field, .. } if field == "allocation"));

        let near_max = AccountVector::from_pairs([(acct("A1"), Amount::MAX - 5)]);
        let err = validate_manual(&near_max, 10, 100, StatutoryBasis::ALL_SECTIONS).unwrap_err();
        assert!(matches!(err, DeskError::Validation { ref field, .. } if field == "allocation"));
    }

    #[test]
    fn manual_override_rejects_negative_entries() {
        let manual = AccountVector::from_pairs([(acct("A1"), 200), (acct("A2"), -100)]);
        let err = validate_manual(&manual, 0, 100, StatutoryBasis::ALL_SECTIONS).unwrap_err();
        assert!(matches!(err, DeskError::Validation { ref field, .. } if field == "A2"));

        // A zero-amount transfer between accounts is not a payment.
        let shuffle = AccountVector::from_pairs([(acct("A1"), 50), (acct("C1"), -50)]);
        assert!(validate_manual(&shuffle, 0, 0, StatutoryBasis::ALL_SECTIONS).is_err());
    }
}
