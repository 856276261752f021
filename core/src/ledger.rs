//! Per-sub-account amount vectors.

use crate::{
    schema::{Section, StatutoryBasis, SubAccount, ACCOUNT_COUNT},
    types::Amount,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One amount per sub-account across all three sections.
/// Serialized as `{"A1": 100, "C2": 50}`; absent codes read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Amount>", into = "BTreeMap<String, Amount>")]
pub struct AccountVector([Amount; ACCOUNT_COUNT]);

impl AccountVector {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (SubAccount, Amount)>) -> Self {
        let mut v = Self::zero();
        for (account, amount) in pairs {
            v.add(account, amount);
        }
        v
    }

    pub fn get(&self, account: SubAccount) -> Amount {
        self.0[account.index()]
    }

    pub fn set(&mut self, account: SubAccount, amount: Amount) {
        self.0[account.index()] = amount;
    }

    /// Saturates at the i64 bounds.
    pub fn add(&mut self, account: SubAccount, amount: Amount) {
        let slot = &mut self.0[account.index()];
        *slot = slot.saturating_add(amount);
    }

    /// Component-wise sum, saturating.
    pub fn accumulate(&mut self, other: &AccountVector) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine = mine.saturating_add(*theirs);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SubAccount, Amount)> + '_ {
        SubAccount::all().map(move |a| (a, self.get(a)))
    }

    /// Sum over every sub-account, saturating.
    pub fn total(&self) -> Amount {
        self.0.iter().fold(0, |acc: Amount, v| acc.saturating_add(*v))
    }

    /// Exact sum over every sub-account; None if it does not fit in an i64.
    pub fn checked_total(&self) -> Option<Amount> {
        self.0.iter().try_fold(0, |acc: Amount, v| acc.checked_add(*v))
    }

    pub fn section_total(&self, section: Section) -> Amount {
        section
            .accounts()
            .fold(0, |acc: Amount, a| acc.saturating_add(self.get(a)))
    }

    /// Sum over the sections the basis makes applicable.
    pub fn applicable_total(&self, basis: StatutoryBasis) -> Amount {
        basis
            .sections()
            .into_iter()
            .fold(0, |acc: Amount, s| acc.saturating_add(self.section_total(s)))
    }

    /// Sub-accounts holding a nonzero amount.
    pub fn nonzero(&self) -> impl Iterator<Item = (SubAccount, Amount)> + '_ {
        self.iter().filter(|(_, amount)| *amount != 0)
    }
}

impl TryFrom<BTreeMap<String, Amount>> for AccountVector {
    type Error = String;

    fn try_from(map: BTreeMap<String, Amount>) -> Result<Self, Self::Error> {
        let mut v = AccountVector::zero();
        for (code, amount) in map {
            let account = SubAccount::from_code(&code)
                .ok_or_else(|| format!("unknown sub-account '{code}'"))?;
            v.set(account, amount);
        }
        Ok(v)
    }
}

impl From<AccountVector> for BTreeMap<String, Amount> {
    fn from(v: AccountVector) -> Self {
        v.nonzero()
            .map(|(account, amount)| (account.code().to_string(), amount))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(code: &str) -> SubAccount {
        SubAccount::from_code(code).unwrap()
    }

    #[test]
    fn totals_by_section_and_basis() {
        let v = AccountVector::from_pairs([(acct("A1"), 100), (acct("B2"), 30), (acct("C5"), 7)]);
        assert_eq!(v.total(), 137);
        assert_eq!(v.section_total(Section::B), 30);
        let basis = StatutoryBasis::new(&[Section::A, Section::C]).unwrap();
        assert_eq!(v.applicable_total(basis), 107);
    }

    #[test]
    fn json_omits_zero_accounts() {
        let v = AccountVector::from_pairs([(acct("A2"), 5_000)]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"A2":5000}"#);
        let back: AccountVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn json_rejects_unknown_codes() {
        let bad = serde_json::from_str::<AccountVector>(r#"{"Z9":1}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn sums_never_wrap() {
        let v = AccountVector::from_pairs([(acct("A1"), Amount::MAX), (acct("A2"), 1)]);
        assert_eq!(v.checked_total(), None);
        assert_eq!(v.total(), Amount::MAX);

        let mut acc = v;
        acc.accumulate(&v);
        assert_eq!(acc.get(acct("A1")), Amount::MAX);
        assert_eq!(acc.get(acct("A2")), 2);
    }
}
