//! Static ledger schema: sections, sub-accounts and their fields.
//!
//! RULE: Every sub-account is declared exactly once in SUB_ACCOUNTS.
//! Section membership, in-section priority and field roles are read
//! from this table. Nothing is inferred from field-name patterns.

use crate::error::{DeskError, DeskResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Section {
    A,
    B,
    C,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::A, Section::B, Section::C];

    pub fn label(self) -> &'static str {
        match self {
            Section::A => "A",
            Section::B => "B",
            Section::C => "C",
        }
    }

    /// Sub-accounts of this section in their fixed allocation order.
    pub fn accounts(self) -> impl Iterator<Item = SubAccount> {
        SubAccount::all().filter(move |a| a.section() == self)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Statutory allocation priority across sections.
/// Sub-accounts inside a section follow SUB_ACCOUNTS declaration order.
pub const PRIORITY: [Section; 3] = [Section::A, Section::C, Section::B];

pub struct SubAccountSpec {
    pub code: &'static str,
    pub section: Section,
    pub fund: &'static str,
}

pub const ACCOUNT_COUNT: usize = 16;

pub const SUB_ACCOUNTS: [SubAccountSpec; ACCOUNT_COUNT] = [
    // Section A (6)
    SubAccountSpec { code: "A1", section: Section::A, fund: "employee share" },
    SubAccountSpec { code: "A2", section: Section::A, fund: "employer share" },
    SubAccountSpec { code: "A3", section: Section::A, fund: "pension fund" },
    SubAccountSpec { code: "A4", section: Section::A, fund: "insurance fund" },
    SubAccountSpec { code: "A5", section: Section::A, fund: "administrative charges" },
    SubAccountSpec { code: "A6", section: Section::A, fund: "insurance admin charges" },
    // Section B (5)
    SubAccountSpec { code: "B1", section: Section::B, fund: "provident fund damages" },
    SubAccountSpec { code: "B2", section: Section::B, fund: "admin charge damages" },
    SubAccountSpec { code: "B3", section: Section::B, fund: "pension fund damages" },
    SubAccountSpec { code: "B4", section: Section::B, fund: "insurance fund damages" },
    SubAccountSpec { code: "B5", section: Section::B, fund: "insurance admin damages" },
    // Section C (5)
    SubAccountSpec { code: "C1", section: Section::C, fund: "provident fund interest" },
    SubAccountSpec { code: "C2", section: Section::C, fund: "admin charge interest" },
    SubAccountSpec { code: "C3", section: Section::C, fund: "pension fund interest" },
    SubAccountSpec { code: "C4", section: Section::C, fund: "insurance fund interest" },
    SubAccountSpec { code: "C5", section: Section::C, fund: "insurance admin interest" },
];

/// Index into SUB_ACCOUNTS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubAccount(u8);

impl SubAccount {
    pub fn all() -> impl Iterator<Item = SubAccount> {
        (0..ACCOUNT_COUNT as u8).map(SubAccount)
    }

    pub fn from_code(code: &str) -> Option<SubAccount> {
        SUB_ACCOUNTS
            .iter()
            .position(|s| s.code == code)
            .map(|i| SubAccount(i as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    fn spec(self) -> &'static SubAccountSpec {
        &SUB_ACCOUNTS[self.index()]
    }

    pub fn code(self) -> &'static str {
        self.spec().code
    }

    pub fn section(self) -> Section {
        self.spec().section
    }

    pub fn fund(self) -> &'static str {
        self.spec().fund
    }
}

impl fmt::Display for SubAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<String> for SubAccount {
    type Error = String;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        SubAccount::from_code(&code).ok_or_else(|| format!("unknown sub-account '{code}'"))
    }
}

impl From<SubAccount> for String {
    fn from(account: SubAccount) -> Self {
        account.code().to_string()
    }
}

// ── Field roles ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Demand,
    Recovered,
    Outstanding,
}

impl FieldRole {
    pub const ALL: [FieldRole; 3] = [
        FieldRole::Demand,
        FieldRole::Recovered,
        FieldRole::Outstanding,
    ];

    fn suffix(self) -> &'static str {
        match self {
            FieldRole::Demand => "demand",
            FieldRole::Recovered => "recovered",
            FieldRole::Outstanding => "outstanding",
        }
    }

    pub fn mutability(self) -> Mutability {
        match self {
            FieldRole::Demand => Mutability::Operator,
            FieldRole::Recovered | FieldRole::Outstanding => Mutability::Recompute,
        }
    }
}

/// Who may write a ledger field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutability {
    /// Edited by operators (demand intake and corrections).
    Operator,
    /// Written only by the reconciliation pass.
    Recompute,
}

/// One named ledger field, e.g. `a3_demand` or `c1_outstanding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerField {
    pub account: SubAccount,
    pub role: FieldRole,
}

impl LedgerField {
    /// Every ledger field, account-major.
    pub fn all() -> impl Iterator<Item = LedgerField> {
        SubAccount::all().flat_map(|account| {
            FieldRole::ALL
                .into_iter()
                .map(move |role| LedgerField { account, role })
        })
    }

    pub fn name(self) -> String {
        format!("{}_{}", self.account.code().to_ascii_lowercase(), self.role.suffix())
    }

    pub fn section(self) -> Section {
        self.account.section()
    }

    pub fn mutability(self) -> Mutability {
        self.role.mutability()
    }

    /// Exact lookup by field name.
    pub fn parse(name: &str) -> DeskResult<LedgerField> {
        LedgerField::all()
            .find(|f| f.name() == name)
            .ok_or_else(|| DeskError::validation("field", format!("unknown ledger field '{name}'")))
    }
}

// ── Statutory basis ───────────────────────────────────────────

/// The set of sections that legally apply to a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StatutoryBasis {
    sections: [bool; 3],
}

impl StatutoryBasis {
    pub const ALL_SECTIONS: StatutoryBasis = StatutoryBasis { sections: [true; 3] };

    pub fn new(sections: &[Section]) -> DeskResult<Self> {
        if sections.is_empty() {
            return Err(DeskError::validation(
                "basis",
                "at least one section must apply",
            ));
        }
        let mut flags = [false; 3];
        for s in sections {
            flags[Self::slot(*s)] = true;
        }
        Ok(Self { sections: flags })
    }

    fn slot(section: Section) -> usize {
        match section {
            Section::A => 0,
            Section::B => 1,
            Section::C => 2,
        }
    }

    pub fn applies(self, section: Section) -> bool {
        self.sections[Self::slot(section)]
    }

    /// Applicable sections in A, B, C order.
    pub fn sections(self) -> Vec<Section> {
        Section::ALL.into_iter().filter(|s| self.applies(*s)).collect()
    }

    /// Applicable sections in statutory allocation priority.
    pub fn in_priority(self) -> impl Iterator<Item = Section> {
        PRIORITY.into_iter().filter(move |s| self.applies(*s))
    }

    pub fn tag(self) -> String {
        self.sections()
            .iter()
            .map(|s| s.label())
            .collect::<Vec<_>>()
            .join("+")
    }

    pub fn parse(tag: &str) -> DeskResult<Self> {
        let mut sections = Vec::new();
        for part in tag.split('+') {
            let section = match part.trim() {
                "A" => Section::A,
                "B" => Section::B,
                "C" => Section::C,
                other => {
                    return Err(DeskError::validation(
                        "basis",
                        format!("unknown section '{other}' in '{tag}'"),
                    ))
                }
            };
            if sections.contains(&section) {
                return Err(DeskError::validation(
                    "basis",
                    format!("section {section} repeated in '{tag}'"),
                ));
            }
            sections.push(section);
        }
        Self::new(&sections)
    }
}

impl TryFrom<String> for StatutoryBasis {
    type Error = String;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        StatutoryBasis::parse(&tag).map_err(|e| e.to_string())
    }
}

impl From<StatutoryBasis> for String {
    fn from(basis: StatutoryBasis) -> Self {
        basis.tag()
    }
}

impl fmt::Display for StatutoryBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_sizes_match_statute() {
        assert_eq!(Section::A.accounts().count(), 6);
        assert_eq!(Section::B.accounts().count(), 5);
        assert_eq!(Section::C.accounts().count(), 5);
    }

    #[test]
    fn account_codes_are_unique() {
        for a in SubAccount::all() {
            assert_eq!(SubAccount::from_code(a.code()), Some(a));
        }
    }

    #[test]
    fn field_roles_come_from_table() {
        let f = LedgerField::parse("b3_recovered").unwrap();
        assert_eq!(f.account.code(), "B3");
        assert_eq!(f.section(), Section::B);
        assert_eq!(f.mutability(), Mutability::Recompute);

        let d = LedgerField::parse("a1_demand").unwrap();
        assert_eq!(d.mutability(), Mutability::Operator);

        // Substrings of real names are not fields.
        assert!(LedgerField::parse("demand").is_err());
        assert!(LedgerField::parse("xa1_demand").is_err());
    }

    #[test]
    fn basis_round_trips_through_tag() {
        let basis = StatutoryBasis::parse("C+A").unwrap();
        assert_eq!(basis.tag(), "A+C");
        assert!(basis.applies(Section::A));
        assert!(!basis.applies(Section::B));
        assert_eq!(
            basis.in_priority().collect::<Vec<_>>(),
            vec![Section::A, Section::C]
        );
    }

    #[test]
    fn basis_rejects_empty_and_repeats() {
        assert!(StatutoryBasis::new(&[]).is_err());
        assert!(StatutoryBasis::parse("A+A").is_err());
        assert!(StatutoryBasis::parse("D").is_err());
    }
}
