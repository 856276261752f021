//! Shared primitive types used across the entire ledger.

/// A money amount in minor currency units (paise).
/// All ledger arithmetic is exact integer arithmetic on this type.
pub type Amount = i64;

/// Surrogate key of a case record.
pub type CaseId = i64;

/// A stable, unique identifier for a recovery transaction (UUID v4 text).
pub type TxnId = String;

/// Identifier of the employer establishment that owns one or more cases.
pub type EstablishmentCode = String;

/// Minor units per major unit (100 paise = 1 rupee).
pub const MINOR_PER_MAJOR: Amount = 100;

/// Saturating sum; ledger totals pin at the i64 bounds instead of wrapping.
pub fn sum_amounts(values: impl IntoIterator<Item = Amount>) -> Amount {
    values.into_iter().fold(0, Amount::saturating_add)
}

/// Render an amount as `1234.50` (sign kept, never clamped).
pub fn format_amount(amount: Amount) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    let per = MINOR_PER_MAJOR as u64;
    format!("{sign}{}.{:02}", abs / per, abs % per)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_signed_amounts() {
        assert_eq!(format_amount(123_450), "1234.50");
        assert_eq!(format_amount(-5), "-0.05");
        assert_eq!(format_amount(0), "0.00");
    }

    #[test]
    fn sums_pin_at_the_bounds() {
        assert_eq!(sum_amounts([Amount::MAX, 1, 5]), Amount::MAX);
        assert_eq!(sum_amounts([Amount::MIN, -1]), Amount::MIN);
        assert_eq!(sum_amounts([40, -15, 5]), 30);
    }
}
