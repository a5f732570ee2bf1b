//! Numeric helpers shared by the split allocator and the balance reconciler.

use rust_decimal::Decimal;

/// Amounts at or below this are rounding dust and never become transfers.
pub const MATERIALITY_THRESHOLD: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// What the percentages of a percentage split have to add up to.
pub const PERCENT_TOTAL: Decimal = Decimal::ONE_HUNDRED;

/// Relative tolerance for the percentage total check.
pub const PERCENT_REL_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 5);

/// Relative closeness: `|a - b| <= rel_tol * max(|a|, |b|)`.
pub fn is_close_rel(a: Decimal, b: Decimal, rel_tol: Decimal) -> bool {
    (a - b).abs() <= rel_tol * a.abs().max(b.abs())
}

/// `true` when `value` is within the materiality threshold of zero.
pub fn is_negligible(value: Decimal) -> bool {
    value.abs() <= MATERIALITY_THRESHOLD
}

/// `true` when `value` is large enough to be reported as a transfer.
pub fn is_material(value: Decimal) -> bool {
    value > MATERIALITY_THRESHOLD
}

/// Share of `amount` that corresponds to `percentage` percent, `None` on
/// overflow.
pub fn percent_of(amount: Decimal, percentage: Decimal) -> Option<Decimal> {
    amount.checked_mul(percentage)?.checked_div(PERCENT_TOTAL)
}

/// Sum of `values`, `None` on overflow.
pub fn checked_sum<I>(values: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |total, value| total.checked_add(value))
}
