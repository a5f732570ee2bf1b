//! Split allocation: turns one expense into a signed ledger entry per
//! participant.
//!
//! Entries follow the ledger sign convention: a positive amount is owed into
//! the group, a negative amount is owed to the user. The payer's entry is
//! always derived by subtraction so the entries of an expense sum to zero.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::{
    entity::expense::SplitType,
    error::SplitError,
    money::{self, PERCENT_REL_TOLERANCE, PERCENT_TOTAL},
};

/// How the amount of a new expense is divided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitPolicy {
    /// Every current group member carries the same share.
    Equal,
    /// Each listed user carries the given percentage of the amount.
    Percentage(BTreeMap<i64, Decimal>),
}

impl SplitPolicy {
    pub fn split_type(&self) -> SplitType {
        match self {
            Self::Equal => SplitType::Equal,
            Self::Percentage(_) => SplitType::Percentage,
        }
    }
}

/// A computed, not yet persisted, ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Share {
    pub user_id: i64,
    pub amount: Decimal,
}

/// Computes the ledger entries of an expense of `amount` paid by `payer`.
///
/// `members` is the group membership at creation time. Percentage keys must
/// already be known to resolve to users; here they are only checked against
/// the membership.
pub fn allocate(
    amount: Decimal,
    payer: i64,
    members: &[i64],
    policy: &SplitPolicy,
) -> Result<Vec<Share>, SplitError> {
    if amount <= Decimal::ZERO {
        return Err(SplitError::NonPositiveAmount(amount));
    }
    if members.is_empty() {
        return Err(SplitError::NoParticipants);
    }
    if !members.contains(&payer) {
        return Err(SplitError::PayerNotMember(payer));
    }

    match policy {
        SplitPolicy::Equal => Ok(allocate_equal(amount, payer, members)),
        SplitPolicy::Percentage(percentages) => {
            allocate_percentage(amount, payer, members, percentages)
        }
    }
}

fn allocate_equal(amount: Decimal, payer: i64, members: &[i64]) -> Vec<Share> {
    let share = amount / Decimal::from(members.len());

    members
        .iter()
        .map(|&user_id| Share {
            user_id,
            amount: if user_id == payer {
                -(amount - share)
            } else {
                share
            },
        })
        .collect()
}

fn allocate_percentage(
    amount: Decimal,
    payer: i64,
    members: &[i64],
    percentages: &BTreeMap<i64, Decimal>,
) -> Result<Vec<Share>, SplitError> {
    if percentages.is_empty() {
        return Err(SplitError::MissingPercentages);
    }

    for (&user_id, &percentage) in percentages {
        if !members.contains(&user_id) {
            return Err(SplitError::ParticipantNotMember(user_id));
        }
        if percentage < Decimal::ZERO {
            return Err(SplitError::NegativePercentage {
                user_id,
                percentage,
            });
        }
    }

    let total = money::checked_sum(percentages.values().copied())
        .ok_or(SplitError::AmountOutOfRange)?;
    if !money::is_close_rel(total, PERCENT_TOTAL, PERCENT_REL_TOLERANCE) {
        return Err(SplitError::PercentageSum(total));
    }

    let mut shares = Vec::with_capacity(percentages.len() + 1);
    for (&user_id, &percentage) in percentages {
        if user_id == payer {
            continue;
        }
        let amount = money::percent_of(amount, percentage).ok_or(SplitError::AmountOutOfRange)?;
        shares.push(Share { user_id, amount });
    }

    // The payer's own percentage is discarded: they are owed whatever the
    // others owe. With an exact 100% total this is -(amount - payer share).
    let owed_by_others = money::checked_sum(shares.iter().map(|share| share.amount))
        .ok_or(SplitError::AmountOutOfRange)?;
    let payer_share = Share {
        user_id: payer,
        amount: -owed_by_others,
    };

    let position = shares
        .iter()
        .position(|share| share.user_id > payer)
        .unwrap_or(shares.len());
    shares.insert(position, payer_share);

    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    const A: i64 = 1;
    const B: i64 = 2;
    const C: i64 = 3;

    fn amount_of(shares: &[Share], user_id: i64) -> Decimal {
        shares
            .iter()
            .find(|share| share.user_id == user_id)
            .map(|share| share.amount)
            .unwrap_or_else(|| panic!("no share for user {user_id}"))
    }

    fn total(shares: &[Share]) -> Decimal {
        shares.iter().map(|share| share.amount).sum()
    }

    fn percentages(pairs: &[(i64, Decimal)]) -> SplitPolicy {
        SplitPolicy::Percentage(pairs.iter().copied().collect())
    }

    #[test]
    fn equal_split_nets_out_payer_share() {
        let shares = allocate(dec!(100), A, &[A, B, C], &SplitPolicy::Equal).unwrap();
        let third = dec!(100) / dec!(3);

        assert_eq!(shares.len(), 3);
        assert_eq!(amount_of(&shares, B), third);
        assert_eq!(amount_of(&shares, C), third);
        assert_eq!(amount_of(&shares, A), -(dec!(100) - third));
        assert!(amount_of(&shares, A) < dec!(-66.6666666));
        assert!(total(&shares).abs() < dec!(0.000000001));
    }

    #[test]
    fn equal_split_with_single_member_is_zero() {
        let shares = allocate(dec!(42), A, &[A], &SplitPolicy::Equal).unwrap();
        assert_eq!(shares, vec![Share { user_id: A, amount: Decimal::ZERO }]);
    }

    #[test]
    fn percentage_split_discards_payer_percentage() {
        let policy = percentages(&[(A, dec!(50)), (B, dec!(30)), (C, dec!(20))]);
        let shares = allocate(dec!(200), A, &[A, B, C], &policy).unwrap();

        assert_eq!(amount_of(&shares, B), dec!(60));
        assert_eq!(amount_of(&shares, C), dec!(40));
        assert_eq!(amount_of(&shares, A), dec!(-100));
        assert_eq!(total(&shares), Decimal::ZERO);
        let order: Vec<i64> = shares.iter().map(|share| share.user_id).collect();
        assert_eq!(order, vec![A, B, C]);
    }

    #[test]
    fn percentage_split_payer_not_listed_is_owed_everything() {
        let policy = percentages(&[(B, dec!(75)), (C, dec!(25))]);
        let shares = allocate(dec!(80), A, &[A, B, C], &policy).unwrap();

        assert_eq!(amount_of(&shares, A), dec!(-80));
        assert_eq!(amount_of(&shares, B), dec!(60));
        assert_eq!(amount_of(&shares, C), dec!(20));
    }

    #[test]
    fn percentage_sum_outside_tolerance_is_rejected() {
        let policy = percentages(&[(A, dec!(50)), (B, dec!(29.9)), (C, dec!(20))]);
        let err = allocate(dec!(200), A, &[A, B, C], &policy).unwrap_err();

        assert_eq!(err, SplitError::PercentageSum(dec!(99.9)));
        assert!(err.to_string().contains("99.9"));
    }

    #[test]
    fn percentage_sum_within_tolerance_is_accepted() {
        let policy = percentages(&[(A, dec!(33.3333)), (B, dec!(33.3333)), (C, dec!(33.3333))]);
        assert!(allocate(dec!(90), A, &[A, B, C], &policy).is_ok());
    }

    #[test]
    fn overflowing_percentage_total_is_rejected() {
        let policy = percentages(&[(A, Decimal::MAX), (B, Decimal::MAX)]);
        let err = allocate(dec!(10), A, &[A, B], &policy).unwrap_err();
        assert_eq!(err, SplitError::AmountOutOfRange);
    }

    #[test]
    fn overflowing_percentage_share_is_rejected() {
        let policy = percentages(&[(A, dec!(50)), (B, dec!(50))]);
        let err = allocate(Decimal::MAX, A, &[A, B], &policy).unwrap_err();
        assert_eq!(err, SplitError::AmountOutOfRange);
    }

    #[test]
    fn missing_percentages_are_rejected() {
        let err = allocate(dec!(10), A, &[A, B], &percentages(&[])).unwrap_err();
        assert_eq!(err, SplitError::MissingPercentages);
    }

    #[test]
    fn percentage_for_non_member_is_rejected() {
        let policy = percentages(&[(A, dec!(50)), (9, dec!(50))]);
        let err = allocate(dec!(10), A, &[A, B], &policy).unwrap_err();
        assert_eq!(err, SplitError::ParticipantNotMember(9));
    }

    #[test]
    fn negative_percentage_is_rejected() {
        let policy = percentages(&[(A, dec!(110)), (B, dec!(-10))]);
        let err = allocate(dec!(10), A, &[A, B], &policy).unwrap_err();
        assert_eq!(
            err,
            SplitError::NegativePercentage {
                user_id: B,
                percentage: dec!(-10)
            }
        );
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        for amount in [Decimal::ZERO, dec!(-5)] {
            let err = allocate(amount, A, &[A, B], &SplitPolicy::Equal).unwrap_err();
            assert_eq!(err, SplitError::NonPositiveAmount(amount));
        }
    }

    #[test]
    fn payer_outside_group_is_rejected() {
        let err = allocate(dec!(10), C, &[A, B], &SplitPolicy::Equal).unwrap_err();
        assert_eq!(err, SplitError::PayerNotMember(C));
    }

    #[test]
    fn empty_group_is_rejected() {
        let err = allocate(dec!(10), A, &[], &SplitPolicy::Equal).unwrap_err();
        assert_eq!(err, SplitError::NoParticipants);
    }

    proptest! {
        #[test]
        fn equal_split_sums_to_zero(
            cents in 1i64..=10_000_000,
            member_count in 1usize..=12,
            payer_index in 0usize..12,
        ) {
            let amount = Decimal::new(cents, 2);
            let members: Vec<i64> = (1..=member_count as i64).collect();
            let payer = members[payer_index % member_count];

            let shares = allocate(amount, payer, &members, &SplitPolicy::Equal).unwrap();
            prop_assert_eq!(shares.len(), member_count);
            prop_assert!(total(&shares).abs() < dec!(0.000000001));
        }

        #[test]
        fn percentage_split_sums_to_zero(
            cents in 1i64..=10_000_000,
            weights in prop::collection::vec(1u32..=1000, 1..=8),
            payer_index in 0usize..8,
        ) {
            let amount = Decimal::new(cents, 2);
            let members: Vec<i64> = (1..=weights.len() as i64).collect();
            let payer = members[payer_index % members.len()];

            // Whole-number weights rescaled to percentages, last one absorbs the remainder.
            let weight_total: u32 = weights.iter().sum();
            let mut map = BTreeMap::new();
            let mut assigned = Decimal::ZERO;
            for (index, weight) in weights.iter().enumerate() {
                let percentage = if index + 1 == weights.len() {
                    PERCENT_TOTAL - assigned
                } else {
                    (Decimal::from(*weight) * PERCENT_TOTAL / Decimal::from(weight_total)).round_dp(4)
                };
                assigned += percentage;
                map.insert(members[index], percentage);
            }
            prop_assume!(map.values().all(|pct| *pct >= Decimal::ZERO));

            let shares = allocate(amount, payer, &members, &SplitPolicy::Percentage(map)).unwrap();
            prop_assert!(total(&shares).abs() < dec!(0.000000001));
            prop_assert!(shares.iter().any(|share| share.user_id == payer));
        }
    }
}
