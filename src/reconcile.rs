//! Balance reconciliation: nets ledger entries per user and matches debtors
//! against creditors into suggested transfers.
//!
//! Matching is greedy, largest debtor against largest creditor. It is
//! deterministic but not guaranteed to produce the fewest possible
//! transfers. Transfers at or below [`MATERIALITY_THRESHOLD`] are dropped.

use rust_decimal::Decimal;
use std::{cmp::Ordering, collections::BTreeMap};
use tracing::debug;

use crate::money::{self, MATERIALITY_THRESHOLD};

/// Net balance per user id: positive owes, negative is owed.
pub type NetBalances = BTreeMap<i64, Decimal>;

/// A suggested payment from a debtor to a creditor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub from: i64,
    pub to: i64,
    pub amount: Decimal,
}

#[derive(Debug)]
struct Outstanding {
    user_id: i64,
    remaining: Decimal,
}

/// Sums signed ledger entries `(user_id, amount)` into one net per user.
pub fn net_balances<I>(entries: I) -> NetBalances
where
    I: IntoIterator<Item = (i64, Decimal)>,
{
    let mut balances = NetBalances::new();
    for (user_id, amount) in entries {
        *balances.entry(user_id).or_default() += amount;
    }
    balances
}

/// Produces the ordered list of transfers that settles `balances`.
pub fn settle(balances: &NetBalances) -> Vec<Transfer> {
    let mut debtors: Vec<Outstanding> = Vec::new();
    let mut creditors: Vec<Outstanding> = Vec::new();

    for (&user_id, &net) in balances {
        match net.cmp(&Decimal::ZERO) {
            Ordering::Greater => debtors.push(Outstanding {
                user_id,
                remaining: net,
            }),
            Ordering::Less => creditors.push(Outstanding {
                user_id,
                remaining: -net,
            }),
            Ordering::Equal => (),
        }
    }

    // Stable sorts: equal magnitudes keep ascending user id order.
    debtors.sort_by(|a, b| b.remaining.cmp(&a.remaining));
    creditors.sort_by(|a, b| b.remaining.cmp(&a.remaining));

    let mut transfers = Vec::new();
    let mut debtor_index = 0;
    let mut creditor_index = 0;

    while debtor_index < debtors.len() && creditor_index < creditors.len() {
        let debtor = &debtors[debtor_index];
        let creditor = &creditors[creditor_index];
        let amount = debtor.remaining.min(creditor.remaining);

        if money::is_material(amount) {
            transfers.push(Transfer {
                from: debtor.user_id,
                to: creditor.user_id,
                amount,
            });
        } else {
            debug!(
                from = debtor.user_id,
                to = creditor.user_id,
                %amount,
                threshold = %MATERIALITY_THRESHOLD,
                "Dropping transfer below materiality threshold"
            );
        }

        debtors[debtor_index].remaining -= amount;
        creditors[creditor_index].remaining -= amount;

        if money::is_negligible(debtors[debtor_index].remaining) {
            debtor_index += 1;
        }
        if money::is_negligible(creditors[creditor_index].remaining) {
            creditor_index += 1;
        }
    }

    transfers
}
