use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::{
    db::{self, NewExpense},
    entity::{expense, expense_split, group, user},
    error::{EntityKind, LedgerError, Result},
    reconcile::{self, Transfer},
    split::{self, SplitPolicy},
};

const DEFAULT_USER_LIMIT: u64 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub id: i64,
    pub name: String,
    pub member_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupDetails {
    pub id: i64,
    pub name: String,
    pub users: Vec<user::Model>,
    pub member_count: u64,
    pub total_expenses: Decimal,
}

/// A stored expense along with its ledger entries.
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseWithSplits {
    #[serde(flatten)]
    pub expense: expense::Model,
    pub splits: Vec<expense_split::Model>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceDetail {
    pub from_user_id: i64,
    pub from_username: String,
    pub to_user_id: i64,
    pub to_username: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupBalances {
    pub group_id: i64,
    pub group_name: String,
    pub balances: Vec<BalanceDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserBalances {
    pub user_id: i64,
    pub username: String,
    /// Keyed by group name; same-named groups share one entry.
    pub balances_by_group: BTreeMap<String, Vec<BalanceDetail>>,
    /// Positive when the user is owed money overall.
    pub total_balance: Decimal,
}

/// Ledger operations on top of a [`db::Database`].
pub struct Controller<'a> {
    pub db: &'a db::Database,
}

impl<'a> Controller<'a> {
    pub fn new(db: &'a db::Database) -> Self {
        Self { db }
    }

    // ----- Users

    pub async fn create_user(&self, username: &str, email: &str) -> Result<user::Model> {
        let username = username.trim();
        let email = email.trim();
        validate_username(username)?;
        validate_email(email)?;

        let already_registered =
            || LedgerError::InvalidInput(format!("email {email} is already registered"));
        if self.db.get_user_by_email(email).await?.is_some() {
            return Err(already_registered());
        }

        // A concurrent insert can still win the race; the unique index decides.
        let user = self
            .db
            .insert_user(username, email)
            .await
            .map_err(|err| {
                if err.is_unique_violation() {
                    already_registered()
                } else {
                    err.into()
                }
            })?;
        info!(user_id = user.id, username = %user.username, "User created");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<user::Model> {
        self.db
            .get_user_by_id(user_id)
            .await?
            .ok_or(LedgerError::not_found(EntityKind::User, user_id))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<user::Model>> {
        Ok(self.db.get_user_by_email(email.trim()).await?)
    }

    pub async fn list_users(&self, skip: u64, limit: Option<u64>) -> Result<Vec<user::Model>> {
        Ok(self
            .db
            .get_users(skip, limit.unwrap_or(DEFAULT_USER_LIMIT))
            .await?)
    }

    // ----- Groups

    pub async fn create_group(&self, name: &str, member_ids: &[i64]) -> Result<GroupSummary> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > 100 {
            return Err(LedgerError::InvalidInput(
                "group name must be between 1 and 100 characters".to_owned(),
            ));
        }

        let mut member_ids = member_ids.to_vec();
        member_ids.sort_unstable();
        member_ids.dedup();
        self.ensure_users_exist(&member_ids).await?;

        let group = self.db.insert_group(name, &member_ids).await?;
        info!(group_id = group.id, name = %group.name, members = member_ids.len(), "Group created");

        Ok(GroupSummary {
            id: group.id,
            name: group.name,
            member_count: member_ids.len() as u64,
        })
    }

    /// Returns `false` when the user already was a member.
    pub async fn add_member(&self, group_id: i64, user_id: i64) -> Result<bool> {
        self.get_group(group_id).await?;
        self.get_user(user_id).await?;

        let added = self.db.add_user_to_group(group_id, user_id).await?;
        if added {
            info!(group_id, user_id, "User joined group");
        }
        Ok(added)
    }

    pub async fn get_group(&self, group_id: i64) -> Result<group::Model> {
        self.db
            .get_group_by_id(group_id)
            .await?
            .ok_or(LedgerError::not_found(EntityKind::Group, group_id))
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupSummary>> {
        let mut summaries = Vec::new();
        for group in self.db.get_groups().await? {
            let member_count = self.db.count_users_in_group(group.id).await?;
            summaries.push(GroupSummary {
                id: group.id,
                name: group.name,
                member_count,
            });
        }
        Ok(summaries)
    }

    pub async fn group_details(&self, group_id: i64) -> Result<GroupDetails> {
        let group = self.get_group(group_id).await?;
        let users = self.db.get_users_in_group(group_id).await?;
        let total_expenses = self
            .db
            .get_expenses_in_group(group_id)
            .await?
            .iter()
            .map(|expense| expense.amount)
            .sum();

        Ok(GroupDetails {
            id: group.id,
            name: group.name,
            member_count: users.len() as u64,
            users,
            total_expenses,
        })
    }

    pub async fn get_user_groups(&self, user_id: i64) -> Result<Vec<group::Model>> {
        self.get_user(user_id).await?;
        Ok(self.db.get_user_groups(user_id).await?)
    }

    // ----- Expenses

    /// Validates and splits a new expense, then stores it with its ledger
    /// entries atomically.
    pub async fn create_expense(
        &self,
        group_id: i64,
        description: &str,
        amount: Decimal,
        paid_by: i64,
        policy: &SplitPolicy,
    ) -> Result<ExpenseWithSplits> {
        self.get_group(group_id).await?;
        if self.db.get_user_by_id(paid_by).await?.is_none() {
            return Err(LedgerError::not_found(EntityKind::Payer, paid_by));
        }
        if let SplitPolicy::Percentage(percentages) = policy {
            let user_ids: Vec<i64> = percentages.keys().copied().collect();
            self.ensure_users_exist(&user_ids).await?;
        }

        let members: Vec<i64> = self
            .db
            .get_users_in_group(group_id)
            .await?
            .into_iter()
            .map(|user| user.id)
            .collect();
        let shares = split::allocate(amount, paid_by, &members, policy)?;

        let (expense, splits) = self
            .db
            .insert_expense_with_splits(
                NewExpense {
                    description,
                    amount,
                    paid_by,
                    group_id,
                    split_type: policy.split_type(),
                },
                &shares,
            )
            .await?;

        info!(
            expense_id = expense.id,
            group_id,
            paid_by,
            %amount,
            splits = splits.len(),
            "Expense created"
        );
        Ok(ExpenseWithSplits { expense, splits })
    }

    pub async fn list_expenses(&self, group_id: i64) -> Result<Vec<expense::Model>> {
        self.get_group(group_id).await?;
        Ok(self.db.get_expenses_in_group(group_id).await?)
    }

    pub async fn expense_splits(&self, expense_id: i64) -> Result<Vec<expense_split::Model>> {
        if self.db.get_expense_by_id(expense_id).await?.is_none() {
            return Err(LedgerError::not_found(EntityKind::Expense, expense_id));
        }
        Ok(self.db.get_splits_of_expense(expense_id).await?)
    }

    // ----- Balances

    /// Suggested transfers that settle the group's ledger.
    pub async fn compute_group_balances(&self, group_id: i64) -> Result<GroupBalances> {
        let group = self.get_group(group_id).await?;
        let splits = self.db.get_splits_in_group(group_id).await?;

        let net = reconcile::net_balances(splits.iter().map(|split| (split.user_id, split.amount)));
        let transfers = reconcile::settle(&net);
        let balances = self.describe_transfers(&transfers).await?;

        debug!(
            group_id,
            entries = splits.len(),
            transfers = balances.len(),
            "Group balances computed"
        );
        Ok(GroupBalances {
            group_id: group.id,
            group_name: group.name,
            balances,
        })
    }

    /// The user's share of the suggested transfers in each of their groups.
    pub async fn compute_user_balances(&self, user_id: i64) -> Result<UserBalances> {
        let user = self.get_user(user_id).await?;

        let mut balances_by_group: BTreeMap<String, Vec<BalanceDetail>> = BTreeMap::new();
        let mut total_balance = Decimal::ZERO;

        for group in self.db.get_user_groups(user_id).await? {
            let group_balances = self.compute_group_balances(group.id).await?;
            let user_balances: Vec<BalanceDetail> = group_balances
                .balances
                .into_iter()
                .filter(|b| b.from_user_id == user_id || b.to_user_id == user_id)
                .collect();

            if user_balances.is_empty() {
                continue;
            }

            for balance in &user_balances {
                if balance.from_user_id == user_id {
                    total_balance -= balance.amount;
                } else {
                    total_balance += balance.amount;
                }
            }

            balances_by_group
                .entry(group.name)
                .or_default()
                .extend(user_balances);
        }

        debug!(user_id, %total_balance, groups = balances_by_group.len(), "User balances computed");
        Ok(UserBalances {
            user_id: user.id,
            username: user.username,
            balances_by_group,
            total_balance,
        })
    }

    async fn describe_transfers(&self, transfers: &[Transfer]) -> Result<Vec<BalanceDetail>> {
        let mut user_ids: Vec<i64> = transfers.iter().flat_map(|t| [t.from, t.to]).collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        let usernames: HashMap<i64, String> = self
            .db
            .get_users_by_ids(&user_ids)
            .await?
            .into_iter()
            .map(|user| (user.id, user.username))
            .collect();
        let username_of = |user_id: i64| -> Result<String> {
            usernames
                .get(&user_id)
                .cloned()
                .ok_or(LedgerError::not_found(EntityKind::User, user_id))
        };

        transfers
            .iter()
            .map(|t| {
                Ok(BalanceDetail {
                    from_user_id: t.from,
                    from_username: username_of(t.from)?,
                    to_user_id: t.to,
                    to_username: username_of(t.to)?,
                    amount: t.amount,
                })
            })
            .collect()
    }

    async fn ensure_users_exist(&self, user_ids: &[i64]) -> Result<()> {
        let found: Vec<i64> = self
            .db
            .get_users_by_ids(user_ids)
            .await?
            .into_iter()
            .map(|user| user.id)
            .collect();

        match user_ids.iter().find(|id| !found.contains(id)) {
            Some(&missing) => Err(LedgerError::not_found(EntityKind::User, missing)),
            None => Ok(()),
        }
    }
}

fn validate_username(username: &str) -> Result<()> {
    let length = username.chars().count();
    if !(3..=50).contains(&length) {
        return Err(LedgerError::InvalidInput(
            "username must be between 3 and 50 characters".to_owned(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .rsplit_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(LedgerError::InvalidInput(format!(
            "{email} is not a valid email address"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_length_bounds() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username("abc").is_ok());
        assert!(validate_username(&"x".repeat(50)).is_ok());
        assert!(validate_username(&"x".repeat(51)).is_err());
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("a.b-c@mail.example.org").is_ok());
        for bad in ["alice", "@example.com", "alice@example", "alice@.com", "a@b@c.de", "al ice@x.io"] {
            assert!(validate_email(bad).is_err(), "{bad} should be rejected");
        }
    }
}
