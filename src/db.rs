use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Database as SeaOrmDatabase,
    DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, SqlErr, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::{fs::OpenOptions, path::Path};

use crate::{
    entity::{expense, expense_split, group, user, user_group},
    migration::Migrator,
    split::Share,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("File error: {0}")]
    File(#[from] std::io::Error),
}

impl Error {
    /// Whether the statement was rejected by a `UNIQUE` constraint.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::Database(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        )
    }
}

async fn get_db_pool(db_path: &Path) -> Result<DatabaseConnection, Error> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(db_path)?;
    let db_str = format!("sqlite:{}", db_path.display());
    let pool = SeaOrmDatabase::connect(&db_str).await?;
    Ok(pool)
}

/// A new expense before it is stored.
#[derive(Debug, Clone)]
pub struct NewExpense<'a> {
    pub description: &'a str,
    pub amount: Decimal,
    pub paid_by: i64,
    pub group_id: i64,
    pub split_type: expense::SplitType,
}

/// Storage access over a pooled sea-orm connection.
///
/// Cloning is cheap; clones share the pool.
#[derive(Clone)]
pub struct Database {
    pool: DatabaseConnection,
}

impl Database {
    pub async fn new(db_path: &Path) -> Result<Self, Error> {
        get_db_pool(db_path).await.map(|pool| Self { pool })
    }

    pub async fn apply_migrations(&self) -> Result<(), Error> {
        Ok(Migrator::up(&self.pool, None).await?)
    }

    // ----- Users

    pub async fn insert_user(&self, username: &str, email: &str) -> Result<user::Model, Error> {
        let user = user::ActiveModel {
            id: NotSet,
            username: Set(username.to_owned()),
            email: Set(email.to_owned()),
        };
        Ok(user.insert(&self.pool).await?)
    }

    pub async fn get_user_by_id(&self, user_id: i64) -> Result<Option<user::Model>, Error> {
        Ok(user::Entity::find_by_id(user_id).one(&self.pool).await?)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<user::Model>, Error> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.pool)
            .await?)
    }

    pub async fn get_users(&self, skip: u64, limit: u64) -> Result<Vec<user::Model>, Error> {
        Ok(user::Entity::find()
            .order_by_asc(user::Column::Id)
            .offset(skip)
            .limit(limit)
            .all(&self.pool)
            .await?)
    }

    pub async fn get_users_by_ids(&self, user_ids: &[i64]) -> Result<Vec<user::Model>, Error> {
        Ok(user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids.iter().copied()))
            .order_by_asc(user::Column::Id)
            .all(&self.pool)
            .await?)
    }

    // ----- Groups

    /// Inserts a group together with its initial members.
    pub async fn insert_group(&self, name: &str, member_ids: &[i64]) -> Result<group::Model, Error> {
        let txn = self.pool.begin().await?;

        let group = group::ActiveModel {
            id: NotSet,
            name: Set(name.to_owned()),
        }
        .insert(&txn)
        .await?;

        for &user_id in member_ids {
            user_group::ActiveModel {
                user_id: Set(user_id),
                group_id: Set(group.id),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(group)
    }

    pub async fn get_group_by_id(&self, group_id: i64) -> Result<Option<group::Model>, Error> {
        Ok(group::Entity::find_by_id(group_id).one(&self.pool).await?)
    }

    pub async fn get_groups(&self) -> Result<Vec<group::Model>, Error> {
        Ok(group::Entity::find()
            .order_by_asc(group::Column::Id)
            .all(&self.pool)
            .await?)
    }

    /// Adds a membership link unless it already exists.
    pub async fn add_user_to_group(&self, group_id: i64, user_id: i64) -> Result<bool, Error> {
        let existing = user_group::Entity::find_by_id((user_id, group_id))
            .one(&self.pool)
            .await?;
        if existing.is_some() {
            return Ok(false);
        }

        user_group::ActiveModel {
            user_id: Set(user_id),
            group_id: Set(group_id),
        }
        .insert(&self.pool)
        .await?;

        Ok(true)
    }

    pub async fn get_users_in_group(&self, group_id: i64) -> Result<Vec<user::Model>, Error> {
        let user_ids: Vec<i64> = user_group::Entity::find()
            .filter(user_group::Column::GroupId.eq(group_id))
            .all(&self.pool)
            .await?
            .into_iter()
            .map(|x| x.user_id)
            .collect();

        self.get_users_by_ids(&user_ids).await
    }

    pub async fn count_users_in_group(&self, group_id: i64) -> Result<u64, Error> {
        Ok(user_group::Entity::find()
            .filter(user_group::Column::GroupId.eq(group_id))
            .count(&self.pool)
            .await?)
    }

    pub async fn get_user_groups(&self, user_id: i64) -> Result<Vec<group::Model>, Error> {
        let user_groups_ids: Vec<i64> = user_group::Entity::find()
            .filter(user_group::Column::UserId.eq(user_id))
            .all(&self.pool)
            .await?
            .into_iter()
            .map(|x| x.group_id)
            .collect();

        let groups = group::Entity::find()
            .filter(group::Column::Id.is_in(user_groups_ids))
            .order_by_asc(group::Column::Id)
            .all(&self.pool)
            .await?;

        Ok(groups)
    }

    // ----- Expenses

    /// Stores an expense and its ledger entries in one transaction.
    ///
    /// Either everything is committed or, on any error, the transaction is
    /// dropped and rolled back.
    pub async fn insert_expense_with_splits(
        &self,
        new_expense: NewExpense<'_>,
        shares: &[Share],
    ) -> Result<(expense::Model, Vec<expense_split::Model>), Error> {
        let txn = self.pool.begin().await?;

        let expense = expense::ActiveModel {
            id: NotSet,
            description: Set(new_expense.description.to_owned()),
            amount: Set(new_expense.amount),
            paid_by: Set(new_expense.paid_by),
            group_id: Set(new_expense.group_id),
            split_type: Set(new_expense.split_type),
        }
        .insert(&txn)
        .await?;

        let mut splits = Vec::with_capacity(shares.len());
        for share in shares {
            let split = expense_split::ActiveModel {
                id: NotSet,
                expense_id: Set(expense.id),
                user_id: Set(share.user_id),
                amount: Set(share.amount),
            }
            .insert(&txn)
            .await?;
            splits.push(split);
        }

        txn.commit().await?;
        Ok((expense, splits))
    }

    pub async fn get_expenses_in_group(&self, group_id: i64) -> Result<Vec<expense::Model>, Error> {
        Ok(expense::Entity::find()
            .filter(expense::Column::GroupId.eq(group_id))
            .order_by_asc(expense::Column::Id)
            .all(&self.pool)
            .await?)
    }

    pub async fn get_expense_by_id(&self, expense_id: i64) -> Result<Option<expense::Model>, Error> {
        Ok(expense::Entity::find_by_id(expense_id).one(&self.pool).await?)
    }

    pub async fn get_splits_of_expense(
        &self,
        expense_id: i64,
    ) -> Result<Vec<expense_split::Model>, Error> {
        Ok(expense_split::Entity::find()
            .filter(expense_split::Column::ExpenseId.eq(expense_id))
            .order_by_asc(expense_split::Column::Id)
            .all(&self.pool)
            .await?)
    }

    /// Every ledger entry of every expense in the group.
    pub async fn get_splits_in_group(
        &self,
        group_id: i64,
    ) -> Result<Vec<expense_split::Model>, Error> {
        let expense_ids: Vec<i64> = self
            .get_expenses_in_group(group_id)
            .await?
            .into_iter()
            .map(|x| x.id)
            .collect();

        Ok(expense_split::Entity::find()
            .filter(expense_split::Column::ExpenseId.is_in(expense_ids))
            .order_by_asc(expense_split::Column::Id)
            .all(&self.pool)
            .await?)
    }
}
