//! Error types surfaced by the ledger.
//!
//! [`LedgerError`] separates the client-facing conditions (unknown entity,
//! bad split, bad input) from storage failures, which are propagated as-is.

use rust_decimal::Decimal;
use std::fmt;

use crate::db;

/// Convenience alias used by the ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Kind of record an id failed to resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Group,
    Payer,
    Expense,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Payer => "payer",
            Self::Expense => "expense",
        };
        f.write_str(name)
    }
}

/// Reasons an expense cannot be split.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("payer {0} is not a member of the group")]
    PayerNotMember(i64),

    #[error("group has no members to split between")]
    NoParticipants,

    #[error("percentage splits are required for percentage split type")]
    MissingPercentages,

    #[error("user {0} is not a member of the group")]
    ParticipantNotMember(i64),

    #[error("percentage for user {user_id} must not be negative, got {percentage}")]
    NegativePercentage { user_id: i64, percentage: Decimal },

    #[error("split percentages must sum to 100%, got {0}%")]
    PercentageSum(Decimal),

    #[error("amount or percentages are too large to split")]
    AmountOutOfRange,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// An id did not resolve to a stored record.
    #[error("{entity} {id} not found")]
    EntityNotFound { entity: EntityKind, id: i64 },

    #[error("invalid split: {0}")]
    InvalidSplit(#[from] SplitError),

    /// Malformed user or group data.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] db::Error),
}

impl LedgerError {
    pub fn not_found(entity: EntityKind, id: i64) -> Self {
        Self::EntityNotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EntityNotFound { .. })
    }

    /// Whether the caller sent something the ledger refuses to accept.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::InvalidSplit(_) | Self::InvalidInput(_))
    }
}
