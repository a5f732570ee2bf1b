//! Expense-sharing ledger: group members log shared expenses, each expense is
//! split into signed ledger entries, and balances are reconciled into
//! suggested debtor to creditor transfers.

pub mod cli;
pub mod commands;
pub mod controller;
pub mod db;
pub mod entity;
pub mod error;
pub mod migration;
pub mod money;
pub mod reconcile;
pub mod split;

pub use controller::Controller;
pub use db::Database;
pub use error::{LedgerError, SplitError};
