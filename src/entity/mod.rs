pub mod expense;
pub mod expense_split;
pub mod group;
pub mod user;
pub mod user_group;
