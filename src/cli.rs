use clap::{Args, Parser, Subcommand, ValueEnum};
use directories::BaseDirs;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::{ffi::OsString, path::PathBuf};

pub static CLI: Lazy<Cli> = Lazy::new(parse_args);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(
        short,
        long,
        env = "SPLITLEDGER_DB",
        value_name = "FILE",
        help = "Path to the SQLite database file (created if it does not exist)",
        default_value = get_default_database_file()
    )]
    pub database: PathBuf,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
    /// Manage groups and their members
    #[command(subcommand)]
    Group(GroupCommand),
    /// Record and list expenses
    #[command(subcommand)]
    Expense(ExpenseCommand),
    /// Show who owes whom
    #[command(subcommand)]
    Balances(BalancesCommand),
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Register a new user
    Add {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
    },
    /// List users
    List {
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Show a user and the groups they belong to
    Show { user_id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// Create a group with its initial members
    Create {
        #[arg(short, long)]
        name: String,
        #[arg(short, long = "member", value_name = "USER_ID")]
        members: Vec<i64>,
    },
    /// List all groups
    List,
    /// Show group members and total expenses
    Show { group_id: i64 },
    /// Add a user to a group
    AddMember { group_id: i64, user_id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum ExpenseCommand {
    /// Record an expense and split it between the group members
    Add(AddExpenseArgs),
    /// List the expenses of a group
    List {
        #[arg(short, long)]
        group: i64,
    },
    /// Show the ledger entries of an expense
    Splits { expense_id: i64 },
}

#[derive(Args, Debug)]
pub struct AddExpenseArgs {
    #[arg(short, long)]
    pub group: i64,
    #[arg(short, long, value_name = "USER_ID")]
    pub payer: i64,
    #[arg(short, long)]
    pub amount: Decimal,
    #[arg(short, long, default_value = "")]
    pub description: String,
    #[arg(short, long, value_enum, default_value_t = SplitKind::Equal)]
    pub split: SplitKind,
    #[arg(
        long = "share",
        value_name = "USER_ID=PERCENT",
        value_parser = parse_share,
        help = "Percentage carried by a user, repeat for each participant"
    )]
    pub shares: Vec<(i64, Decimal)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SplitKind {
    Equal,
    Percentage,
}

#[derive(Subcommand, Debug)]
pub enum BalancesCommand {
    /// Suggested transfers that settle a group
    Group { group_id: i64 },
    /// A user's transfers across all of their groups
    User { user_id: i64 },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

fn parse_share(value: &str) -> Result<(i64, Decimal), String> {
    let (user_id, percentage) = value
        .split_once('=')
        .ok_or_else(|| format!("expected USER_ID=PERCENT, got `{value}`"))?;
    let user_id = user_id
        .trim()
        .parse::<i64>()
        .map_err(|err| format!("invalid user id `{user_id}`: {err}"))?;
    let percentage = percentage
        .trim()
        .trim_end_matches('%')
        .parse::<Decimal>()
        .map_err(|err| format!("invalid percentage `{percentage}`: {err}"))?;
    Ok((user_id, percentage))
}

fn get_default_database_file() -> OsString {
    let db_name = "splitledger.sqlite";
    match BaseDirs::new() {
        Some(base_dirs) => base_dirs.data_dir().join(db_name).into(),
        None => db_name.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rust_decimal_macros::dec;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn share_parses_user_and_percentage() {
        assert_eq!(parse_share("3=12.5"), Ok((3, dec!(12.5))));
        assert_eq!(parse_share(" 4 = 50% "), Ok((4, dec!(50))));
        assert!(parse_share("3:12.5").is_err());
        assert!(parse_share("x=10").is_err());
        assert!(parse_share("3=ten").is_err());
    }

    #[test]
    fn percentage_expense_arguments() {
        let cli = Cli::try_parse_from([
            "splitledger",
            "--database",
            "ledger.sqlite",
            "expense",
            "add",
            "--group",
            "1",
            "--payer",
            "2",
            "--amount",
            "200",
            "--split",
            "percentage",
            "--share",
            "2=50",
            "--share",
            "3=50",
        ])
        .unwrap();

        match cli.command {
            Command::Expense(ExpenseCommand::Add(args)) => {
                assert_eq!(args.amount, dec!(200));
                assert_eq!(args.split, SplitKind::Percentage);
                assert_eq!(args.shares, vec![(2, dec!(50)), (3, dec!(50))]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
