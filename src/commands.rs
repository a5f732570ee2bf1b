use serde::Serialize;
use tracing::info;

use crate::{
    cli::{
        AddExpenseArgs, BalancesCommand, Command, ExpenseCommand, GroupCommand, OutputFormat,
        SplitKind, UserCommand,
    },
    controller::{
        BalanceDetail, Controller, ExpenseWithSplits, GroupBalances, GroupDetails, GroupSummary,
        UserBalances,
    },
    db::Database,
    entity::{expense, expense_split, group, user},
    split::SplitPolicy,
};

/// Runs one subcommand and returns what should be printed.
pub async fn run(db: &Database, command: &Command, format: OutputFormat) -> anyhow::Result<String> {
    let ctl = Controller::new(db);

    match command {
        Command::User(cmd) => run_user(&ctl, cmd, format).await,
        Command::Group(cmd) => run_group(&ctl, cmd, format).await,
        Command::Expense(cmd) => run_expense(&ctl, cmd, format).await,
        Command::Balances(cmd) => run_balances(&ctl, cmd, format).await,
    }
}

async fn run_user(
    ctl: &Controller<'_>,
    cmd: &UserCommand,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match cmd {
        UserCommand::Add { username, email } => {
            let user = ctl.create_user(username, email).await?;
            render(format, &user, |user| {
                format!("User `{}` registered with id {}", user.username, user.id)
            })
        }
        UserCommand::List { skip, limit } => {
            let users = ctl.list_users(*skip, *limit).await?;
            render(format, &users, |users| users_to_pretty(users))
        }
        UserCommand::Show { user_id } => {
            let user = ctl.get_user(*user_id).await?;
            let groups = ctl.get_user_groups(*user_id).await?;

            #[derive(Serialize)]
            struct UserView<'a> {
                #[serde(flatten)]
                user: &'a user::Model,
                groups: &'a [group::Model],
            }

            let view = UserView {
                user: &user,
                groups: &groups,
            };
            render(format, &view, |view| {
                let mut text = format!(
                    "{} — `{}` <{}>\n",
                    view.user.id, view.user.username, view.user.email
                );
                if view.groups.is_empty() {
                    text.push_str("Doesn't belong to any group yet");
                } else {
                    text.push_str("Groups:\n");
                    text.push_str(&groups_to_pretty(view.groups));
                }
                text
            })
        }
    }
}

async fn run_group(
    ctl: &Controller<'_>,
    cmd: &GroupCommand,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match cmd {
        GroupCommand::Create { name, members } => {
            let group = ctl.create_group(name, members).await?;
            render(format, &group, |group| {
                format!(
                    "Group `{}` was successfully created with id {} and {} member(s)",
                    group.name, group.id, group.member_count
                )
            })
        }
        GroupCommand::List => {
            let groups = ctl.list_groups().await?;
            render(format, &groups, |groups| summaries_to_pretty(groups))
        }
        GroupCommand::Show { group_id } => {
            let details = ctl.group_details(*group_id).await?;
            render(format, &details, group_details_to_pretty)
        }
        GroupCommand::AddMember { group_id, user_id } => {
            let added = ctl.add_member(*group_id, *user_id).await?;

            #[derive(Serialize)]
            struct Membership {
                group_id: i64,
                user_id: i64,
                added: bool,
            }

            let membership = Membership {
                group_id: *group_id,
                user_id: *user_id,
                added,
            };
            render(format, &membership, |m| {
                if m.added {
                    format!("User {} has been successfully added to group {}", m.user_id, m.group_id)
                } else {
                    format!("User {} is already a member of group {}", m.user_id, m.group_id)
                }
            })
        }
    }
}

async fn run_expense(
    ctl: &Controller<'_>,
    cmd: &ExpenseCommand,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match cmd {
        ExpenseCommand::Add(args) => {
            let created = add_expense(ctl, args).await?;
            render(format, &created, expense_with_splits_to_pretty)
        }
        ExpenseCommand::List { group } => {
            let expenses = ctl.list_expenses(*group).await?;
            render(format, &expenses, |expenses| expenses_to_pretty(expenses))
        }
        ExpenseCommand::Splits { expense_id } => {
            let splits = ctl.expense_splits(*expense_id).await?;
            render(format, &splits, |splits| splits_to_pretty(splits))
        }
    }
}

async fn add_expense(ctl: &Controller<'_>, args: &AddExpenseArgs) -> anyhow::Result<ExpenseWithSplits> {
    let policy = match args.split {
        SplitKind::Equal => {
            if !args.shares.is_empty() {
                anyhow::bail!("--share is only accepted with --split percentage");
            }
            SplitPolicy::Equal
        }
        SplitKind::Percentage => {
            let mut percentages = std::collections::BTreeMap::new();
            for &(user_id, percentage) in &args.shares {
                if percentages.insert(user_id, percentage).is_some() {
                    anyhow::bail!("user {user_id} has more than one --share");
                }
            }
            SplitPolicy::Percentage(percentages)
        }
    };

    let created = ctl
        .create_expense(args.group, &args.description, args.amount, args.payer, &policy)
        .await?;
    info!(expense_id = created.expense.id, "The expense has been added");
    Ok(created)
}

async fn run_balances(
    ctl: &Controller<'_>,
    cmd: &BalancesCommand,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match cmd {
        BalancesCommand::Group { group_id } => {
            let balances = ctl.compute_group_balances(*group_id).await?;
            render(format, &balances, group_balances_to_pretty)
        }
        BalancesCommand::User { user_id } => {
            let balances = ctl.compute_user_balances(*user_id).await?;
            render(format, &balances, user_balances_to_pretty)
        }
    }
}

fn render<T: Serialize>(
    format: OutputFormat,
    value: &T,
    pretty: impl FnOnce(&T) -> String,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Text => Ok(pretty(value)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
    }
}

fn users_to_pretty(users: &[user::Model]) -> String {
    if users.is_empty() {
        return "No users yet".to_owned();
    }
    users
        .iter()
        .map(|model| format!("{} — `{}` <{}>\n", model.id, model.username, model.email))
        .collect()
}

fn groups_to_pretty(groups: &[group::Model]) -> String {
    groups
        .iter()
        .map(|model| format!("{} — `{}`\n", model.id, model.name))
        .collect()
}

fn summaries_to_pretty(groups: &[GroupSummary]) -> String {
    if groups.is_empty() {
        return "No groups yet".to_owned();
    }
    groups
        .iter()
        .map(|g| format!("{} — `{}` ({} member(s))\n", g.id, g.name, g.member_count))
        .collect()
}

fn group_details_to_pretty(details: &GroupDetails) -> String {
    let mut text = format!(
        "{} — `{}`\nTotal expenses: {}\nMembers ({}):\n",
        details.id, details.name, details.total_expenses, details.member_count
    );
    text.push_str(&users_to_pretty(&details.users));
    text
}

fn expenses_to_pretty(expenses: &[expense::Model]) -> String {
    if expenses.is_empty() {
        return "There are no expenses yet in this group".to_owned();
    }
    expenses
        .iter()
        .map(|exp| {
            format!(
                "{}: user {} spent {} ({} split) with note: {}\n",
                exp.id,
                exp.paid_by,
                exp.amount,
                split_type_name(exp.split_type),
                exp.description
            )
        })
        .collect()
}

fn splits_to_pretty(splits: &[expense_split::Model]) -> String {
    splits.iter().fold(String::new(), |mut text, split| {
        let role = if split.amount.is_sign_negative() {
            "is owed"
        } else {
            "owes"
        };
        text.push_str(&format!(
            "user {} {} {:.2}\n",
            split.user_id,
            role,
            split.amount.abs()
        ));
        text
    })
}

fn expense_with_splits_to_pretty(created: &ExpenseWithSplits) -> String {
    let mut text = format!(
        "Expense {} of {} has been added\n",
        created.expense.id, created.expense.amount
    );
    text.push_str(&splits_to_pretty(&created.splits));
    text
}

fn transfer_to_pretty(balance: &BalanceDetail) -> String {
    format!(
        "{} owes {:.2} to {}\n",
        balance.from_username, balance.amount, balance.to_username
    )
}

fn group_balances_to_pretty(balances: &GroupBalances) -> String {
    let mut text = format!("Group `{}` debt state:\n", balances.group_name);
    if balances.balances.is_empty() {
        text.push_str("No debt in this group");
    }
    for balance in &balances.balances {
        text.push_str(&transfer_to_pretty(balance));
    }
    text
}

fn user_balances_to_pretty(balances: &UserBalances) -> String {
    let mut text = format!("Balances of `{}`:\n", balances.username);
    if balances.balances_by_group.is_empty() {
        text.push_str("Nothing to settle\n");
    }
    for (group_name, transfers) in &balances.balances_by_group {
        text.push_str(&format!("[{group_name}]\n"));
        for balance in transfers {
            text.push_str("  ");
            text.push_str(&transfer_to_pretty(balance));
        }
    }
    text.push_str(&format!("Total: {:.2}", balances.total_balance));
    text
}

fn split_type_name(split_type: expense::SplitType) -> &'static str {
    match split_type {
        expense::SplitType::Equal => "equal",
        expense::SplitType::Percentage => "percentage",
    }
}
