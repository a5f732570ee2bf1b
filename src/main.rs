use splitledger::{cli::CLI, commands, Database, LedgerError};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .init();

    info!(database = %CLI.database.display(), "Opening ledger...");
    let db = Database::new(&CLI.database).await.map_err(|err| {
        anyhow::anyhow!("Failed to open database {:?}: {}", CLI.database, err)
    })?;
    db.apply_migrations()
        .await
        .map_err(|err| anyhow::anyhow!("Failed to apply database migrations: {err}"))?;

    match commands::run(&db, &CLI.command, CLI.format).await {
        Ok(output) => {
            println!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        // Client errors get their own exit codes, everything else propagates.
        Err(err) => match err.downcast_ref::<LedgerError>() {
            Some(ledger_err) if ledger_err.is_not_found() => {
                warn!(%ledger_err, "Not found");
                eprintln!("{ledger_err}");
                Ok(ExitCode::from(2))
            }
            Some(ledger_err) if ledger_err.is_bad_request() => {
                warn!(%ledger_err, "Rejected");
                eprintln!("{ledger_err}");
                Ok(ExitCode::from(3))
            }
            _ => Err(err),
        },
    }
}
