//! timebank CLI — household screen-time ledger
//!
//! Commands: create-account, set-week, add-time, show-week, reasons.
//! Results print as JSON on stdout; failures print
//! `error (<code>): <message>` on stderr and exit non-zero.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use timebank_ledger::{AccountStore, LedgerError, ReasonTracker, WeekLedger};
use timebank_store::SqliteStore;

#[derive(Parser)]
#[command(name = "timebank")]
#[command(version)]
#[command(about = "Household screen-time ledger")]
struct Cli {
    /// Path to the ledger database.
    #[arg(long, default_value = "timebank.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create a new account
    CreateAccount { account_id: String },
    /// Set the minutes granted for a week
    SetWeek {
        account_id: String,
        week_id: String,
        minutes_granted: i64,
    },
    /// Add (or, with negative minutes, take away) time with a reason
    AddTime {
        account_id: String,
        week_id: String,
        #[arg(allow_hyphen_values = true)]
        minutes: f64,
        reason: String,
    },
    /// Show a week record, or null if none exists yet
    ShowWeek { account_id: String, week_id: String },
    /// List recently used reasons, most frequent first
    Reasons {
        account_id: String,
        /// Rank reward reasons instead of penalty reasons
        #[arg(long)]
        positive: bool,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        from: i64,
        #[arg(long, default_value_t = 10, allow_hyphen_values = true)]
        size: i64,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            match err.downcast_ref::<LedgerError>() {
                Some(ledger_err) => eprintln!("error ({}): {ledger_err}", ledger_err.code()),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<String> {
    let store = Arc::new(SqliteStore::open(&cli.db)?);

    let output = match &cli.command {
        Commands::CreateAccount { account_id } => {
            AccountStore::new(store).create_account(account_id)?;
            serde_json::json!({ "accountID": account_id, "created": true })
        }
        Commands::SetWeek {
            account_id,
            week_id,
            minutes_granted,
        } => {
            let week = WeekLedger::new(store).set_week(account_id, week_id, *minutes_granted)?;
            serde_json::to_value(week)?
        }
        Commands::AddTime {
            account_id,
            week_id,
            minutes,
            reason,
        } => {
            // Callers may pass fractional minutes; the ledger works in
            // whole minutes, rounded down.
            let minutes = minutes.floor() as i64;
            let week = WeekLedger::new(store).add_time(account_id, week_id, minutes, reason)?;
            serde_json::to_value(week)?
        }
        Commands::ShowWeek {
            account_id,
            week_id,
        } => match WeekLedger::new(store).get_week(account_id, week_id)? {
            Some(week) => serde_json::to_value(week)?,
            None => serde_json::Value::Null,
        },
        Commands::Reasons {
            account_id,
            positive,
            from,
            size,
        } => {
            let from = usize::try_from(*from).map_err(|_| LedgerError::ParamsInvalid)?;
            let size = usize::try_from(*size).map_err(|_| LedgerError::ParamsInvalid)?;
            let reasons =
                ReasonTracker::new(store).recent_reasons(account_id, *positive, from, size)?;
            serde_json::to_value(reasons)?
        }
    };

    Ok(serde_json::to_string_pretty(&output)?)
}
