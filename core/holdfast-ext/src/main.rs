//! holdfast-ext: entry points for Holdfast's extension processes.
//!
//! The host launches one short-lived invocation per callback. Each subcommand
//! plays one process role and talks to the others only through the shared
//! app-group store.
//!
//! ## Subcommands
//!
//! - `monitor`: Monitor callback, writes a usage estimate
//! - `report`: Compiles NDJSON usage batches from stdin into the authoritative aggregate
//! - `decide`: Shield decision (continue / change of mind)
//! - `decide-legacy`: Free-form signal from older shield builds
//! - `drain`: Main app, moves pending rewards into the balance
//! - `status`: Main app, prints the usage snapshot and balance as JSON
//!
//! An unreachable store, a failed report stream, or a failed activity
//! enumeration is logged and exits 0; extension callbacks must never fail
//! loudly for conditions the host can't fix.

mod app;
mod decide;
mod logging;
mod monitor;
mod notify;
mod report;

use clap::{Parser, Subcommand, ValueEnum};
use holdfast_core::{load_config, HoldfastConfig, HoldfastError, StorageConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "holdfast-ext")]
#[command(about = "Holdfast screen-time and reward extension processes")]
#[command(version)]
struct Cli {
    /// Data root (defaults to $HOLDFAST_HOME or ~/.holdfast)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle a monitor callback and write a usage estimate
    Monitor {
        /// Callback kind (e.g. interval-did-start)
        #[arg(long)]
        event: String,

        /// Monitored activity name; repeat for several. Defaults to the published list.
        #[arg(long = "activity", value_name = "NAME")]
        activities: Vec<String>,
    },

    /// Compile usage batches (NDJSON on stdin) into the authoritative aggregate
    Report,

    /// Handle a shield decision
    Decide {
        #[arg(long, value_enum)]
        action: ActionArg,

        #[arg(long, value_enum)]
        scope: ScopeArg,

        /// Name of the shielded app, category, or domain
        #[arg(long)]
        name: Option<String>,
    },

    /// Handle a free-form signal from an older shield build
    DecideLegacy {
        #[arg(long)]
        app_name: String,

        #[arg(long)]
        marker: String,
    },

    /// Move pending rewards into the gem balance
    Drain,

    /// Print the usage snapshot and gem balance as JSON
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ActionArg {
    Continue,
    ChangeMind,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScopeArg {
    App,
    Category,
    WebDomain,
}

/// Storage and preferences resolved once per invocation.
pub struct Context {
    pub storage: StorageConfig,
    pub config: HoldfastConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let storage = cli.root.map(StorageConfig::with_root).unwrap_or_default();
    let logging_guard = logging::init(&storage);
    let ctx = Context {
        config: load_config(&storage),
        storage,
    };

    let code = run(&ctx, cli.command);
    // Flush buffered log lines before the process exits.
    drop(logging_guard);
    code
}

fn run(ctx: &Context, command: Commands) -> ExitCode {
    let (name, result) = match command {
        Commands::Monitor { event, activities } => {
            ("monitor", monitor::run(ctx, &event, activities))
        }
        Commands::Report => ("report", report::run(ctx)),
        Commands::Decide {
            action,
            scope,
            name,
        } => ("decide", decide::run(ctx, action.into(), scope.into_scope(name))),
        Commands::DecideLegacy { app_name, marker } => {
            ("decide-legacy", decide::run_legacy(ctx, app_name, marker))
        }
        Commands::Drain => ("drain", app::drain(ctx)),
        Commands::Status => ("status", app::status(ctx)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_contained(&e) => {
            tracing::warn!(command = name, error = %e, "holdfast-ext degraded; nothing written");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(command = name, error = %e, "holdfast-ext failed");
            ExitCode::FAILURE
        }
    }
}

/// Failures a host callback must never see as a non-zero exit.
fn is_contained(error: &HoldfastError) -> bool {
    matches!(
        error,
        HoldfastError::StoreUnreachable { .. }
            | HoldfastError::ReportStream(_)
            | HoldfastError::EnumerationFailed(_)
    )
}

impl From<ActionArg> for holdfast_core::ShieldAction {
    fn from(action: ActionArg) -> Self {
        match action {
            ActionArg::Continue => holdfast_core::ShieldAction::Continue,
            ActionArg::ChangeMind => holdfast_core::ShieldAction::ChangeMind,
        }
    }
}

impl ScopeArg {
    fn into_scope(self, name: Option<String>) -> holdfast_core::ShieldScope {
        use holdfast_core::ShieldScope;
        match self {
            ScopeArg::App => ShieldScope::Application { name },
            ScopeArg::Category => ShieldScope::Category { name },
            ScopeArg::WebDomain => ShieldScope::WebDomain { domain: name },
        }
    }
}
