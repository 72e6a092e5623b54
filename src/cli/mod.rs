//! Command-line interface definitions.

pub mod output;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::domain::EventStatus;

/// Backline - multi-marketplace inventory synchronization.
#[derive(Parser, Debug)]
#[command(name = "backline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "backline.toml")]
    pub config: PathBuf,

    /// Override log level (debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Detect and decide but don't execute outbound actions
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inventory synchronization
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Execute one full detection + reconciliation + dispatch run
    Run,

    /// Re-run reconciliation and dispatch over an existing run's open events
    Reconcile(ReconcileArgs),

    /// List events needing attention
    Events(EventsArgs),
}

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// UUID of the sync run to reconcile
    #[arg(long)]
    pub run_id: String,
}

#[derive(Args, Debug)]
pub struct EventsArgs {
    /// Event statuses to list
    #[arg(long, value_enum, num_args = 1.., value_delimiter = ',',
          default_values_t = [EventStatusArg::Partial, EventStatusArg::Error])]
    pub status: Vec<EventStatusArg>,
}

/// Event statuses an operator can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventStatusArg {
    Pending,
    Partial,
    Error,
}

impl std::fmt::Display for EventStatusArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

impl From<EventStatusArg> for EventStatus {
    fn from(arg: EventStatusArg) -> Self {
        match arg {
            EventStatusArg::Pending => Self::Pending,
            EventStatusArg::Partial => Self::Partial,
            EventStatusArg::Error => Self::Error,
        }
    }
}
