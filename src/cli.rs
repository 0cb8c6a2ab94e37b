//! Command-line surface.

use clap::{Parser, Subcommand};

use crate::sync::options::SyncArgs;

#[derive(Debug, Parser)]
#[command(name = "gitfleet", version, about = "Multi-repository synchronization engine")]
pub struct Cli {
    /// Increase logging verbosity (-v, -vv).
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Reconcile the local workspace with the manifest.
    Sync(SyncArgs),
    /// Not implemented by this engine; manifest/workspace initialization is
    /// out of scope.
    Init,
}
