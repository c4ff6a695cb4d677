use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Market-making and fee-claiming engine for bonding-curve tokens —
/// per-token trading flywheels, creator-fee collection, launch watching,
/// and webhook-driven counter-trades.
#[derive(Parser)]
#[command(name = "curvewheel", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the engine: all schedulers plus the webhook/admin HTTP server
    Serve {
        /// Bind host for the HTTP server
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Bind port for the HTTP server
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Directory for the sqlite database
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },

    /// Create or upgrade the database schema, then exit
    Migrate {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
}
