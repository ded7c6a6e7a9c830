// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! The `gwr` binary: a declarative configuration reconciler for
//! API-gateway control planes.

use clap::{Parser, Subcommand};
use gwr_cli::commands::{self, Connection, RunFlags};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gwr", version, about = "Gateway state reconciler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Admin API base URL.
    #[arg(long, global = true, default_value = "http://localhost:8001")]
    addr: String,

    /// Auth header sent with every request, as NAME=VALUE.
    #[arg(long, global = true)]
    auth_header: Option<String>,

    /// Treat the control plane as hosted (affects capability flags).
    #[arg(long, global = true)]
    hosted: bool,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the changes needed to reach the state file (no writes).
    Diff {
        /// Path to the JSON state document.
        #[arg(long, short)]
        state: String,

        /// Output mode: text or json.
        #[arg(long, default_value = "text")]
        output: String,

        #[command(flatten)]
        flags: RunFlags,
    },

    /// Apply the state file to the control plane.
    Sync {
        /// Path to the JSON state document.
        #[arg(long, short)]
        state: String,

        /// Output mode: text or json.
        #[arg(long, default_value = "text")]
        output: String,

        /// Plan and report without issuing any writes.
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        flags: RunFlags,
    },

    /// Print the control plane's current configuration as a document.
    Dump {
        #[command(flatten)]
        flags: RunFlags,
    },

    /// Check connectivity and print the control plane version.
    Ping,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let connection = Connection {
        addr: cli.addr,
        auth_header: cli.auth_header,
        hosted: cli.hosted,
    };

    let code = match cli.command {
        Commands::Diff {
            state,
            output,
            flags,
        } => commands::diff(&connection, &state, &output, flags).await,
        Commands::Sync {
            state,
            output,
            dry_run,
            flags,
        } => commands::sync(&connection, &state, &output, dry_run, flags).await,
        Commands::Dump { flags } => commands::dump(&connection, flags).await,
        Commands::Ping => commands::ping(&connection).await,
    };
    std::process::exit(code);
}
