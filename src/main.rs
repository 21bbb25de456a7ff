//! Unified vpnazure CLI.
//!
//! - `vpnazure server` - Run the relay broker
//!
//! The broker can also be run as the standalone `vpnazure-server` binary.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// vpnazure unified CLI.
#[derive(Parser)]
#[command(
    name = "vpnazure",
    version,
    about = "A TLS relay broker for the VPN Azure rendezvous protocol",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay broker.
    #[command(name = "server", alias = "serve")]
    Server(Box<vpnazure_server::ServerArgs>),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result: Result<(), String> = match cli.command {
        Commands::Server(args) => vpnazure_server::cli::run(*args)
            .await
            .map_err(|e| e.to_string()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
