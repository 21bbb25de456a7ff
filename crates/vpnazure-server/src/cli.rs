//! CLI entry point for the broker.
//!
//! Usable standalone (`vpnazure-server`) or as the `server` subcommand of
//! the unified `vpnazure` binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vpnazure_auth::CredentialStore;

use crate::broker::SessionBroker;
use crate::logfile::LogFile;
use crate::server::{Shared, run_with_shutdown};
use crate::suffix::SuffixStore;

/// Relay broker CLI arguments. Positional arguments are a usage error.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "vpnazure-server",
    version,
    about = "TLS relay broker for VPN hosts"
)]
pub struct ServerArgs {
    /// Listening address and port
    #[arg(short = 'b', long = "bind", value_name = "HOST:PORT")]
    pub listen: String,

    /// File that contains DNS suffixes of the service
    #[arg(long = "suffix", value_name = "PATH")]
    pub suffix_file: PathBuf,

    /// File that contains server credentials
    #[arg(long = "auth", value_name = "PATH")]
    pub auth_file: PathBuf,

    /// Path to the log file (stdout when omitted)
    #[arg(long = "log", value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Run the broker with the given arguments.
pub async fn run(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let log_file = match &args.log_file {
        Some(path) => Some(LogFile::open(path)?),
        None => None,
    };
    init_tracing(log_file.clone());

    let listen: SocketAddr = args
        .listen
        .parse()
        .map_err(|_| format!("invalid listen address {}", args.listen))?;

    let creds = Arc::new(CredentialStore::new());
    let suffixes = Arc::new(SuffixStore::new());

    match suffixes.load(&args.suffix_file, &creds)? {
        0 => return Err("at least 1 DNS suffix is needed".into()),
        n => info!("loaded {} suffixes", n),
    }
    match creds.load(&args.auth_file)? {
        0 => return Err("at least 1 server credential is needed".into()),
        n => info!("loaded {} server credentials", n),
    }

    let broker = Arc::new(SessionBroker::new());
    let shared = Arc::new(Shared {
        suffixes: suffixes.clone(),
        creds: creds.clone(),
        broker: broker.clone(),
    });

    // Graceful shutdown on SIGTERM/SIGINT.
    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal_handler().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    // SIGHUP reloads both files; SIGUSR2 reopens the log.
    #[cfg(unix)]
    {
        let args = args.clone();
        let suffixes = suffixes.clone();
        let creds = creds.clone();
        let broker = broker.clone();
        let log_file = log_file.clone();
        tokio::spawn(async move {
            reload_signal_handler(args, suffixes, creds, broker, log_file).await;
        });
    }

    run_with_shutdown(listen, shared, shutdown).await?;
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Handle SIGHUP (reload configuration files) and SIGUSR2 (reopen the log
/// file) for the lifetime of the process.
///
/// A reload that ends with zero suffixes or zero credentials is fatal, as at
/// startup. After a successful reload every registered host is evicted so it
/// reconnects under the new configuration.
#[cfg(unix)]
async fn reload_signal_handler(
    args: ServerArgs,
    suffixes: Arc<SuffixStore>,
    creds: Arc<CredentialStore>,
    broker: Arc<SessionBroker<crate::server::TlsConn>>,
    log_file: Option<LogFile>,
) {
    use tokio::signal::unix::{SignalKind, signal};
    use tracing::error;

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(sig) => sig,
        Err(e) => {
            warn!("failed to install SIGHUP handler: {}, reload disabled", e);
            return;
        }
    };
    let mut reopen = match signal(SignalKind::user_defined2()) {
        Ok(sig) => sig,
        Err(e) => {
            warn!("failed to install SIGUSR2 handler: {}, reload disabled", e);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                info!("received signal to reload files");

                match suffixes.load(&args.suffix_file, &creds) {
                    Ok(n) if n > 0 => info!("loaded {} suffixes", n),
                    Ok(_) => {
                        error!("at least 1 DNS suffix is needed");
                        std::process::exit(1);
                    }
                    Err(e) => {
                        error!("failed to read suffix file: {}", e);
                        std::process::exit(1);
                    }
                }
                match creds.load(&args.auth_file) {
                    Ok(n) if n > 0 => info!("loaded {} server credentials", n),
                    Ok(_) => {
                        error!("at least 1 server credential is needed");
                        std::process::exit(1);
                    }
                    Err(e) => {
                        error!("failed to read credential file: {}", e);
                        std::process::exit(1);
                    }
                }

                // Registered hosts reconnect under the new configuration.
                broker.cleanup_servers();
            }
            _ = reopen.recv() => {
                let Some(ref log_file) = log_file else { continue };
                info!("received signal to reopen log file");
                if let Err(e) = log_file.reopen() {
                    warn!("failed to reopen log file: {}", e);
                }
            }
        }
    }
}

/// Initialize the tracing subscriber, honoring `RUST_LOG` when set.
fn init_tracing(log_file: Option<LogFile>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(file)
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}
