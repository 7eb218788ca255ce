//! Process entry point.
//!
//! Wires configuration, logging, and the process-wide `SessionStore`
//! together, then runs the periodic recovery scan as a long-lived
//! loop -- the closest thing this crate has to the coordinator process
//! that would otherwise own the store's lifecycle. The two-phase
//! protocol, RPC transport, and admin console HTTP layer stay out of
//! scope; this binary only keeps the status index converging.

use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use txn_session_store::config::load_config;
use txn_session_store::logging::init_logging;
use txn_session_store::{recovery, session_store};

#[derive(Parser, Debug)]
#[command(author, version, about = "Transaction coordinator session store", long_about = None)]
struct Args {
    /// Run for a fixed number of seconds instead of until Ctrl+C (for smoke tests).
    #[arg(long)]
    duration: Option<u64>,

    /// Seconds between recovery scan passes.
    #[arg(long, default_value_t = 30)]
    recovery_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    init_logging();

    let config = load_config();
    let store = session_store(&config.store.redis)?;
    info!(
        host = %config.store.redis.host,
        port = config.store.redis.port,
        query_limit = config.store.redis.query_limit,
        "session store initialized"
    );

    let interval_secs = args.recovery_interval_secs.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    info!(interval_secs, "starting recovery scan loop");

    let shutdown = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match recovery::scan_and_repair(&store).await {
                    Ok(report) => info!(?report, "recovery scan complete"),
                    Err(e) => error!(error = %e, "recovery scan failed"),
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}
