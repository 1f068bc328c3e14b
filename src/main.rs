//! tunnelmesh - Connected proxy watcher for reverse tunnel agents
//!
//! Feeds proxy membership snapshots into the connected proxy tracker and
//! reports changes at a rate bounded by exponential backoff.

mod config;
mod membership;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{WatchArgs, WatchConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tunnelmesh_agent::ConnectedProxies;
use tunnelmesh_signal::Debouncer;

/// tunnelmesh - Track the proxies a reverse tunnel agent is connected through
#[derive(Parser, Debug)]
#[command(name = "tunnelmesh")]
#[command(about = "tunnelmesh - Track the proxies a reverse tunnel agent is connected through")]
#[command(version)]
struct Cli {
    /// Enable verbose logging (same as --log-level debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch proxy membership snapshots read from stdin
    #[command(long_about = r#"
Read proxy membership snapshots from stdin and report changes to the set of
connected proxies. Bursts of changes are collapsed with exponential backoff.

Each input line is one snapshot: proxy connections separated by whitespace,
each listing its certificate principals separated by commas. An empty line
means no proxies are connected. Lines starting with '#' are ignored.

EXAMPLES:
  # Watch with default backoff (1s, up to 60s)
  printf 'a1.east,a1 b2.east\n' | tunnelmesh watch

  # Watch using a config file and faster reporting
  tunnelmesh watch --config tunnelmesh.yaml --initial-backoff-ms 200

ENVIRONMENT VARIABLES:
  TUNNELMESH_AGENT_ID            Agent identifier
  TUNNELMESH_INITIAL_BACKOFF_MS  Initial backoff in milliseconds
  TUNNELMESH_MAX_BACKOFF_MS      Maximum backoff in milliseconds
    "#)]
    Watch(WatchArgs),
}

/// Setup logging with the specified log level
fn setup_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("Invalid log level: {}", log_level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

/// Track membership from stdin until Ctrl+C or end of input
async fn run_watch(config: WatchConfig) -> Result<()> {
    info!(
        agent_id = %config.agent_id,
        initial_backoff_ms = config.debounce.initial_backoff.as_millis() as u64,
        max_backoff_ms = config.debounce.max_backoff.as_millis() as u64,
        "Watching connected proxies"
    );

    let proxies = Arc::new(ConnectedProxies::new());
    let cancel = CancellationToken::new();

    let debouncer = Debouncer::new(config.debounce).context("Invalid debounce configuration")?;
    let mut changes = debouncer.debounce(cancel.child_token(), proxies.wait_for_change());

    let lines = membership::spawn_line_reader(std::io::BufReader::new(std::io::stdin()))
        .context("Failed to start stdin reader thread")?;

    let feed = {
        let proxies = Arc::clone(&proxies);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let result = membership::feed_membership(lines, &proxies, &cancel).await;
            // End of input ends the watch
            cancel.cancel();
            result
        })
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !cancel.is_cancelled() => {
                info!("Received Ctrl+C, shutting down...");
                cancel.cancel();
            }
            change = changes.recv() => {
                if change.is_none() {
                    break;
                }

                let ids = proxies.proxy_ids();
                info!(
                    agent_id = %config.agent_id,
                    proxy_count = ids.len(),
                    proxies = ?ids,
                    "Connected proxies changed"
                );
            }
        }
    }

    let snapshots = feed
        .await
        .context("Membership feed task panicked")?
        .context("Failed to read membership snapshots")?;
    let debouncer = changes.join().await.context("Debouncer failed")?;

    info!(
        snapshots,
        proxies = ?proxies.proxy_ids(),
        backoff_ms = debouncer.current_backoff().as_millis() as u64,
        "tunnelmesh stopped"
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        "debug"
    } else {
        cli.log_level.as_str()
    };
    setup_logging(log_level)?;

    match cli.command {
        Commands::Watch(args) => {
            info!("tunnelmesh starting...");

            let config =
                config::build_watch_config(args).context("Failed to build watch configuration")?;

            run_watch(config).await
        }
    }
}
