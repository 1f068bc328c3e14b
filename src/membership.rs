//! Proxy membership snapshots read from a line-oriented feed
//!
//! Each line is one snapshot of the agent's proxy connections. Connections
//! are separated by whitespace and list their certificate principals
//! separated by commas, e.g. `a1.cluster,a1 b2.cluster`. An empty line means
//! the agent is connected to no proxies; lines starting with `#` are ignored.

use std::io::{self, BufRead};
use std::thread;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tunnelmesh_agent::{proxy_ids_from_principals, ConnectedProxies};

/// Parse one snapshot line into per-connection principal lists.
///
/// Returns `None` for comment lines.
pub fn parse_membership_line(line: &str) -> Option<Vec<Vec<String>>> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }

    Some(
        line.split_whitespace()
            .map(|connection| {
                connection
                    .split(',')
                    .filter(|principal| !principal.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .collect(),
    )
}

/// Read lines of `input` on a dedicated thread.
///
/// A blocking read cannot be interrupted, so the thread is detached rather
/// than joined: it never holds up shutdown and exits on its own at end of
/// input or once the returned receiver is dropped.
pub fn spawn_line_reader<R>(input: R) -> io::Result<mpsc::Receiver<io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);

    thread::Builder::new()
        .name("membership-reader".to_string())
        .spawn(move || {
            for line in input.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;

    Ok(rx)
}

/// Apply snapshot lines to `proxies` until the line source closes or
/// `cancel` fires. Returns the number of snapshots applied.
pub async fn feed_membership(
    mut lines: mpsc::Receiver<io::Result<String>>,
    proxies: &ConnectedProxies,
    cancel: &CancellationToken,
) -> io::Result<usize> {
    let mut applied = 0;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.recv() => line,
        };

        let Some(line) = line.transpose()? else {
            debug!("Membership feed closed");
            break;
        };

        let Some(connections) = parse_membership_line(&line) else {
            continue;
        };

        let unidentified = connections.iter().filter(|c| c.is_empty()).count();
        if unidentified > 0 {
            warn!(
                unidentified,
                "Skipping proxy connections without certificate principals"
            );
        }

        let ids = proxy_ids_from_principals(&connections);
        debug!(
            connections = connections.len(),
            proxy_count = ids.len(),
            "Applying membership snapshot"
        );

        proxies.update_proxy_ids(ids);
        applied += 1;
    }

    Ok(applied)
}
