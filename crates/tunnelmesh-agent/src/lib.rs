//! Tunnel Agent - Connected proxy tracking for reverse tunnel agents
//!
//! An agent keeps one reverse tunnel open to every proxy it can reach. This
//! crate tracks *which* proxies those are, so reconnection and health-check
//! logic can react when the set changes without hammering the proxies.
//!
//! # Features
//!
//! - **Connected proxies**: [`ConnectedProxies`] holds the latest proxy set
//!   and signals changes through a single-slot, coalescing channel
//! - **Proxy identity**: [`proxy_id_from_principals`] recovers a proxy id from
//!   the principals of the proxy's certificate
//! - **Rate limiting**: change signals are [`SignalSource`]s and can be fed
//!   straight into a [`tunnelmesh_signal::Debouncer`]
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tunnelmesh_agent::{proxy_ids_from_principals, ConnectedProxies};
//! use tunnelmesh_signal::{DebounceConfig, Debouncer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let proxies = Arc::new(ConnectedProxies::new());
//!     let debouncer = Debouncer::new(DebounceConfig::default())?;
//!     let mut changes = debouncer.debounce(CancellationToken::new(), proxies.wait_for_change());
//!
//!     let principals = vec![vec!["4a1c.example.com".to_string()]];
//!     proxies.update_proxy_ids(proxy_ids_from_principals(&principals));
//!
//!     while changes.recv().await.is_some() {
//!         println!("connected to {:?}", proxies.proxy_ids());
//!     }
//!
//!     Ok(())
//! }
//! ```

mod connected_proxies;
mod principal;

// Re-export public API
pub use connected_proxies::{ChangeReceiver, ConnectedProxies};
pub use principal::{proxy_id_from_principals, proxy_ids_from_principals};
pub use tunnelmesh_signal::SignalSource;
