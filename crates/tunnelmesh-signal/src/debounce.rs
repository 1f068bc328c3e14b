//! Signal debouncing with exponential backoff
//!
//! A [`Debouncer`] wraps a [`SignalSource`] and republishes it to whoever
//! is waiting on the returned [`Debounced`] handle, holding each relayed
//! signal back until the current backoff period has elapsed. A relayed
//! signal with no receiver waiting at that moment is dropped.
//!
//! The backoff doubles while signals keep arriving faster than the period
//! and drops back to the initial value after a quiet period, so bursts of
//! upstream changes collapse into a handful of downstream notifications.

use crate::SignalSource;
use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

/// Debounce configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Backoff used for the first relayed signal and after a quiet period
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl DebounceConfig {
    pub fn new(initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            initial_backoff,
            max_backoff,
        }
    }

    /// Check that the backoff bounds can drive a timer.
    pub fn validate(&self) -> Result<(), DebounceError> {
        if self.initial_backoff.is_zero() {
            return Err(DebounceError::InvalidConfig(
                "initial backoff must be greater than zero".to_string(),
            ));
        }

        if self.initial_backoff > self.max_backoff {
            return Err(DebounceError::InvalidConfig(format!(
                "initial backoff ({}ms) exceeds max backoff ({}ms)",
                self.initial_backoff.as_millis(),
                self.max_backoff.as_millis()
            )));
        }

        Ok(())
    }
}

/// Debounce errors
#[derive(Debug, Error)]
pub enum DebounceError {
    #[error("Invalid debounce configuration: {0}")]
    InvalidConfig(String),

    #[error("Debounce task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Relays unit signals at a rate limited by exponential backoff.
///
/// The current backoff carries over between activations. Activating a
/// debouncer with [`Debouncer::debounce`] moves it into the relay task, and
/// [`Debounced::join`] hands it back once that task has terminated, so only
/// one activation can ever touch the backoff state.
#[derive(Debug)]
pub struct Debouncer {
    config: DebounceConfig,
    current_backoff: Duration,
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Result<Self, DebounceError> {
        config.validate()?;

        Ok(Self {
            current_backoff: config.initial_backoff,
            config,
        })
    }

    pub fn config(&self) -> DebounceConfig {
        self.config
    }

    /// Get the backoff the next activation starts with
    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }

    /// Reset backoff to its initial value
    pub fn reset(&mut self) {
        debug!("Resetting debounce backoff");
        self.current_backoff = self.config.initial_backoff;
    }

    /// Start relaying `inbound` until `cancel` fires or `inbound` closes.
    ///
    /// Must be called from within a tokio runtime. The returned handle
    /// yields the relayed signals; dropping it also stops the relay.
    pub fn debounce<S>(self, cancel: CancellationToken, inbound: S) -> Debounced
    where
        S: SignalSource + 'static,
    {
        // Cancelled by the caller's token, or by dropping the handle
        let stop = cancel.child_token();
        let outbound = Arc::new(Outbound::default());
        let task = tokio::spawn(self.run(stop.clone(), inbound, Arc::clone(&outbound)));

        Debounced {
            outbound,
            task,
            stop_on_drop: stop.drop_guard(),
        }
    }

    async fn run<S: SignalSource>(
        mut self,
        stop: CancellationToken,
        mut inbound: S,
        outbound: Arc<Outbound>,
    ) -> Self {
        // Closes the outbound side on every exit path, unwinding included
        let _closed = outbound.closed.clone().drop_guard();
        let mut ticker = backoff_ticker(self.current_backoff);

        debug!(
            backoff_ms = self.current_backoff.as_millis() as u64,
            "Debouncer started"
        );

        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    debug!("Debouncer stopped");
                    break;
                }
                signal = inbound.recv() => {
                    if signal.is_none() {
                        debug!("Debounced source closed");
                        break;
                    }
                }
            }

            // The timer already fired: nothing was relayed for a full period.
            if ticker.tick().now_or_never().is_some() {
                outbound.relay();
                self.current_backoff = self.config.initial_backoff;
                ticker = backoff_ticker(self.current_backoff);
                continue;
            }

            tokio::select! {
                _ = stop.cancelled() => {
                    debug!("Debouncer stopped during backoff");
                    break;
                }
                _ = ticker.tick() => {
                    outbound.relay();
                    self.current_backoff = self
                        .current_backoff
                        .saturating_mul(2)
                        .min(self.config.max_backoff);
                    ticker = backoff_ticker(self.current_backoff);

                    trace!(
                        backoff_ms = self.current_backoff.as_millis() as u64,
                        "Increased debounce backoff"
                    );
                }
            }
        }

        self
    }
}

/// Outbound side of an activation
#[derive(Debug, Default)]
struct Outbound {
    notify: Notify,
    closed: CancellationToken,
}

impl Outbound {
    /// Wake every receiver waiting right now. Nothing is stored, so with no
    /// receiver waiting the signal is dropped.
    fn relay(&self) {
        self.notify.notify_waiters();
        trace!("Relayed debounced signal");
    }
}

/// A running debouncer activation.
///
/// Dropping the handle stops the relay.
#[derive(Debug)]
pub struct Debounced {
    outbound: Arc<Outbound>,
    task: JoinHandle<Debouncer>,
    stop_on_drop: DropGuard,
}

impl Debounced {
    /// Wait for the next relayed signal. Returns `None` once the relay has stopped.
    ///
    /// Only signals relayed while this call is waiting are observed.
    pub async fn recv(&mut self) -> Option<()> {
        if self.outbound.closed.is_cancelled() {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.outbound.notify.notified() => Some(()),
            _ = self.outbound.closed.cancelled() => None,
        }
    }

    /// Whether the relay has stopped and closed its outbound side
    pub fn is_closed(&self) -> bool {
        self.outbound.closed.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the relay to stop and take back the debouncer, along with
    /// the backoff it reached.
    ///
    /// This only returns after the activation's token is cancelled or its
    /// source is closed.
    pub async fn join(self) -> Result<Debouncer, DebounceError> {
        let Debounced {
            outbound,
            task,
            stop_on_drop,
        } = self;
        let debouncer = task.await?;
        drop(stop_on_drop);
        drop(outbound);

        Ok(debouncer)
    }
}

#[async_trait]
impl SignalSource for Debounced {
    async fn recv(&mut self) -> Option<()> {
        Debounced::recv(self).await
    }
}

/// Periodic timer whose first tick is one full period away.
fn backoff_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
