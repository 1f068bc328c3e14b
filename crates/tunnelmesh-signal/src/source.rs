//! Payload-free signal sources

use async_trait::async_trait;
use tokio::sync::mpsc;

/// A source of unit signals.
///
/// `recv` resolves to `Some(())` for every signal and to `None` once the
/// source has been closed by its owner. Implementations must be cancel safe:
/// dropping a pending `recv` future must not lose a signal.
#[async_trait]
pub trait SignalSource: Send {
    async fn recv(&mut self) -> Option<()>;
}

#[async_trait]
impl SignalSource for mpsc::Receiver<()> {
    async fn recv(&mut self) -> Option<()> {
        mpsc::Receiver::recv(self).await
    }
}
