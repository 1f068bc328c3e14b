//! Unit signal plumbing for tunnel agents
//!
//! Provides the [`SignalSource`] abstraction shared by every payload-free
//! notification in the agent, and a [`Debouncer`] that relays such signals
//! with exponential backoff so bursts collapse into rare notifications.

pub mod debounce;
pub mod source;

pub use debounce::{DebounceConfig, DebounceError, Debounced, Debouncer};
pub use source::SignalSource;
