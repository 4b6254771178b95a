//! Watchdog timers for tokio cancellation tokens.
//!
//! [`with_watchdog`] derives a child [`CancellationToken`] that is cancelled
//! when the parent is, or when the returned [`ResetHandle`] is not reset
//! within the timeout. [`Watchdog`] is the owned form with explicit teardown.

pub mod config;
pub mod heartbeat;
pub mod watchdog;

pub use tokio_util::sync::CancellationToken;
pub use watchdog::{with_watchdog, ResetHandle, Watchdog, WatchdogExit, WatchdogReport};
