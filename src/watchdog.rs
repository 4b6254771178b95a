/// Watchdog timer bound to a cancellation token.
///
/// A watchdog derives a child token from a parent and cancels it when the
/// caller fails to reset ("pet") it within `timeout`. Parent cancellation
/// reaches the child by inheritance; the watchdog only ever adds the expiry.
///
/// One monitor task runs per watchdog. It waits on parent cancellation,
/// teardown, countdown expiry and reset requests, and exits on the first of
/// the first three. Resets restart the countdown from the moment the monitor
/// observes them, not from the moment `reset()` was called.
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

/// Why the monitor task exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogExit {
    /// No reset arrived within the timeout; the watchdog cancelled the token.
    Expired,
    /// The token was cancelled from outside, usually by the parent.
    Cancelled,
    /// The owning `Watchdog` was stopped or dropped; the token was left live.
    Stopped,
}

/// What the monitor task saw over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogReport {
    pub exit: WatchdogExit,
    /// Reset requests consumed by the monitor. Coalesced requests count once.
    pub resets_observed: u64,
    /// Time from monitor start to exit.
    pub lifetime: Duration,
}

/// Cloneable handle that pets the watchdog.
///
/// Backed by a bounded channel of capacity one. A reset that finds the slot
/// full is dropped: at least one reset is still pending, which is all the
/// monitor needs. Resets after the monitor has exited are no-ops.
#[derive(Debug, Clone)]
pub struct ResetHandle {
    tx: mpsc::Sender<()>,
}

impl ResetHandle {
    /// Request a countdown restart. Never blocks and never fails.
    pub fn reset(&self) {
        match self.tx.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => trace!("reset already pending, coalesced"),
            Err(TrySendError::Closed(())) => trace!("reset after watchdog exit ignored"),
        }
    }
}

/// Watchdog owning its monitor task.
///
/// Dropping it (or calling [`stop`](Watchdog::stop)) tears the monitor down
/// without cancelling the token. Use [`into_parts`](Watchdog::into_parts) to
/// detach the monitor instead.
pub struct Watchdog {
    token: CancellationToken,
    reset: ResetHandle,
    teardown: CancellationToken,
    guard: DropGuard,
    monitor: JoinHandle<WatchdogReport>,
}

impl Watchdog {
    /// Start a watchdog under `parent`. The countdown begins as soon as the
    /// monitor task first runs. A zero timeout expires on the first poll.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(parent: &CancellationToken, timeout: Duration) -> Self {
        let token = parent.child_token();
        let teardown = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);

        let monitor = tokio::spawn(monitor(token.clone(), teardown.clone(), rx, timeout));
        debug!(timeout_ms = timeout.as_millis() as u64, "watchdog started");

        Self {
            token,
            reset: ResetHandle { tx },
            guard: teardown.clone().drop_guard(),
            teardown,
            monitor,
        }
    }

    /// The derived token: cancelled on expiry or when the parent is cancelled.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn reset(&self) {
        self.reset.reset();
    }

    pub fn reset_handle(&self) -> ResetHandle {
        self.reset.clone()
    }

    /// Stop monitoring. The token keeps whatever state it has.
    pub fn stop(&self) {
        self.teardown.cancel();
    }

    /// True once the monitor task has exited.
    pub fn is_finished(&self) -> bool {
        self.monitor.is_finished()
    }

    /// Wait for the monitor to exit and return what it saw.
    ///
    /// The monitor is not torn down while waiting, so this resolves on
    /// expiry, on cancellation, or after a prior [`stop`](Watchdog::stop).
    pub async fn join(self) -> Result<WatchdogReport, JoinError> {
        let Watchdog { monitor, guard, .. } = self;
        let report = monitor.await;
        drop(guard);
        report
    }

    /// Detach the monitor and hand back the token and a reset handle.
    ///
    /// The monitor then lives until expiry or parent cancellation.
    pub fn into_parts(self) -> (CancellationToken, ResetHandle) {
        let Watchdog {
            token,
            reset,
            guard,
            ..
        } = self;
        guard.disarm();
        (token, reset)
    }
}

/// Derive a token from `parent` that is cancelled unless the returned handle
/// resets it at least once every `timeout`.
///
/// The monitor task is detached. It exits on expiry or on parent
/// cancellation, so it never outlives `timeout` past the last reset.
pub fn with_watchdog(
    parent: &CancellationToken,
    timeout: Duration,
) -> (CancellationToken, ResetHandle) {
    Watchdog::spawn(parent, timeout).into_parts()
}

/// One-shot countdown with a restartable deadline.
struct Countdown {
    timeout: Duration,
    sleep: Pin<Box<Sleep>>,
}

impl Countdown {
    fn start(timeout: Duration) -> Self {
        Self {
            timeout,
            sleep: Box::pin(tokio::time::sleep(timeout)),
        }
    }

    async fn expired(&mut self) {
        self.sleep.as_mut().await
    }

    /// Restart the countdown at `now + timeout`.
    ///
    /// Contract: an expiry that already fired but was not consumed by the
    /// monitor is discarded first, so the rearmed countdown cannot fire on a
    /// stale deadline. Never blocks. Returns true if a stale expiry was
    /// discarded.
    fn rearm(&mut self) -> bool {
        let stale = self.sleep.is_elapsed();
        self.sleep.as_mut().reset(deadline_after(self.timeout));
        stale
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    // Same cap tokio applies to `sleep` when the deadline overflows.
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30))
}

async fn monitor(
    token: CancellationToken,
    teardown: CancellationToken,
    mut resets: mpsc::Receiver<()>,
    timeout: Duration,
) -> WatchdogReport {
    let started = Instant::now();
    let mut countdown = Countdown::start(timeout);
    let mut resets_observed = 0u64;
    let mut handles_alive = true;

    // Biased: an expiry that is ready alongside a reset wins, so a reset
    // racing with expiry can never undo or repeat a cancellation.
    let exit = loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("watchdog token cancelled externally");
                break WatchdogExit::Cancelled;
            }
            _ = teardown.cancelled() => {
                debug!("watchdog stopped");
                break WatchdogExit::Stopped;
            }
            _ = countdown.expired() => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    resets_observed,
                    "watchdog expired, cancelling"
                );
                token.cancel();
                break WatchdogExit::Expired;
            }
            msg = resets.recv(), if handles_alive => match msg {
                Some(()) => {
                    resets_observed += 1;
                    if countdown.rearm() {
                        debug!("discarded stale watchdog expiry");
                    }
                    trace!(resets_observed, "watchdog reset");
                }
                None => {
                    debug!("all reset handles dropped, waiting for expiry");
                    handles_alive = false;
                }
            },
        }
    };

    WatchdogReport {
        exit,
        resets_observed,
        lifetime: started.elapsed(),
    }
}
