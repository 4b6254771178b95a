/// Simulated watched worker: pets a watchdog on a fixed interval, then stalls.
///
/// Drives the `watchgod` binary and shows the three ways a watched unit of
/// work ends: the worker finishes with its token live, the watchdog expires,
/// or the parent is cancelled.
use crate::config::{HeartbeatConfig, WatchdogConfig};
use crate::watchdog::{Watchdog, WatchdogExit, WatchdogReport};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How a heartbeat run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// All beats were sent and the grace period passed with the token live.
    Finished,
    /// The watchdog cancelled the token.
    Expired,
    /// The parent token was cancelled (e.g. Ctrl-C).
    Interrupted,
}

/// Result of a heartbeat run.
#[derive(Debug)]
pub struct HeartbeatSummary {
    pub outcome: HeartbeatOutcome,
    /// Resets issued by the worker (before coalescing).
    pub beats_sent: u32,
    pub report: WatchdogReport,
}

/// Run the simulated worker under a watchdog derived from `parent`.
pub async fn run_heartbeat(
    parent: &CancellationToken,
    watchdog: &WatchdogConfig,
    heartbeat: &HeartbeatConfig,
) -> Result<HeartbeatSummary, JoinError> {
    let dog = Watchdog::spawn(parent, watchdog.timeout());
    let token = dog.token().clone();
    info!(
        timeout_ms = watchdog.timeout_ms,
        interval_ms = heartbeat.interval_ms,
        beats = heartbeat.beats,
        "worker started"
    );

    let mut beats_sent = 0u32;
    while beats_sent < heartbeat.beats {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(heartbeat.interval()) => {
                dog.reset();
                beats_sent += 1;
                debug!(beat = beats_sent, "heartbeat");
            }
        }
    }

    if !token.is_cancelled() {
        info!(
            beats_sent,
            grace_ms = heartbeat.grace_ms,
            "worker stalled, waiting for watchdog"
        );
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(heartbeat.grace()) => {
                debug!("grace period elapsed, stopping watchdog");
                dog.stop();
            }
        }
    }

    let report = dog.join().await?;
    let outcome = match report.exit {
        WatchdogExit::Expired => HeartbeatOutcome::Expired,
        WatchdogExit::Cancelled => HeartbeatOutcome::Interrupted,
        WatchdogExit::Stopped => HeartbeatOutcome::Finished,
    };
    info!(
        ?outcome,
        beats_sent,
        resets_observed = report.resets_observed,
        lifetime_ms = report.lifetime.as_millis() as u64,
        "worker done"
    );

    Ok(HeartbeatSummary {
        outcome,
        beats_sent,
        report,
    })
}
