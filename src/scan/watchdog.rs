//! Stall detection for a running scan.
//!
//! The watchdog only observes, except in one case: when the processed count
//! has not moved for longer than the stall threshold it marks the scan timed
//! out and cancels the pipeline.

use super::progress::SharedSession;
use crate::config::WatchdogConfig;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Healthy,
    Finished,
    Stalled,
}

fn stall_message(timeout: Duration) -> String {
    if timeout.as_secs() > 0 {
        format!("Scan timed out - no progress for {} seconds", timeout.as_secs())
    } else {
        format!("Scan timed out - no progress for {} ms", timeout.as_millis())
    }
}

fn check(session: &SharedSession, scan_id: &str, config: &WatchdogConfig) -> Verdict {
    let mut session = session.lock();
    if !session.is_current(scan_id) || !session.progress.state.is_running() {
        return Verdict::Finished;
    }

    let idle = session.last_progress.elapsed();
    if idle <= config.stall_timeout {
        return Verdict::Healthy;
    }

    log::warn!(
        "scan {} made no progress for {:?} ({} of {} processed), cancelling",
        scan_id,
        idle,
        session.progress.processed,
        session.progress.total_messages
    );
    session.time_out(stall_message(config.stall_timeout));
    Verdict::Stalled
}

/// Poll `session` until scan `scan_id` ends or stalls.
pub(crate) fn spawn_watchdog(
    session: SharedSession,
    scan_id: String,
    config: WatchdogConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match check(&session, &scan_id, &config) {
                Verdict::Healthy => continue,
                Verdict::Finished => {
                    log::debug!("watchdog for scan {} exiting", scan_id);
                    break;
                }
                Verdict::Stalled => break,
            }
        }
    })
}
