use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::error::DaemonError;
use super::types::{CancelToken, Operation};
use crate::config::ReadinessConfig;

/// Longest single sleep between cancellation checks.
const CANCEL_SLICE: Duration = Duration::from_millis(50);

/// Delays between probes: `initial`, then multiplied each step, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            next: initial.min(max),
            max,
            multiplier: multiplier.max(1.0),
        }
    }

    pub fn from_config(cfg: &ReadinessConfig) -> Self {
        Self::new(cfg.initial_delay(), cfg.max_delay(), cfg.multiplier)
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        let grown = (self.next.as_nanos() as f64 * self.multiplier) as u64;
        self.next = Duration::from_nanos(grown).min(self.max);
        Some(current)
    }
}

/// Result of a single readiness probe.
pub enum Probe {
    Ready,
    /// Not answering yet; carries the probe's output.
    NotReady(String),
    /// Waiting any longer is pointless.
    Fatal(DaemonError),
}

/// Call `probe` until it reports [`Probe::Ready`], sleeping per `backoff`
/// in between. Returns the number of probes made.
///
/// `probe` is given the time left before `deadline` and must not block for
/// longer than that. Gives up with [`DaemonError::ReadinessTimeout`] once
/// `deadline` has elapsed, or [`DaemonError::Cancelled`] as soon as `cancel`
/// fires.
pub fn wait_until_ready(
    mut backoff: Backoff,
    deadline: Duration,
    cancel: &CancelToken,
    mut probe: impl FnMut(Duration) -> Probe,
) -> Result<u32, DaemonError> {
    let start = Instant::now();
    let mut attempts = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(DaemonError::Cancelled {
                op: Operation::Start,
            });
        }

        attempts += 1;
        let remaining = deadline.saturating_sub(start.elapsed());
        let last_output = match probe(remaining) {
            Probe::Ready => {
                debug!(attempts, elapsed = ?start.elapsed(), "docker daemon ready");
                return Ok(attempts);
            }
            Probe::Fatal(err) => return Err(err),
            Probe::NotReady(output) => output,
        };

        let elapsed = start.elapsed();
        if elapsed >= deadline {
            return Err(DaemonError::ReadinessTimeout {
                waited: elapsed,
                attempts,
                last_output,
            });
        }

        let delay = backoff
            .next()
            .unwrap_or(CANCEL_SLICE)
            .min(deadline - elapsed);
        trace!(attempts, ?delay, "docker daemon not ready yet");
        sleep_unless_cancelled(delay, cancel);
    }
}

fn sleep_unless_cancelled(total: Duration, cancel: &CancelToken) {
    let wake = Instant::now() + total;
    loop {
        let now = Instant::now();
        if now >= wake || cancel.is_cancelled() {
            return;
        }
        thread::sleep((wake - now).min(CANCEL_SLICE));
    }
}
