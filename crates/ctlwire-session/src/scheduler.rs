use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::ReconnectPolicy;
use crate::coordinator::{Coordinator, TickReport};

/// Longest uninterrupted sleep between cancellation checks.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Cloneable cancellation flag shared between the poll loop and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    AllReady { ticks: u32 },
    Cancelled,
    GaveUp { attempts: u32 },
}

/// Drives [`Coordinator::tick`] on the cadence of a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct PollScheduler {
    policy: ReconnectPolicy,
    delay: Duration,
    attempts: u32,
}

impl PollScheduler {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let delay = policy.interval();
        Self {
            policy,
            delay,
            attempts: 0,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Ticks run since the last restart.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the tick following `report`.
    ///
    /// Ticks that made progress, or had nothing fail, reset to the base
    /// interval. A tick where endpoints only failed returns the current
    /// delay and grows the next one by the backoff multiplier, up to the cap.
    pub fn next_delay(&mut self, report: &TickReport) -> Duration {
        let base = self.policy.interval();
        if report.advanced > 0 || report.failed.is_empty() {
            self.delay = base;
            return base;
        }

        let delay = self.delay;
        let multiplier = if self.policy.backoff_multiplier.is_finite() {
            self.policy.backoff_multiplier.max(1.0)
        } else {
            1.0
        };
        self.delay = delay.mul_f64(multiplier).min(self.policy.max_interval());
        delay
    }

    /// Forget earlier attempts and backoff, e.g. after an endpoint dropped.
    pub fn restart(&mut self) {
        debug!("poll scheduler restarted");
        self.attempts = 0;
        self.delay = self.policy.interval();
    }

    /// Tick `coordinator` until every endpoint is ready, the attempt budget
    /// runs out, or `cancel` fires.
    ///
    /// With `stop_when_ready` disabled, polling continues after readiness
    /// and only cancellation or the attempt budget ends it.
    pub fn run_until_ready(&mut self, coordinator: &mut Coordinator, cancel: &CancelToken) -> PollOutcome {
        loop {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled;
            }

            let report = coordinator.tick_with_report();
            self.attempts = self.attempts.saturating_add(1);

            if report.all_ready && self.policy.stop_when_ready {
                info!(ticks = self.attempts, "polling stopped, all endpoints ready");
                return PollOutcome::AllReady {
                    ticks: self.attempts,
                };
            }
            if let Some(max) = self.policy.max_attempts {
                if !report.all_ready && self.attempts >= max {
                    warn!(attempts = self.attempts, "giving up before all endpoints were ready");
                    return PollOutcome::GaveUp {
                        attempts: self.attempts,
                    };
                }
            }

            let delay = self.next_delay(&report);
            if !sleep_unless_cancelled(delay, cancel) {
                return PollOutcome::Cancelled;
            }
        }
    }
}

/// Sleep for `duration` in short slices. Returns false if cancelled.
fn sleep_unless_cancelled(duration: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
