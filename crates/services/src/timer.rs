use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::debug;

/// What one elapsed period of the countdown produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { remaining: u32 },
    /// Reached zero. Yielded once, after which the timer is stopped.
    Expired,
}

/// Per-second countdown for the single-threaded exam loop.
///
/// Events are pulled with `next_event`; `stop` drops the interval so nothing is
/// delivered afterwards, including periods that already elapsed.
#[derive(Debug)]
pub struct CountdownTimer {
    period: Duration,
    interval: Option<Interval>,
    remaining: u32,
}

impl CountdownTimer {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
            remaining: 0,
        }
    }

    /// Begin counting down from `duration_seconds`; the first tick lands one period from now.
    ///
    /// Restarting a running timer resets the countdown.
    pub fn start(&mut self, duration_seconds: u32) {
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        // A stalled loop must still account for every second that passed.
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        self.interval = Some(interval);
        self.remaining = duration_seconds;
        debug!(duration_seconds, "countdown started");
    }

    /// Halt the countdown. Safe to call any number of times.
    pub fn stop(&mut self) {
        if self.interval.take().is_some() {
            debug!(remaining = self.remaining, "countdown stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Wait for the next countdown event. Pends forever while stopped.
    ///
    /// Cancel safe: dropping the future before it resolves loses no period.
    pub async fn next_event(&mut self) -> TimerEvent {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
                self.elapse()
            }
            None => std::future::pending().await,
        }
    }

    fn elapse(&mut self) -> TimerEvent {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.stop();
            TimerEvent::Expired
        } else {
            TimerEvent::Tick {
                remaining: self.remaining,
            }
        }
    }
}
