use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Token stamped on every fetch. Results carrying an old one are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

/// Fixed-cadence poll clock for one room.
///
/// `activate` starts a new generation whose first tick fires immediately;
/// `deactivate` stops ticking and invalidates the current generation.
#[derive(Debug)]
pub struct PollScheduler {
    period: Duration,
    interval: Option<Interval>,
    generation: Generation,
}

impl PollScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
            generation: Generation(0),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn activate(&mut self) -> Generation {
        self.generation.0 += 1;
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self.generation
    }

    pub fn deactivate(&mut self) {
        if self.interval.take().is_some() {
            self.generation.0 += 1;
        }
    }

    /// True only while active and `generation` is the one in force.
    pub fn is_current(&self, generation: Generation) -> bool {
        self.is_active() && generation == self.generation
    }

    /// Wait for the next poll. Never resolves while inactive.
    pub async fn tick(&mut self) -> Generation {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
                self.generation
            }
            None => std::future::pending().await,
        }
    }
}
