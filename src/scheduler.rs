//! Heart rate keep-alive scheduling.
//!
//! The band silently ends continuous heart rate monitoring after a while, so
//! while monitoring is active the session re-sends stop+start on a fixed
//! period. The timer task only posts [`KeepAliveTick`]s into the session's
//! inbox; the session applies them on its own context. Each arming gets a
//! new generation, and ticks from an older generation are rejected.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// A timer tick tagged with the generation that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeepAliveTick {
    /// Generation of the timer that fired.
    pub generation: u64,
}

/// Recurring keep-alive timer owned by a session.
#[derive(Debug)]
pub struct HeartRateScheduler {
    period: Duration,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    ticks: mpsc::UnboundedSender<KeepAliveTick>,
}

impl HeartRateScheduler {
    /// Create a disarmed scheduler that posts ticks to `ticks`.
    pub fn new(period: Duration, ticks: mpsc::UnboundedSender<KeepAliveTick>) -> Self {
        Self {
            period,
            generation: 0,
            timer: None,
            ticks,
        }
    }

    /// Start the timer, replacing any running one.
    ///
    /// The first tick fires one period from now. The timer task runs on
    /// `runtime`.
    pub fn arm(&mut self, runtime: &Handle) -> u64 {
        self.disarm();

        let generation = self.generation;
        let period = self.period;
        let ticks = self.ticks.clone();
        let start = Instant::now() + period;

        self.timer = Some(runtime.spawn(async move {
            let mut interval = interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                trace!("Keep-alive tick (generation {})", generation);
                if ticks.send(KeepAliveTick { generation }).is_err() {
                    break;
                }
            }

            debug!("Keep-alive timer {} ended", generation);
        }));

        debug!("Keep-alive armed (generation {}, period {:?})", generation, period);
        generation
    }

    /// Stop the timer. Ticks already queued become stale.
    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            debug!("Keep-alive disarmed (generation {})", self.generation);
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Check if the timer is running.
    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Check whether a tick belongs to the running timer.
    pub fn accepts(&self, tick: KeepAliveTick) -> bool {
        self.is_armed() && tick.generation == self.generation
    }

    /// The keep-alive period.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for HeartRateScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = HeartRateScheduler::new(PERIOD, tx);

        let generation = scheduler.arm(&Handle::current());
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(PERIOD).await;
        let tick = rx.recv().await.unwrap();
        assert_eq!(tick, KeepAliveTick { generation });
        assert!(scheduler.accepts(tick));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_invalidates_old_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = HeartRateScheduler::new(PERIOD, tx);

        let first = scheduler.arm(&Handle::current());
        tokio::time::advance(PERIOD).await;
        let stale = rx.recv().await.unwrap();

        let second = scheduler.arm(&Handle::current());
        assert_ne!(first, second);
        assert!(!scheduler.accepts(stale));
        assert!(scheduler.accepts(KeepAliveTick { generation: second }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_stops_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = HeartRateScheduler::new(PERIOD, tx);

        let generation = scheduler.arm(&Handle::current());
        scheduler.disarm();
        assert!(!scheduler.is_armed());
        assert!(!scheduler.accepts(KeepAliveTick { generation }));

        tokio::time::advance(PERIOD * 3).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
